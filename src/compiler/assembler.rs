//! Assembler collaborator and parallel block assembly
//!
//! Uses Rayon to assemble independent blocks concurrently. Results come back
//! in block order whatever order the workers finish in.

use super::extractor::AsmBlock;
use super::log::LogLevel;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Turns one block body into machine code
///
/// Implementations are shared across Rayon workers, hence `Send + Sync`.
pub trait Assembler: Send + Sync {
    /// Assemble the body of one block, given as lines
    ///
    /// Line 1 is the text right after the block's opening `{`.
    fn assemble(&self, body_lines: &[&str]) -> AssemblerOutput;
}

/// One assembler message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsmDiagnostic {
    /// 1-based body line, if the message refers to one
    pub line: Option<usize>,
    pub message: String,
    pub level: LogLevel,
}

impl AsmDiagnostic {
    /// Error on a body line
    pub fn error(line: usize, message: impl Into<String>) -> Self {
        AsmDiagnostic {
            line: Some(line),
            message: message.into(),
            level: LogLevel::Error,
        }
    }

    /// Warning on a body line
    pub fn warning(line: usize, message: impl Into<String>) -> Self {
        AsmDiagnostic {
            line: Some(line),
            message: message.into(),
            level: LogLevel::Warning,
        }
    }
}

/// What the assembler produced for one block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblerOutput {
    /// Encoded instructions
    pub machine_code: Vec<u8>,
    /// Scalar registers used
    pub scalar_registers: usize,
    /// Vector registers used
    pub vector_registers: usize,
    /// Free-form assembler log
    pub log: String,
    /// Line-addressed messages
    pub diagnostics: Vec<AsmDiagnostic>,
    /// False if the block could not be assembled
    pub ok: bool,
}

/// Assembles every block and stores machine code and register usage on it
///
/// Every block is attempted even when an earlier one fails, so the caller
/// can report all failures at once. Returns the outputs in block order.
pub fn assemble_blocks(
    assembler: &dyn Assembler,
    blocks: &mut [AsmBlock],
    parallel: bool,
) -> Vec<AssemblerOutput> {
    let run = |block: &AsmBlock| assembler.assemble(&block.body_lines());

    // Single block - no parallelism needed
    let outputs: Vec<AssemblerOutput> = if parallel && blocks.len() > 1 {
        blocks.par_iter().map(run).collect()
    } else {
        blocks.iter().map(run).collect()
    };

    for (block, output) in blocks.iter_mut().zip(&outputs) {
        block.machine_code = output.machine_code.clone();
        block.scalar_registers = output.scalar_registers;
        block.vector_registers = output.vector_registers;
        block.assembly_log = output.log.clone();
    }
    outputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::extractor::BlockExtractor;

    /// One byte per non-empty line, fails on a line containing "bad"
    struct LineCounter;

    impl Assembler for LineCounter {
        fn assemble(&self, body_lines: &[&str]) -> AssemblerOutput {
            let mut output = AssemblerOutput {
                ok: true,
                ..Default::default()
            };
            for (i, line) in body_lines.iter().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.contains("bad") {
                    output.ok = false;
                    output.diagnostics.push(AsmDiagnostic::error(i + 1, "unknown opcode"));
                }
                output.machine_code.push(line.len() as u8);
            }
            output.vector_registers = output.machine_code.len();
            output
        }
    }

    fn blocks(src: &str) -> Vec<AsmBlock> {
        BlockExtractor::default().extract(src).unwrap().blocks
    }

    #[test]
    fn test_outputs_in_block_order() {
        let mut list = blocks(
            "__asm4GCN a () { s_nop 0 }\n\
             __asm4GCN b () {\ns_nop 0\ns_endpgm\n}\n\
             __asm4GCN c () { bad }\n",
        );
        let outputs = assemble_blocks(&LineCounter, &mut list, true);

        assert_eq!(outputs.len(), 3);
        assert!(outputs[0].ok && outputs[1].ok);
        assert!(!outputs[2].ok);
        assert_eq!(outputs[2].diagnostics[0].line, Some(1));
        assert_eq!(list[1].machine_code, vec![7, 8]);
        assert_eq!(list[1].vector_registers, 2);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let src = (0..16)
            .map(|i| format!("__asm4GCN f{} () {{\n{}\n}}\n", i, "v_nop\n".repeat(i)))
            .collect::<String>();
        let mut par = blocks(&src);
        let mut seq = par.clone();
        assert_eq!(
            assemble_blocks(&LineCounter, &mut par, true),
            assemble_blocks(&LineCounter, &mut seq, false)
        );
        assert_eq!(par, seq);
    }
}
