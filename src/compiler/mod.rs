//! # Compile-and-Patch Pipeline
//!
//! Compiles kernel source containing embedded assembly blocks into one
//! device program whose dummy kernels carry the blocks' real machine code.
//!
//! ## Architecture
//!
//! ```text
//! source → expand [[ ]] → strip comments → extract blocks → assemble
//!                                                              ↓
//! program ← reload ← patch binary ← device build (cached) ← dummies
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use asmsplice::compiler::{CompileOptions, Compiler};
//!
//! let mut compiler = Compiler::new(CompileOptions::default(), assembler, device)?;
//! let outcome = compiler.compile(&source);
//! print!("{}", outcome.log);
//! let program = outcome.output.map(|o| o.program);
//! ```

pub mod assembler;
pub mod device;
pub mod dummy;
pub mod environment;
pub mod extractor;
pub mod log;
pub mod patcher;
pub mod types;

pub use assembler::{assemble_blocks, AsmDiagnostic, Assembler, AssemblerOutput};
pub use device::{DeviceBuild, DeviceCompiler};
pub use dummy::{DummySynthesizer, MIN_VECTOR_REGISTERS};
pub use environment::{source_fingerprint, BuildOutcome, CompileEnvironment};
pub use extractor::{
    AsmBlock, BlockExtractor, Extraction, ParamDecl, SourceSpan, DEFAULT_INTRODUCER,
};
pub use log::{CompileLog, LogEntry, LogLevel, Stage};
pub use patcher::{
    find_masked, AnchorPattern, BinaryPatcher, PatchOutcome, PatchReport, ANCHOR_LITERAL,
};
pub use types::{PointerWidth, RegisterType};

use crate::error::{Error, Result};
use crate::preprocess::{strip_comments, TemplateExpander};
use crate::runtime::DEFAULT_ITERATION_LIMIT;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Compilation options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Keyword that opens an embedded block
    pub introducer: String,
    /// Device pointer width, decides the register type of pointer params
    pub pointer_width: PointerWidth,
    /// Vector register floor for dummy kernels
    pub min_vector_registers: usize,
    /// Total loop iterations allowed during template expansion
    pub template_iteration_limit: usize,
    /// Assemble blocks on the Rayon pool
    pub parallel_assembly: bool,
    /// Signature marking dummy code in the device binary
    pub anchor: AnchorPattern,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            introducer: DEFAULT_INTRODUCER.to_string(),
            pointer_width: PointerWidth::default(),
            min_vector_registers: MIN_VECTOR_REGISTERS,
            template_iteration_limit: DEFAULT_ITERATION_LIMIT,
            parallel_assembly: true,
            anchor: AnchorPattern::default(),
        }
    }
}

impl CompileOptions {
    /// Parses options from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let options: CompileOptions =
            serde_json::from_str(json).map_err(|e| Error::InvalidOptions(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Rejects options the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let mut chars = self.introducer.chars();
        let valid_introducer =
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_introducer {
            return Err(Error::InvalidOptions(format!(
                "introducer '{}' is not an identifier",
                self.introducer
            )));
        }
        if self.template_iteration_limit == 0 {
            return Err(Error::InvalidOptions(
                "template iteration limit must be positive".to_string(),
            ));
        }
        self.anchor.validate()
    }
}

/// Machine code of one block, as written into the binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCode {
    pub function_name: String,
    pub machine_code: Vec<u8>,
    pub scalar_registers: usize,
    pub vector_registers: usize,
}

impl From<&AsmBlock> for BlockCode {
    fn from(block: &AsmBlock) -> Self {
        BlockCode {
            function_name: block.function_name.clone(),
            machine_code: block.machine_code.clone(),
            scalar_registers: block.scalar_registers,
            vector_registers: block.vector_registers,
        }
    }
}

/// Products of a successful compile
#[derive(Debug, Clone)]
pub struct CompileOutput<P> {
    /// Program loaded from the patched binary
    pub program: P,
    pub patched_binary: Vec<u8>,
    /// Blocks in source order
    pub blocks: Vec<BlockCode>,
}

/// Result of [`Compiler::compile`]
#[derive(Debug, Clone)]
pub struct CompileOutcome<P> {
    pub success: bool,
    /// Everything logged up to the end, or up to the failing stage
    pub log: CompileLog,
    /// Present only when `success` is true
    pub output: Option<CompileOutput<P>>,
}

/// Compile-and-patch pipeline bound to its collaborators
pub struct Compiler<D: DeviceCompiler> {
    options: CompileOptions,
    assembler: Arc<dyn Assembler>,
    device: D,
    env: CompileEnvironment<D::Program>,
}

impl<D: DeviceCompiler> Compiler<D> {
    /// Create a compiler; fails if `options` do not validate
    pub fn new(options: CompileOptions, assembler: Arc<dyn Assembler>, device: D) -> Result<Self> {
        options.validate()?;
        Ok(Compiler {
            options,
            assembler,
            device,
            env: CompileEnvironment::new(),
        })
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Runs the whole pipeline
    ///
    /// Never fails outright: errors end up in the returned log and the
    /// outcome is marked unsuccessful.
    pub fn compile(&mut self, source: &str) -> CompileOutcome<D::Program> {
        let mut log = CompileLog::new();
        match self.run(source, &mut log) {
            Ok(output) => {
                tracing::info!(
                    blocks = output.blocks.len(),
                    warnings = log.warning_count(),
                    "compile succeeded"
                );
                CompileOutcome {
                    success: true,
                    log,
                    output: Some(output),
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "compile failed");
                log.record(&err);
                CompileOutcome {
                    success: false,
                    log,
                    output: None,
                }
            }
        }
    }

    /// Template expansion, comment stripping and block extraction only
    pub fn front_end(&self, source: &str) -> Result<Extraction> {
        let expanded = TemplateExpander::new()
            .with_iteration_limit(self.options.template_iteration_limit)
            .expand(source)?;
        let stripped = strip_comments(&expanded);
        BlockExtractor::new(self.options.introducer.as_str(), self.options.pointer_width)
            .extract(&stripped)
    }

    /// Kernel source the device compiler would receive for `source`
    ///
    /// Runs the assembler, but neither the device compiler nor the patcher.
    pub fn device_source(&self, source: &str) -> Result<String> {
        let mut log = CompileLog::new();
        self.prepare(source, &mut log).map(|(_, text)| text)
    }

    /// Binary of the last successful device build, before patching
    pub fn last_raw_binary(&self) -> Option<&[u8]> {
        self.env.last_raw_binary()
    }

    /// Binary of the last successful compile, after patching
    pub fn last_patched_binary(&self) -> Option<&[u8]> {
        self.env.last_patched_binary()
    }

    /// Success flag of the last device build, `None` before the first
    pub fn last_build_succeeded(&self) -> Option<bool> {
        self.env.last_build_succeeded()
    }

    /// Drops the cached build so the next compile rebuilds
    pub fn invalidate_cache(&mut self) {
        self.env.invalidate();
    }

    fn run(&mut self, source: &str, log: &mut CompileLog) -> Result<CompileOutput<D::Program>> {
        let (extraction, device_source) = self.prepare(source, log)?;
        let blocks = extraction.blocks;

        let build = self.env.build(&mut self.device, &device_source);
        log.info(
            Stage::Build,
            format!(
                "device source {} ({} bytes){}",
                source_fingerprint(&device_source),
                device_source.len(),
                if build.cached { ", cached" } else { "" }
            ),
        );
        let program = match build.program {
            Some(program) if build.success => program,
            _ => return Err(Error::DeviceBuildError { log: build.log }),
        };
        if !build.log.trim().is_empty() {
            log.info(Stage::Build, build.log.trim_end());
        }

        let raw = self.device.binary(&program)?;
        if blocks.is_empty() {
            self.env.record_binaries(raw.clone(), raw.clone());
            return Ok(CompileOutput {
                program,
                patched_binary: raw,
                blocks: Vec::new(),
            });
        }

        let report = BinaryPatcher::new(self.options.anchor.clone()).patch(&raw, &blocks);
        for outcome in &report.outcomes {
            if let Some(warning) = outcome.warning() {
                tracing::warn!("{}", warning);
                log.warning(Stage::Patch, warning);
            }
        }
        log.info(
            Stage::Patch,
            format!("patched {} of {} blocks", report.applied(), blocks.len()),
        );

        let patched = self
            .device
            .compile_from_binary(std::slice::from_ref(&report.binary))?;
        self.device.build(&patched)?;
        self.env.record_binaries(raw, report.binary.clone());

        Ok(CompileOutput {
            program: patched,
            patched_binary: report.binary,
            blocks: blocks.iter().map(BlockCode::from).collect(),
        })
    }

    /// Front end, assembly and dummy substitution
    fn prepare(&self, source: &str, log: &mut CompileLog) -> Result<(Extraction, String)> {
        let mut extraction = self.front_end(source)?;
        for warning in &extraction.warnings {
            log.warning(Stage::Extract, warning.as_str());
        }
        if extraction.blocks.is_empty() {
            log.info(Stage::Extract, "no embedded assembly blocks found");
        } else {
            log.info(
                Stage::Extract,
                format!("found {} embedded assembly block(s)", extraction.blocks.len()),
            );
        }

        let outputs = assemble_blocks(
            self.assembler.as_ref(),
            &mut extraction.blocks,
            self.options.parallel_assembly,
        );

        let mut failed = Vec::new();
        for (block, output) in extraction.blocks.iter().zip(&outputs) {
            let name = &block.function_name;
            for diagnostic in &output.diagnostics {
                let message = match diagnostic.line {
                    Some(line) => format!(
                        "{}:{}: {}",
                        name,
                        block.source_line(line),
                        diagnostic.message
                    ),
                    None => format!("{}: {}", name, diagnostic.message),
                };
                log.push(diagnostic.level, Stage::Assemble, message);
            }
            if !output.log.trim().is_empty() {
                log.info(Stage::Assemble, format!("{}: {}", name, output.log.trim_end()));
            }
            if output.ok {
                log.info(
                    Stage::Assemble,
                    format!(
                        "{}: {} bytes, {} sgprs, {} vgprs\n{}",
                        name,
                        block.machine_code.len(),
                        block.scalar_registers,
                        block.vector_registers,
                        hex_dump(&block.machine_code)
                    ),
                );
            } else {
                failed.push(name.clone());
            }
        }
        if !failed.is_empty() {
            return Err(Error::AssemblyError { functions: failed });
        }

        let anchor_literal = self.options.anchor.literal().unwrap_or(ANCHOR_LITERAL);
        let synthesizer = DummySynthesizer::new(self.options.min_vector_registers, anchor_literal);
        let mut dummies = Vec::with_capacity(extraction.blocks.len());
        for block in &extraction.blocks {
            if block.params.is_empty() {
                log.warning(
                    Stage::Synthesize,
                    format!(
                        "{} has no parameters; its dummy writes no output and may be shrunk by the device compiler",
                        block.function_name
                    ),
                );
            }
            dummies.push(synthesizer.synthesize(
                &block.function_name,
                block.params.len(),
                block.vector_registers,
                block.scalar_registers,
                block.machine_code.len().div_ceil(4),
            ));
        }

        let device_source = extraction.splice(&dummies);
        tracing::debug!(
            blocks = dummies.len(),
            bytes = device_source.len(),
            "substituted dummy kernels"
        );
        Ok((extraction, device_source))
    }
}

/// Hex rows of 16 bytes, grouped into dwords
fn hex_dump(code: &[u8]) -> String {
    code.chunks(16)
        .enumerate()
        .map(|(row, chunk)| {
            let words: Vec<String> = chunk.chunks(4).map(hex::encode).collect();
            format!("  {:04x}: {}", row * 16, words.join(" "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_validate() {
        let options = CompileOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.introducer, "__asm4GCN");
        assert_eq!(options.min_vector_registers, 15);
        assert!(options.parallel_assembly);
    }

    #[test]
    fn test_options_from_json() {
        let options = CompileOptions::from_json(
            r#"{ "introducer": "__gcn", "pointer_width": 4, "parallel_assembly": false }"#,
        )
        .unwrap();
        assert_eq!(options.introducer, "__gcn");
        assert_eq!(options.pointer_width, PointerWidth::Bits32);
        assert!(!options.parallel_assembly);
        assert_eq!(options.anchor, AnchorPattern::default());
    }

    #[test]
    fn test_invalid_options() {
        for json in [
            r#"{ "pointer_width": 2 }"#,
            r#"{ "introducer": "" }"#,
            r#"{ "introducer": "9asm" }"#,
            r#"{ "anchor": { "signature": [1, 2], "mask": [255] } }"#,
            r#"{ "template_iteration_limit": 0 }"#,
        ] {
            assert!(
                matches!(CompileOptions::from_json(json), Err(Error::InvalidOptions(_))),
                "{}",
                json
            );
        }
    }

    #[test]
    fn test_options_json_round_trip() {
        let options = CompileOptions::default();
        let json = serde_json::to_string(&options).unwrap();
        assert!(json.contains("\"pointer_width\":8"));
        assert_eq!(CompileOptions::from_json(&json).unwrap(), options);
    }

    #[test]
    fn test_hex_dump() {
        let code: Vec<u8> = (0u8..20).collect();
        assert_eq!(
            hex_dump(&code),
            "  0000: 00010203 04050607 08090a0b 0c0d0e0f\n  0010: 10111213"
        );
    }
}
