//! In-memory stand-ins for the assembler and the vendor toolchain

#![allow(dead_code)]

use asmsplice::compiler::{AsmDiagnostic, Assembler, AssemblerOutput, DeviceBuild, DeviceCompiler};
use asmsplice::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bytes of the default anchor with a chosen destination register
pub fn anchor_bytes(vdst: u8) -> Vec<u8> {
    vec![0xFF, 0x02, vdst, 0x7E, 0x19, 0x2B, 0x3A, 0x4C, 0xFF, 0x02]
}

/// Encodes each non-empty line as one dword `[len, 0xAA, 0xBB, 0xBF]`
///
/// A line containing `bad` is an error on that body line.
#[derive(Default)]
pub struct FakeAssembler {
    pub calls: AtomicUsize,
}

impl FakeAssembler {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Assembler for FakeAssembler {
    fn assemble(&self, body_lines: &[&str]) -> AssemblerOutput {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut output = AssemblerOutput {
            ok: true,
            scalar_registers: 2,
            ..Default::default()
        };

        for (i, line) in body_lines.iter().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.contains("bad") {
                output.ok = false;
                output
                    .diagnostics
                    .push(AsmDiagnostic::error(i + 1, format!("unknown opcode '{}'", line)));
                continue;
            }
            if line.starts_with('v') {
                output.vector_registers += 1;
            }
            output
                .machine_code
                .extend([line.len() as u8, 0xAA, 0xBB, 0xBF]);
        }
        output
    }
}

/// Produces one anchored 64-byte code region per dummy kernel in the source
///
/// A source containing `#error` fails to build.
#[derive(Default)]
pub struct FakeDevice {
    pub source_builds: usize,
    pub binary_loads: usize,
    pub finished_builds: usize,
    /// Emit code regions without anchors
    pub drop_anchors: bool,
    pub last_source: String,
}

pub const HEADER_LEN: usize = 16;
pub const REGION_LEN: usize = 64;

impl DeviceCompiler for FakeDevice {
    type Program = Vec<u8>;

    fn compile_from_source(&mut self, source: &str) -> DeviceBuild<Vec<u8>> {
        self.source_builds += 1;
        self.last_source = source.to_string();

        if source.contains("#error") {
            return DeviceBuild {
                program: None,
                success: false,
                log: "<source>:1:2: error: forced failure".to_string(),
            };
        }

        let mut binary = vec![0x7Fu8; HEADER_LEN];
        for (i, _) in source.match_indices("as_float(0x4C3A2B19u)").enumerate() {
            let mut region = if self.drop_anchors {
                Vec::new()
            } else {
                anchor_bytes(i as u8)
            };
            region.resize(REGION_LEN, 0x00);
            binary.extend(region);
        }

        DeviceBuild {
            program: Some(binary),
            success: true,
            log: "build ok".to_string(),
        }
    }

    fn binary(&self, program: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(program.clone())
    }

    fn compile_from_binary(&mut self, binaries: &[Vec<u8>]) -> Result<Vec<u8>> {
        self.binary_loads += 1;
        binaries
            .first()
            .cloned()
            .ok_or_else(|| Error::device("no binary"))
    }

    fn build(&mut self, _program: &Vec<u8>) -> Result<()> {
        self.finished_builds += 1;
        Ok(())
    }
}
