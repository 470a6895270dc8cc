//! Device compiler collaborator
//!
//! Wraps the vendor toolchain: compiles kernel source, hands out the
//! program binary, and reloads a program from a patched binary.

use crate::error::Result;

/// Result of compiling kernel source
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceBuild<P> {
    /// Built program, `None` if the build failed before producing one
    pub program: Option<P>,
    pub success: bool,
    /// Build log as reported by the toolchain
    pub log: String,
}

/// Vendor kernel compiler
pub trait DeviceCompiler {
    /// Handle to a built program
    type Program: Clone;

    /// Compile kernel source text
    fn compile_from_source(&mut self, source: &str) -> DeviceBuild<Self::Program>;

    /// Device binary of a built program
    fn binary(&self, program: &Self::Program) -> Result<Vec<u8>>;

    /// Create a program from device binaries
    fn compile_from_binary(&mut self, binaries: &[Vec<u8>]) -> Result<Self::Program>;

    /// Finish a program created from binaries
    fn build(&mut self, program: &Self::Program) -> Result<()>;
}
