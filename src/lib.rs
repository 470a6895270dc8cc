//! # asmsplice - Embedded GPU Assembly for Kernel Sources
//!
//! Write GCN assembly functions inline in an OpenCL C kernel file and get
//! back one device program in which each of them runs as a real kernel.
//!
//! ## How It Works
//!
//! The vendor compiler cannot read assembly, so every embedded block is
//! swapped for a placeholder kernel of the same shape. After the vendor
//! build, the placeholder code in the device binary is overwritten with the
//! block's machine code and the program is reloaded from the patched
//! binary.
//!
//! ```text
//! Source → Template Expander → Comment Stripper → Block Extractor
//!                                                       ↓
//!          Assembler (parallel) → Dummy Synthesizer → Device Build (cached)
//!                                                       ↓
//!                                  Binary Patcher → Program
//! ```
//!
//! ### Main Components
//!
//! - [`TemplateExpander`] - Expands `[[ ]]` template tags
//! - [`strip_comments`] - Removes comments, keeps literals and line numbers
//! - [`BlockExtractor`] - Finds `__asm4GCN` blocks and their signatures
//! - [`DummySynthesizer`] - Placeholder kernels sized for each block
//! - [`BinaryPatcher`] - Masked signature search and overwrite
//! - [`Compiler`] - Runs all stages and collects a [`CompileLog`]
//!
//! The assembler and the vendor toolchain are supplied by the caller through
//! the [`Assembler`] and [`DeviceCompiler`] traits.
//!
//! ## Embedded Blocks
//!
//! ```text
//! __asm4GCN add_one (float* data, uint n)
//! {
//!     v_add_f32 v1, 1.0, v1
//!     s_endpgm
//! };
//! ```
//!
//! ## Template Tags
//!
//! ```rust
//! use asmsplice::TemplateExpander;
//!
//! # fn main() -> asmsplice::Result<()> {
//! let source = "[[ for (int r = 0; r < 3; r++) { ]]v_mov_b32 v[[=r]], 0\n[[ } ]]";
//! let expanded = TemplateExpander::new().expand(source)?;
//! assert_eq!(expanded, "v_mov_b32 v0, 0\nv_mov_b32 v1, 0\nv_mov_b32 v2, 0\n");
//! # Ok(())
//! # }
//! ```
//!
//! ## Compiling
//!
//! ```rust
//! use asmsplice::{
//!     Assembler, AssemblerOutput, CompileOptions, Compiler, DeviceBuild, DeviceCompiler, Result,
//! };
//! use std::sync::Arc;
//!
//! struct Halt;
//!
//! impl Assembler for Halt {
//!     fn assemble(&self, _lines: &[&str]) -> AssemblerOutput {
//!         AssemblerOutput {
//!             machine_code: vec![0x00, 0x00, 0x81, 0xBF],
//!             ok: true,
//!             ..Default::default()
//!         }
//!     }
//! }
//!
//! // Treats the source text itself as the device binary
//! struct Echo;
//!
//! impl DeviceCompiler for Echo {
//!     type Program = Vec<u8>;
//!
//!     fn compile_from_source(&mut self, source: &str) -> DeviceBuild<Vec<u8>> {
//!         DeviceBuild {
//!             program: Some(source.as_bytes().to_vec()),
//!             success: true,
//!             log: String::new(),
//!         }
//!     }
//!
//!     fn binary(&self, program: &Vec<u8>) -> Result<Vec<u8>> {
//!         Ok(program.clone())
//!     }
//!
//!     fn compile_from_binary(&mut self, binaries: &[Vec<u8>]) -> Result<Vec<u8>> {
//!         Ok(binaries.concat())
//!     }
//!
//!     fn build(&mut self, _program: &Vec<u8>) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let mut compiler = Compiler::new(CompileOptions::default(), Arc::new(Halt), Echo)?;
//! let outcome = compiler.compile("__asm4GCN halt (float* out) { s_endpgm }\n");
//!
//! assert!(outcome.success);
//! // Plain text carries no anchor, so the block is reported instead of patched
//! assert_eq!(outcome.log.warning_count(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Stage functions return [`Result`]. [`Compiler::compile`] never fails
//! outright: the first fatal error ends the run and is appended to the log,
//! together with everything logged before it.
//!
//! ## License
//!
//! Licensed under the [MIT License](https://opensource.org/licenses/MIT).

/// Version of the asmsplice crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod preprocess;
pub mod runtime;

// Re-export main types
pub use compiler::{
    AnchorPattern, AsmBlock, Assembler, AssemblerOutput, BinaryPatcher, BlockExtractor,
    CompileLog, CompileOptions, CompileOutcome, CompileOutput, Compiler, DeviceBuild,
    DeviceCompiler, DummySynthesizer, Extraction, LogLevel, PointerWidth, RegisterType, Stage,
};
pub use error::{Error, ErrorSeverity, Result};
pub use preprocess::{strip_comments, TemplateExpander};
