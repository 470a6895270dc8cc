//! Template code parser
//!
//! Parses the C-like template language into an Abstract Syntax Tree (AST).

mod ast;
mod template_parser;

pub use ast::{BinaryOp, Expression, Program, Statement, UnaryOp};
pub use template_parser::TemplateParser;
