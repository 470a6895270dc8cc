//! Lexical analysis for template code
//!
//! Converts the code inside `[[ ]]` tags into a stream of tokens.

mod template_scanner;
mod token;

pub use template_scanner::TemplateScanner;
pub use token::{Token, TokenKind};
