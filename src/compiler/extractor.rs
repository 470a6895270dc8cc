//! # Embedded Block Extraction
//!
//! Finds every embedded assembly block in comment-free kernel source:
//!
//! ```text
//! __asm4GCN name (type [name], ...) { body } [;]
//! ```
//!
//! The introducer is only recognised as a whole identifier outside string
//! and character literals. Each block's span can later be replaced by a
//! one-line dummy function followed by the newlines the span contained, so
//! every line after a block keeps its number.

use super::types::{PointerWidth, RegisterType};
use crate::error::{Error, Result};
use crate::preprocess::{skip_quoted, skip_verbatim};
use serde::{Deserialize, Serialize};

/// Default block introducer keyword
pub const DEFAULT_INTRODUCER: &str = "__asm4GCN";

/// Byte range of a block in the extracted source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    /// Byte offset of the introducer
    pub start: usize,
    /// Length in bytes, through `}` or the optional `;`
    pub length: usize,
}

impl SourceSpan {
    /// Offset one past the last byte
    pub fn end(&self) -> usize {
        self.start + self.length
    }
}

/// One declared block parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDecl {
    /// Type as written, qualifiers included
    pub declared_type: String,
    /// Register type the assembler sees
    pub register_type: RegisterType,
    /// Parameter name, generated if the source omitted it
    pub name: String,
}

/// An extracted assembly block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmBlock {
    pub function_name: String,
    pub params: Vec<ParamDecl>,
    /// Text between `{` and `}`
    pub body: String,
    pub span: SourceSpan,
    /// 1-based line of the introducer
    pub start_line: usize,
    /// Newlines between the introducer and `{`
    pub header_line_count: usize,
    /// Newlines inside the whole span
    pub span_line_count: usize,

    // Filled in by the assembler
    pub machine_code: Vec<u8>,
    pub scalar_registers: usize,
    pub vector_registers: usize,
    pub assembly_log: String,
}

impl AsmBlock {
    /// Body split into lines; line 1 is the text right after `{`
    pub fn body_lines(&self) -> Vec<&str> {
        self.body.split('\n').map(|l| l.trim_end_matches('\r')).collect()
    }

    /// Maps a 1-based body line to its 1-based source line
    pub fn source_line(&self, body_line: usize) -> usize {
        self.start_line + self.header_line_count + body_line.saturating_sub(1)
    }
}

/// Result of scanning a source for blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Source the blocks were taken from
    pub source: String,
    /// Blocks in source order
    pub blocks: Vec<AsmBlock>,
    /// Non-fatal notes, such as generated parameter names
    pub warnings: Vec<String>,
}

impl Extraction {
    /// Source with every block replaced by its newlines only
    pub fn stripped(&self) -> String {
        self.splice(&[])
    }

    /// Source with block `i` replaced by `replacements[i]`
    ///
    /// Each replacement is flattened onto one line and followed by the
    /// newlines of the span it replaces. Missing replacements count as empty.
    pub fn splice(&self, replacements: &[String]) -> String {
        let mut out = String::with_capacity(self.source.len());
        let mut copy_from = 0;

        for (i, block) in self.blocks.iter().enumerate() {
            out.push_str(&self.source[copy_from..block.span.start]);
            if let Some(text) = replacements.get(i) {
                out.extend(text.chars().map(|c| if c == '\n' || c == '\r' { ' ' } else { c }));
            }
            out.push_str(&"\n".repeat(block.span_line_count));
            copy_from = block.span.end();
        }

        out.push_str(&self.source[copy_from..]);
        out
    }
}

/// Scans kernel source for embedded blocks
#[derive(Debug, Clone)]
pub struct BlockExtractor {
    introducer: String,
    pointer_width: PointerWidth,
}

impl BlockExtractor {
    /// Create an extractor for `introducer`
    pub fn new(introducer: impl Into<String>, pointer_width: PointerWidth) -> Self {
        BlockExtractor {
            introducer: introducer.into(),
            pointer_width,
        }
    }

    /// Extracts all blocks in source order
    ///
    /// An unknown parameter type or a malformed block aborts the whole
    /// extraction.
    pub fn extract(&self, text: &str) -> Result<Extraction> {
        let lines = LineIndex::new(text);
        let bytes = text.as_bytes();
        let introducer = self.introducer.as_bytes();
        let mut blocks = Vec::new();
        let mut warnings = Vec::new();
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'@' if bytes.get(i + 1) == Some(&b'"') => i = skip_verbatim(bytes, i + 2),
                quote @ (b'"' | b'\'') => i = skip_quoted(bytes, i + 1, quote),
                b if is_ident_byte(b) => {
                    let end = ident_end(bytes, i);
                    if &bytes[i..end] == introducer {
                        let block = self.parse_block(text, i, end, &lines, &mut warnings)?;
                        tracing::debug!(
                            function = %block.function_name,
                            line = block.start_line,
                            params = block.params.len(),
                            "extracted block"
                        );
                        i = block.span.end();
                        blocks.push(block);
                    } else {
                        i = end;
                    }
                }
                _ => i += 1,
            }
        }

        Ok(Extraction {
            source: text.to_string(),
            blocks,
            warnings,
        })
    }

    fn parse_block(
        &self,
        text: &str,
        start: usize,
        after_introducer: usize,
        lines: &LineIndex,
        warnings: &mut Vec<String>,
    ) -> Result<AsmBlock> {
        let bytes = text.as_bytes();
        let line = lines.line_of(start);
        let malformed = |message: &str| Error::MalformedBlock {
            line,
            message: message.to_string(),
        };

        let mut pos = skip_whitespace(bytes, after_introducer);
        let name_end = ident_end(bytes, pos);
        if name_end == pos || bytes[pos].is_ascii_digit() {
            return Err(malformed("expected function name"));
        }
        let function_name = text[pos..name_end].to_string();

        pos = skip_whitespace(bytes, name_end);
        if bytes.get(pos) != Some(&b'(') {
            return Err(malformed("expected '(' after function name"));
        }
        let params_start = pos + 1;
        let params_end = text[params_start..]
            .find(|c: char| matches!(c, ')' | '{' | '}' | ';'))
            .map(|p| params_start + p)
            .filter(|&p| bytes[p] == b')')
            .ok_or_else(|| malformed("unterminated parameter list"))?;

        pos = skip_whitespace(bytes, params_end + 1);
        if bytes.get(pos) != Some(&b'{') {
            return Err(malformed("expected '{' after parameter list"));
        }
        let body_start = pos + 1;
        let body_end = text[body_start..]
            .find('}')
            .map(|p| body_start + p)
            .ok_or_else(|| malformed("unterminated block body, expected '}'"))?;

        let mut end = body_end + 1;
        let after = &text[end..];
        let trailing = after.trim_start_matches([' ', '\t']);
        if trailing.starts_with(';') {
            end += after.len() - trailing.len() + 1;
        }

        let params = self.parse_params(
            &function_name,
            text,
            params_start,
            params_end,
            lines,
            warnings,
        )?;

        Ok(AsmBlock {
            function_name,
            params,
            body: text[body_start..body_end].to_string(),
            span: SourceSpan {
                start,
                length: end - start,
            },
            start_line: line,
            header_line_count: text[start..pos].matches('\n').count(),
            span_line_count: text[start..end].matches('\n').count(),
            machine_code: Vec::new(),
            scalar_registers: 0,
            vector_registers: 0,
            assembly_log: String::new(),
        })
    }

    fn parse_params(
        &self,
        function: &str,
        text: &str,
        start: usize,
        end: usize,
        lines: &LineIndex,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<ParamDecl>> {
        let list = &text[start..end];
        if matches!(list.trim(), "" | "void") {
            return Ok(Vec::new());
        }

        let mut params = Vec::new();
        let mut offset = start;
        for (index, piece) in list.split(',').enumerate() {
            let piece_offset = offset + (piece.len() - piece.trim_start().len());
            offset += piece.len() + 1;

            let piece = piece.trim();
            if piece.is_empty() {
                return Err(Error::MalformedBlock {
                    line: lines.line_of(piece_offset),
                    message: format!("empty parameter {} in function {}", index, function),
                });
            }

            let (declared_type, name) = split_param(piece);
            let register_type = RegisterType::from_declared(&declared_type, self.pointer_width)
                .ok_or_else(|| Error::UnknownParameterType {
                    function: function.to_string(),
                    declared_type: declared_type.clone(),
                    line: lines.line_of(piece_offset),
                })?;

            let name = match name {
                Some(name) => name,
                None => {
                    let generated = format!("auto_gen_var_name_{}", index);
                    let warning = format!(
                        "{}: parameter {} of type '{}' has no name, using {}",
                        function, index, declared_type, generated
                    );
                    tracing::warn!("{}", warning);
                    warnings.push(warning);
                    generated
                }
            };

            params.push(ParamDecl {
                declared_type,
                register_type,
                name,
            });
        }
        Ok(params)
    }
}

impl Default for BlockExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_INTRODUCER, PointerWidth::default())
    }
}

/// Splits `type [name]`; the name is the trailing identifier unless it is
/// itself part of the type
fn split_param(piece: &str) -> (String, Option<String>) {
    if let Some(pos) = piece.rfind(|c: char| c.is_whitespace() || c == '*') {
        let (ty, candidate) = (piece[..=pos].trim(), &piece[pos + 1..]);
        if !ty.is_empty() && is_identifier(candidate) && !RegisterType::is_type_word(candidate) {
            return (normalize_spaces(ty), Some(candidate.to_string()));
        }
    }
    (normalize_spaces(piece), None)
}

fn normalize_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn ident_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| !is_ident_byte(b))
        .map_or(bytes.len(), |p| start + p)
}

fn skip_whitespace(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map_or(bytes.len(), |p| start + p)
}

/// Offsets of line starts, for offset → line lookups
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        LineIndex { starts }
    }

    /// 1-based line containing `offset`
    fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&s| s <= offset)
    }
}
