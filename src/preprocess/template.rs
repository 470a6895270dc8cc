//! `[[ ]]` template expansion
//!
//! The raw source is cut into literal text runs and tags. Those pieces are
//! stitched into one template program (literal runs become
//! `__emit_text(n);`, expression tags become `__emit_value(expr);`, control
//! tags are inlined verbatim), which is parsed and evaluated exactly once.
//!
//! | tag | meaning |
//! |-----|---------|
//! | `[[code]]` | control code |
//! | `[[~code` | control code to end of line, newline included |
//! | `[[#text]]` | template comment, dropped |
//! | `[[=expr]]` | value of `expr` |

use crate::error::{Error, Result};
use crate::lexer::TemplateScanner;
use crate::parser::TemplateParser;
use crate::runtime::{TemplateEvaluator, DEFAULT_ITERATION_LIMIT, EMIT_TEXT, EMIT_VALUE};

const OPEN: &str = "[[";
const CLOSE: &str = "]]";

/// One piece of the raw source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Ordinary text copied to the output
    Literal(&'a str),
    /// `[[code]]`
    Code(&'a str),
    /// `[[~code` through end of line
    LineCode(&'a str),
    /// `[[#text]]`
    Comment(&'a str),
    /// `[[=expr]]`
    Expression(&'a str),
}

/// Expands `[[ ]]` tags in kernel source
#[derive(Debug, Clone)]
pub struct TemplateExpander {
    iteration_limit: usize,
}

impl TemplateExpander {
    /// Creates an expander with the default loop budget
    pub fn new() -> Self {
        TemplateExpander {
            iteration_limit: DEFAULT_ITERATION_LIMIT,
        }
    }

    /// Sets the total loop iteration budget for one expansion
    pub fn with_iteration_limit(mut self, limit: usize) -> Self {
        self.iteration_limit = limit;
        self
    }

    /// Expands all tags; text without `[[` is returned unchanged
    pub fn expand(&self, source: &str) -> Result<String> {
        if !source.contains(OPEN) {
            return Ok(source.to_string());
        }

        let segments = split_segments(source)?;
        let (program_text, literals) = synthesize_program(&segments);
        tracing::debug!(
            segments = segments.len(),
            literals = literals.len(),
            "synthesized template program"
        );

        let program = TemplateScanner::new(&program_text)
            .scan_tokens()
            .and_then(|tokens| TemplateParser::new(tokens).parse())
            .map_err(|err| attach_listing(err, &program_text))?;

        TemplateEvaluator::new(literals)
            .with_iteration_limit(self.iteration_limit)
            .execute(&program)
            .map_err(Error::template_eval)
    }
}

impl Default for TemplateExpander {
    fn default() -> Self {
        Self::new()
    }
}

/// Cuts the raw source into literal runs and tags
pub fn split_segments(source: &str) -> Result<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut rest = source;
    let mut consumed = 0;

    while let Some(open) = rest.find(OPEN) {
        if open > 0 {
            segments.push(Segment::Literal(&rest[..open]));
        }
        let tag_start = consumed + open;
        let after_open = &rest[open + OPEN.len()..];

        let (segment, tag_len) = if let Some(code) = after_open.strip_prefix('~') {
            let (line, len) = match code.find('\n') {
                Some(eol) => (&code[..eol], 1 + eol + 1),
                None => (code, 1 + code.len()),
            };
            // `[[~code]]` may close its tag before the newline
            let line = line.trim_end();
            let line = line.strip_suffix(CLOSE).unwrap_or(line);
            (Segment::LineCode(line), len)
        } else {
            let close = after_open.find(CLOSE).ok_or_else(|| {
                let (line, col) = line_col(source, tag_start);
                Error::TemplateSyntaxError {
                    line,
                    col,
                    message: "Unterminated '[[' tag: expected ']]'".to_string(),
                    listing: numbered_listing(source),
                }
            })?;
            let body = &after_open[..close];
            let segment = match body.chars().next() {
                Some('=') => Segment::Expression(&body[1..]),
                Some('#') => Segment::Comment(&body[1..]),
                _ => Segment::Code(body),
            };
            (segment, close + CLOSE.len())
        };

        segments.push(segment);
        let advance = open + OPEN.len() + tag_len;
        consumed += advance;
        rest = &rest[advance..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    Ok(segments)
}

/// Builds the template program text and its literal table
fn synthesize_program(segments: &[Segment<'_>]) -> (String, Vec<String>) {
    let mut program = String::new();
    let mut literals = Vec::new();

    for segment in segments {
        match segment {
            Segment::Literal(text) => {
                program.push_str(&format!("{}({});\n", EMIT_TEXT, literals.len()));
                literals.push(text.to_string());
            }
            Segment::Code(code) | Segment::LineCode(code) => {
                program.push_str(code);
                program.push('\n');
            }
            Segment::Expression(expr) => {
                program.push_str(&format!("{}({});\n", EMIT_VALUE, expr.trim()));
            }
            Segment::Comment(_) => {}
        }
    }

    (program, literals)
}

fn attach_listing(err: Error, program_text: &str) -> Error {
    match err {
        Error::TemplateSyntaxError {
            line, col, message, ..
        } => Error::TemplateSyntaxError {
            line,
            col,
            message,
            listing: numbered_listing(program_text),
        },
        other => other,
    }
}

/// Renders text with 1-based line numbers
pub fn numbered_listing(text: &str) -> String {
    text.lines()
        .enumerate()
        .map(|(i, line)| format!("{:>4} | {}\n", i + 1, line))
        .collect()
}

fn line_col(text: &str, offset: usize) -> (usize, usize) {
    let before = &text[..offset];
    let line = before.matches('\n').count() + 1;
    let col = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
    (line, col)
}
