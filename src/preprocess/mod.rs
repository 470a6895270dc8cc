//! Source preprocessing ahead of block extraction
//!
//! ```text
//! raw source → template expansion → comment stripping → extractor
//! ```

mod comments;
mod template;

pub use comments::strip_comments;
pub use template::{numbered_listing, split_segments, Segment, TemplateExpander};
pub(crate) use comments::{skip_quoted, skip_verbatim};
