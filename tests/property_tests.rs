//! Property-based tests for the text stages and the patcher
//!
//! These tests use proptest to generate random inputs and verify that:
//! 1. Text without template tags survives expansion unchanged
//! 2. Comment-free text survives stripping unchanged
//! 3. Patching never changes the binary length
//! 4. Generated blocks are extracted in order with disjoint spans

use asmsplice::compiler::{BinaryPatcher, BlockExtractor};
use asmsplice::{strip_comments, TemplateExpander};
use proptest::prelude::*;

// =============================================================================
// STRATEGY GENERATORS
// =============================================================================

/// Kernel-like text that may contain single brackets but never `[[`
fn tagless_text() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"[ -~\n\t]{0,300}")
        .unwrap()
        .prop_filter("no template tags", |s| !s.contains("[["))
}

/// Text without any `/`, so nothing can start a comment
fn comment_free_text() -> impl Strategy<Value = String> {
    prop::string::string_regex(r#"[a-z0-9 \n"'@;{}()*]{0,300}"#).unwrap()
}

fn anchor() -> Vec<u8> {
    vec![0xFF, 0x02, 0x00, 0x7E, 0x19, 0x2B, 0x3A, 0x4C, 0xFF, 0x02]
}

/// A binary made of random runs with anchors mixed in
fn binary_with_anchors() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(
        prop_oneof![
            prop::collection::vec(any::<u8>(), 0..32),
            Just(anchor()),
        ],
        0..10,
    )
    .prop_map(|parts| parts.concat())
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn expand_without_tags_is_identity(text in tagless_text()) {
        let expanded = TemplateExpander::new().expand(&text).unwrap();
        prop_assert_eq!(expanded, text);
    }

    #[test]
    fn strip_without_comments_is_identity(text in comment_free_text()) {
        prop_assert_eq!(strip_comments(&text), text);
    }

    #[test]
    fn strip_preserves_line_count(text in r"[a-z /*\n]{0,200}") {
        let stripped = strip_comments(&text);
        prop_assert_eq!(stripped.matches('\n').count(), text.matches('\n').count());
    }

    #[test]
    fn patch_preserves_length(
        binary in binary_with_anchors(),
        codes in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..48), 0..6),
    ) {
        let source: String = (0..codes.len())
            .map(|i| format!("__asm4GCN f{} (float* p) {{ s_nop 0 }}\n", i))
            .collect();
        let mut blocks = BlockExtractor::default().extract(&source).unwrap().blocks;
        for (block, code) in blocks.iter_mut().zip(&codes) {
            block.machine_code = code.clone();
        }

        let report = BinaryPatcher::default().patch(&binary, &blocks);
        prop_assert_eq!(report.binary.len(), binary.len());
        prop_assert_eq!(report.outcomes.len(), blocks.len());
    }

    #[test]
    fn extracted_blocks_are_ordered_and_disjoint(
        names in prop::collection::vec("[a-z][a-z0-9_]{0,8}", 1..8),
        filler in "[a-z =;\n]{0,20}",
    ) {
        let source: String = names
            .iter()
            .map(|n| format!("{}\n__asm4GCN {} (int a, float* b)\n{{\n  s_nop 0\n}};\n", filler, n))
            .collect();
        let extraction = BlockExtractor::default().extract(&source).unwrap();

        prop_assert_eq!(extraction.blocks.len(), names.len());
        for (block, name) in extraction.blocks.iter().zip(&names) {
            prop_assert_eq!(&block.function_name, name);
        }
        for pair in extraction.blocks.windows(2) {
            prop_assert!(pair[0].span.end() <= pair[1].span.start);
        }
        prop_assert_eq!(
            extraction.stripped().matches('\n').count(),
            source.matches('\n').count()
        );
    }
}
