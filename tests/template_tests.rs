//! Template expansion through the public API

use asmsplice::{Error, TemplateExpander};

fn expand(source: &str) -> Result<String, Error> {
    TemplateExpander::new().expand(source)
}

#[test]
fn test_unrolled_register_moves() {
    let source = "\
[[~ int count = 4;
[[~ for (int r = 0; r < count; r++) {
    v_mov_b32 v[[=r + 8]], s[[=r]]
[[~ }
    s_endpgm
";
    assert_eq!(
        expand(source).unwrap(),
        "    v_mov_b32 v8, s0\n    v_mov_b32 v9, s1\n    v_mov_b32 v10, s2\n    v_mov_b32 v11, s3\n    s_endpgm\n"
    );
}

#[test]
fn test_nested_loops_and_conditions() {
    let source = "[[ for (i = 0; i < 3; i++) { for (j = 0; j < 3; j++) { if (i == j) { ]]\
                  ([[=i]],[[=j]])[[ } } } ]]";
    assert_eq!(expand(source).unwrap(), "(0,0)(1,1)(2,2)");
}

#[test]
fn test_hex_offsets() {
    let source = "[[ base = 256; ]]s_load_dword s0, s[2:3], 0x[[=hex(base + 16)]]";
    assert_eq!(expand(source).unwrap(), "s_load_dword s0, s[2:3], 0x110");
}

#[test]
fn test_single_brackets_are_literal() {
    let source = "s_load_dwordx2 s[0:1], s[2:3], 0x0 [[# not emitted ]]";
    assert_eq!(expand(source).unwrap(), "s_load_dwordx2 s[0:1], s[2:3], 0x0 ");
}

#[test]
fn test_strings_and_ternary() {
    let source = "[[ for (k = 0; k < 4; k++) { ]][[= k % 2 == 0 ? \"even\" : \"odd\" + str(k) ]] [[ } ]]";
    assert_eq!(expand(source).unwrap(), "even odd1 even odd3 ");
}

#[test]
fn test_variables_persist_across_tags() {
    let source = "[[ total = 0; ]][[ for (i = 1; i <= 4; i++) total += i; ]]sum=[[=total]]";
    assert_eq!(expand(source).unwrap(), "sum=10");
}

#[test]
fn test_iteration_budget() {
    let result = TemplateExpander::new()
        .with_iteration_limit(50)
        .expand("[[ for (i = 0; i < 100; i++) { ]]x[[ } ]]");
    match result {
        Err(Error::TemplateEvalError { source }) => {
            assert_eq!(*source, Error::TooManyIterations { limit: 50 });
        }
        other => panic!("expected iteration budget error, got {:?}", other),
    }

    let ok = TemplateExpander::new()
        .with_iteration_limit(50)
        .expand("[[ for (i = 0; i < 49; i++) { ]]x[[ } ]]")
        .unwrap();
    assert_eq!(ok.len(), 49);
}

#[test]
fn test_division_by_zero_is_eval_error() {
    let err = expand("[[= 4 / 0 ]]").unwrap_err();
    assert!(matches!(err, Error::TemplateEvalError { .. }));
    assert!(err.to_string().contains("Division by zero"));
}

#[test]
fn test_unterminated_tag_reports_position() {
    match expand("ok\nstill ok [[ oops") {
        Err(Error::TemplateSyntaxError {
            line, col, listing, ..
        }) => {
            assert_eq!((line, col), (2, 10));
            assert!(listing.contains("   2 | still ok [[ oops"));
        }
        other => panic!("expected syntax error, got {:?}", other),
    }
}
