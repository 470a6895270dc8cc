//! Placeholder kernels for assembly blocks
//!
//! The device compiler never sees assembly. Each block is replaced by an
//! OpenCL C kernel with the same name and parameter count that reserves at
//! least as many registers and as much code space as the real machine code
//! needs. The kernel opens with two literal moves whose encoding is the
//! patch anchor, so the patcher can find where its code starts.
//!
//! The generated text is spliced onto a single source line, so it must not
//! contain line comments or preprocessor directives.

use super::patcher::ANCHOR_LITERAL;
use std::fmt::Write as FmtWrite;

/// Vector register floor below which the device compiler tends to shrink
/// the kernel's allocation
pub const MIN_VECTOR_REGISTERS: usize = 15;

/// The only work-item id that skips the early exit; no launch is that large
const GUARD_ID: u32 = 0x7FFF_FFF3;

/// Generates dummy kernels
#[derive(Debug, Clone)]
pub struct DummySynthesizer {
    min_vector_registers: usize,
    anchor_literal: u32,
}

impl DummySynthesizer {
    /// Create a synthesizer
    pub fn new(min_vector_registers: usize, anchor_literal: u32) -> Self {
        DummySynthesizer {
            min_vector_registers,
            anchor_literal,
        }
    }

    /// Emits the dummy kernel for one block
    ///
    /// The body keeps `max(vector_registers, min)` float values and
    /// `scalar_registers` uniform values live across a loop whose trip count
    /// the compiler cannot know, and runs about one `mad` per two code words
    /// inside it. Only `p0[0]` is written; with no parameters nothing is.
    pub fn synthesize(
        &self,
        function_name: &str,
        param_count: usize,
        vector_registers: usize,
        scalar_registers: usize,
        code_words: usize,
    ) -> String {
        // v0 and v1 hold the anchor literals
        let vgprs = vector_registers.max(self.min_vector_registers).max(2);
        let sgprs = scalar_registers.max(1);
        let mads = code_words.div_ceil(2).max(1);

        let params = (0..param_count)
            .map(|i| format!("__global float* p{}", i))
            .collect::<Vec<_>>()
            .join(", ");

        let mut s = String::new();
        let _ = writeln!(s, "__kernel void {}({})", function_name, params);
        s.push_str("{\n");
        let _ = writeln!(s, "    float v0 = as_float(0x{:08X}u);", self.anchor_literal);
        let _ = writeln!(
            s,
            "    float v1 = as_float(0x{:08X}u);",
            self.anchor_literal.wrapping_add(1)
        );
        s.push_str("    uint gid = get_global_id(0);\n");
        let _ = writeln!(s, "    if (gid != 0x{:08X}u) return;", GUARD_ID);

        for k in 0..sgprs {
            let _ = writeln!(
                s,
                "    uint s{} = get_group_id(0) * {}u + {}u;",
                k,
                2 * k + 3,
                k
            );
        }
        for k in 2..vgprs {
            let _ = writeln!(s, "    float v{} = v{} * (float)(gid + {}u);", k, k - 1, k);
        }

        s.push_str("    for (uint i = 0; i < s0 % 7u; i++) {\n");
        for j in 0..mads {
            let _ = writeln!(
                s,
                "        v{} = mad(v{}, v{}, (float)(s{} ^ i));",
                j % vgprs,
                (j + 1) % vgprs,
                (j + 2) % vgprs,
                j % sgprs
            );
        }
        s.push_str("    }\n");

        if param_count > 0 {
            let vectors = (0..vgprs)
                .map(|k| format!("v{}", k))
                .collect::<Vec<_>>()
                .join(" + ");
            let scalars = (0..sgprs)
                .map(|k| format!("s{}", k))
                .collect::<Vec<_>>()
                .join(" ^ ");
            let _ = writeln!(s, "    p0[0] = {} + (float)({});", vectors, scalars);
        }
        s.push('}');
        s
    }
}

impl Default for DummySynthesizer {
    fn default() -> Self {
        Self::new(MIN_VECTOR_REGISTERS, ANCHOR_LITERAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy(params: usize, vgprs: usize, sgprs: usize, words: usize) -> String {
        DummySynthesizer::default().synthesize("k", params, vgprs, sgprs, words)
    }

    #[test]
    fn test_signature_matches_param_count() {
        let text = dummy(2, 4, 2, 8);
        assert!(text.starts_with("__kernel void k(__global float* p0, __global float* p1)\n"));
        assert_eq!(text.matches("__global float*").count(), 2);
    }

    #[test]
    fn test_opens_with_anchor_moves() {
        let text = dummy(1, 0, 0, 0);
        let body: Vec<&str> = text.lines().skip(2).take(2).collect();
        assert_eq!(
            body,
            vec![
                "    float v0 = as_float(0x4C3A2B19u);",
                "    float v1 = as_float(0x4C3A2B1Au);"
            ]
        );
    }

    #[test]
    fn test_register_floor_and_request() {
        assert_eq!(dummy(1, 3, 1, 1).matches("    float v").count(), 15);
        assert_eq!(dummy(1, 40, 1, 1).matches("    float v").count(), 40);
        assert_eq!(dummy(1, 0, 6, 1).matches("    uint s").count(), 6);
    }

    #[test]
    fn test_code_size_drives_loop_length() {
        assert_eq!(dummy(1, 0, 0, 0).matches("mad(").count(), 1);
        assert_eq!(dummy(1, 0, 0, 9).matches("mad(").count(), 5);
        assert_eq!(dummy(1, 0, 0, 64).matches("mad(").count(), 32);
    }

    #[test]
    fn test_single_output_write() {
        let text = dummy(3, 0, 2, 4);
        assert_eq!(text.matches("p0[0] =").count(), 1);
        assert!(!text.contains("p1["));
        assert!(text.contains("(float)(s0 ^ s1)"));
    }

    #[test]
    fn test_zero_params_writes_nothing() {
        let text = dummy(0, 0, 0, 4);
        assert!(text.starts_with("__kernel void k()\n"));
        assert!(!text.contains("p0"));
    }

    #[test]
    fn test_safe_to_flatten() {
        let text = dummy(2, 20, 4, 30);
        assert!(!text.contains("//"));
        assert!(!text.contains('#'));
        assert_eq!(text.matches('{').count(), text.matches('}').count());
    }
}
