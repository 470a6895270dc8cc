//! # Binary Patching
//!
//! Overwrites each dummy kernel's code in the compiled device binary with the
//! real machine code of its block.
//!
//! A dummy's code is located by its opening literal move:
//!
//! ```text
//! FF 02 00 7E 19 2B 3A 4C FF 02    v_mov_b32 vN, 0x4C3A2B19 ; v_mov_b32 ...
//! FF FF 00 FE FF FF FF FF FF FF    mask: destination register ignored
//! ```
//!
//! Blocks are patched in order and every search restarts at offset 0. A
//! patched anchor no longer matches, so block `n` lands on the `n`th dummy
//! still carrying one. A block that writes nothing over its anchor (empty
//! machine code or an overflow) still claims it, and later searches pass
//! over claimed offsets.

use super::extractor::AsmBlock;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Literal loaded by the first anchor move
pub const ANCHOR_LITERAL: u32 = 0x4C3A_2B19;

/// Masked byte signature marking the start of a dummy's code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorPattern {
    pub signature: Vec<u8>,
    pub mask: Vec<u8>,
}

impl Default for AnchorPattern {
    fn default() -> Self {
        AnchorPattern {
            signature: vec![0xFF, 0x02, 0x00, 0x7E, 0x19, 0x2B, 0x3A, 0x4C, 0xFF, 0x02],
            mask: vec![0xFF, 0xFF, 0x00, 0xFE, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
        }
    }
}

impl AnchorPattern {
    /// Checks that signature and mask are non-empty and the same length
    pub fn validate(&self) -> Result<()> {
        if self.signature.is_empty() {
            return Err(Error::InvalidOptions(
                "anchor signature must not be empty".to_string(),
            ));
        }
        if self.signature.len() != self.mask.len() {
            return Err(Error::InvalidOptions(format!(
                "anchor signature has {} bytes but mask has {}",
                self.signature.len(),
                self.mask.len()
            )));
        }
        Ok(())
    }

    /// Literal of the first move, read little-endian from bytes 4..8
    pub fn literal(&self) -> Option<u32> {
        let bytes: [u8; 4] = self.signature.get(4..8)?.try_into().ok()?;
        Some(u32::from_le_bytes(bytes))
    }

    /// First match in `haystack`
    pub fn find(&self, haystack: &[u8]) -> Option<usize> {
        find_masked(haystack, &self.signature, &self.mask)
    }
}

/// Finds the first `i` where `(mask[y] & haystack[i + y]) == (mask[y] & signature[y])` for all `y`
pub fn find_masked(haystack: &[u8], signature: &[u8], mask: &[u8]) -> Option<usize> {
    if signature.is_empty() || signature.len() != mask.len() || haystack.len() < signature.len() {
        return None;
    }
    haystack.windows(signature.len()).position(|window| {
        window
            .iter()
            .zip(signature)
            .zip(mask)
            .all(|((&b, &s), &m)| b & m == s & m)
    })
}

/// What happened to one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchOutcome {
    /// Machine code written at `offset`
    Applied {
        function: String,
        offset: usize,
        length: usize,
    },
    /// No anchor left in the binary
    AnchorNotFound { function: String },
    /// Anchor found but the block has no machine code to write
    EmptyCode { function: String, offset: usize },
    /// Machine code would run past the end of the binary
    Overflow {
        function: String,
        offset: usize,
        length: usize,
        available: usize,
    },
}

impl PatchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, PatchOutcome::Applied { .. })
    }

    /// Warning text for outcomes that skipped a block
    pub fn warning(&self) -> Option<String> {
        match self {
            PatchOutcome::Applied { .. } => None,
            PatchOutcome::AnchorNotFound { function } => Some(
                Error::PatchAnchorNotFound {
                    function: function.clone(),
                }
                .to_string(),
            ),
            PatchOutcome::EmptyCode { function, offset } => Some(format!(
                "Machine code of {} is empty; dummy at offset {:#x} left unpatched",
                function, offset
            )),
            PatchOutcome::Overflow {
                function,
                offset,
                length,
                available,
            } => Some(format!(
                "Machine code of {} ({} bytes) does not fit at offset {:#x}, {} bytes available; block skipped",
                function, length, offset, available
            )),
        }
    }
}

/// Patched binary plus per-block outcomes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub binary: Vec<u8>,
    pub outcomes: Vec<PatchOutcome>,
}

impl PatchReport {
    /// Number of blocks written into the binary
    pub fn applied(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_applied()).count()
    }
}

/// Writes block machine code over dummy anchors
#[derive(Debug, Clone, Default)]
pub struct BinaryPatcher {
    anchor: AnchorPattern,
}

impl BinaryPatcher {
    pub fn new(anchor: AnchorPattern) -> Self {
        BinaryPatcher { anchor }
    }

    /// Patches a copy of `binary`; the result always has the same length
    pub fn patch(&self, binary: &[u8], blocks: &[AsmBlock]) -> PatchReport {
        let mut patched = binary.to_vec();
        let mut outcomes = Vec::with_capacity(blocks.len());
        let mut claimed = Vec::new();

        for block in blocks {
            let function = block.function_name.clone();
            let length = block.machine_code.len();

            let outcome = match self.find_unclaimed(&patched, &claimed) {
                None => PatchOutcome::AnchorNotFound { function },
                Some(offset) if length == 0 => {
                    claimed.push(offset);
                    PatchOutcome::EmptyCode { function, offset }
                }
                Some(offset) if offset + length > patched.len() => {
                    claimed.push(offset);
                    PatchOutcome::Overflow {
                        function,
                        offset,
                        length,
                        available: patched.len() - offset,
                    }
                }
                Some(offset) => {
                    patched[offset..offset + length].copy_from_slice(&block.machine_code);
                    tracing::debug!(function = %function, offset, length, "patched block");
                    PatchOutcome::Applied {
                        function,
                        offset,
                        length,
                    }
                }
            };
            outcomes.push(outcome);
        }

        PatchReport {
            binary: patched,
            outcomes,
        }
    }

    /// First anchor from offset 0 that no earlier block has claimed
    fn find_unclaimed(&self, binary: &[u8], claimed: &[usize]) -> Option<usize> {
        let mut start = 0;
        while start < binary.len() {
            let offset = start + self.anchor.find(&binary[start..])?;
            if !claimed.contains(&offset) {
                return Some(offset);
            }
            start = offset + 1;
        }
        None
    }
}
