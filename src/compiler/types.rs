//! # Register Types for Block Parameters
//!
//! Each parameter of an embedded block is passed to the assembly body in
//! registers. The declared kernel-language type decides which register type
//! the assembler sees.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address-space and cv qualifiers that do not change the register type
const QUALIFIERS: &[&str] = &[
    "__global",
    "global",
    "__local",
    "local",
    "__constant",
    "constant",
    "__private",
    "private",
    "const",
    "volatile",
    "restrict",
];

/// Register-level parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegisterType {
    /// 8-bit signed integer
    I8,
    /// 8-bit unsigned integer
    U8,
    /// 16-bit signed integer
    I16,
    /// 16-bit unsigned integer
    U16,
    /// 32-bit signed integer
    I32,
    /// 32-bit unsigned integer
    U32,
    /// 64-bit signed integer
    I64,
    /// 64-bit unsigned integer
    U64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
    /// Boolean
    Bool,
}

/// Width of a device pointer, serialized as its byte count (4 or 8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PointerWidth {
    /// 32-bit addressing
    Bits32,
    /// 64-bit addressing
    #[default]
    Bits64,
}

impl PointerWidth {
    /// Unsigned integer register type of this width
    pub fn register_type(self) -> RegisterType {
        match self {
            PointerWidth::Bits32 => RegisterType::U32,
            PointerWidth::Bits64 => RegisterType::U64,
        }
    }
}

impl TryFrom<u8> for PointerWidth {
    type Error = String;

    fn try_from(bytes: u8) -> std::result::Result<Self, Self::Error> {
        match bytes {
            4 => Ok(PointerWidth::Bits32),
            8 => Ok(PointerWidth::Bits64),
            other => Err(format!("pointer width must be 4 or 8 bytes, got {}", other)),
        }
    }
}

impl From<PointerWidth> for u8 {
    fn from(width: PointerWidth) -> u8 {
        width.register_type().size_bytes() as u8
    }
}

impl RegisterType {
    /// Size in bytes
    pub fn size_bytes(self) -> usize {
        match self {
            RegisterType::I8 | RegisterType::U8 | RegisterType::Bool => 1,
            RegisterType::I16 | RegisterType::U16 => 2,
            RegisterType::I32 | RegisterType::U32 | RegisterType::F32 => 4,
            RegisterType::I64 | RegisterType::U64 | RegisterType::F64 => 8,
        }
    }

    /// Maps a declared parameter type to its register type
    ///
    /// Qualifiers are ignored and any pointer maps to the unsigned integer of
    /// `pointer_width`. Returns `None` for types outside the table.
    pub fn from_declared(declared: &str, pointer_width: PointerWidth) -> Option<RegisterType> {
        if declared.contains('*') {
            let base = declared.replace('*', " ");
            // `*` alone is not a type
            return base
                .split_whitespace()
                .any(|w| !QUALIFIERS.contains(&w))
                .then(|| pointer_width.register_type());
        }

        let words: Vec<&str> = declared
            .split_whitespace()
            .filter(|w| !QUALIFIERS.contains(w))
            .collect();

        let normalized = match words.as_slice() {
            ["unsigned"] => "uint".to_string(),
            ["signed"] => "int".to_string(),
            ["unsigned", rest] => format!("u{}", rest),
            ["signed", rest] => rest.to_string(),
            [single] => single.to_string(),
            _ => return None,
        };

        let ty = match normalized.as_str() {
            "char" | "int8_t" | "sbyte" => RegisterType::I8,
            "uchar" | "uint8_t" | "byte" => RegisterType::U8,
            "short" | "int16_t" => RegisterType::I16,
            "ushort" | "uint16_t" => RegisterType::U16,
            "int" | "int32_t" => RegisterType::I32,
            "uint" | "uint32_t" => RegisterType::U32,
            "long" | "int64_t" => RegisterType::I64,
            "ulong" | "uint64_t" | "size_t" => RegisterType::U64,
            "float" => RegisterType::F32,
            "double" => RegisterType::F64,
            "bool" => RegisterType::Bool,
            _ => return None,
        };
        Some(ty)
    }

    /// True if `word` can only be part of a type, never a parameter name
    pub fn is_type_word(word: &str) -> bool {
        QUALIFIERS.contains(&word)
            || matches!(word, "unsigned" | "signed")
            || RegisterType::from_declared(word, PointerWidth::default()).is_some()
    }
}

impl fmt::Display for RegisterType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            RegisterType::I8 => "i8",
            RegisterType::U8 => "u8",
            RegisterType::I16 => "i16",
            RegisterType::U16 => "u16",
            RegisterType::I32 => "i32",
            RegisterType::U32 => "u32",
            RegisterType::I64 => "i64",
            RegisterType::U64 => "u64",
            RegisterType::F32 => "f32",
            RegisterType::F64 => "f64",
            RegisterType::Bool => "bool",
        };
        write!(f, "{}", s)
    }
}
