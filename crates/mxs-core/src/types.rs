//! Core type definitions: DType.

use serde::{Deserialize, Serialize};

/// Element types the engine understands by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Float16,
    BFloat16,
    Float32,
    Float64,
    UInt8,
    Int8,
    Int32,
    Int64,
    Bool,
}

impl DType {
    pub const ALL: [DType; 9] = [
        DType::Float16,
        DType::BFloat16,
        DType::Float32,
        DType::Float64,
        DType::UInt8,
        DType::Int8,
        DType::Int32,
        DType::Int64,
        DType::Bool,
    ];

    /// Canonical type name as expected by the engine's parameter parser.
    pub fn canonical_name(self) -> &'static str {
        match self {
            DType::Float16 => "float16",
            DType::BFloat16 => "bfloat16",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::UInt8 => "uint8",
            DType::Int8 => "int8",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Bool => "bool",
        }
    }

    /// Parse a canonical name, a numpy type name or a numpy type code.
    ///
    /// Follows numpy: `float` is `float64`, `int` is `int64`, and the
    /// one-letter codes count bytes (`i8` is `int64`, `f4` is `float32`).
    pub fn parse(name: &str) -> Option<DType> {
        let name = name.trim();
        let dtype = match name {
            // Codes are case-sensitive.
            "f2" | "e" => DType::Float16,
            "f4" | "f" => DType::Float32,
            "f8" | "d" => DType::Float64,
            "u1" | "B" => DType::UInt8,
            "i1" | "b" => DType::Int8,
            "i4" => DType::Int32,
            "i8" | "q" => DType::Int64,
            "b1" | "?" => DType::Bool,
            _ => match name.to_ascii_lowercase().as_str() {
                "float16" | "half" => DType::Float16,
                "bfloat16" | "bf16" => DType::BFloat16,
                "float32" | "single" | "f32" => DType::Float32,
                "float64" | "double" | "float" | "float_" | "f64" => DType::Float64,
                "uint8" | "ubyte" => DType::UInt8,
                "int8" | "byte" => DType::Int8,
                "int32" | "intc" | "i32" => DType::Int32,
                "int64" | "int" | "int_" | "long" | "i64" => DType::Int64,
                "bool" | "bool_" => DType::Bool,
                _ => return None,
            },
        };
        Some(dtype)
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.canonical_name())
    }
}
