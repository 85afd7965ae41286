//! Argument values accepted by synthesized operator functions.
//!
//! A call receives either graph nodes ([`Symbol`]) or scalar hyperparameters
//! ([`Scalar`]). The split is a closed sum type so routing is a `match`.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::DType;

/// Engine-side identifier of a created symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolHandle(pub u64);

/// Reference to a node in the symbolic graph.
///
/// Symbols are produced by an [`Engine`](crate::Engine); this crate never
/// inspects them beyond their identity.
#[derive(Clone, Debug)]
pub struct Symbol {
    handle: SymbolHandle,
    name: Arc<str>,
}

impl Symbol {
    pub fn new(handle: SymbolHandle, name: impl Into<Arc<str>>) -> Self {
        Self {
            handle,
            name: name.into(),
        }
    }

    pub fn handle(&self) -> SymbolHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Symbol {}>", self.name)
    }
}

/// Scalar hyperparameter value.
///
/// `Display` renders the string form the engine parses for `vals`.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tuple(Vec<i64>),
    DType(DType),
}

impl Scalar {
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::Str(_) => "str",
            Scalar::Tuple(_) => "tuple",
            Scalar::DType(_) => "dtype",
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(true) => f.write_str("True"),
            Scalar::Bool(false) => f.write_str("False"),
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) => write_float(f, *v),
            Scalar::Str(s) => f.write_str(s),
            Scalar::Tuple(items) => {
                write!(f, "(")?;
                for (i, d) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{d}")?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Scalar::DType(dt) => f.write_str(dt.canonical_name()),
        }
    }
}

/// Shortest round-trip form, switching to exponent notation outside
/// `1e-4 <= |v| < 1e16` with a signed, two-digit exponent (`1e+20`, `1e-07`).
fn write_float(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.is_nan() {
        return f.write_str("nan");
    }
    if v.is_infinite() {
        return f.write_str(if v > 0.0 { "inf" } else { "-inf" });
    }
    let abs = v.abs();
    if abs == 0.0 || (1e-4..1e16).contains(&abs) {
        return if v.fract() == 0.0 {
            write!(f, "{v:.1}")
        } else {
            write!(f, "{v}")
        };
    }
    let repr = format!("{v:e}");
    let (mantissa, exp) = repr.split_once('e').unwrap_or((repr.as_str(), "0"));
    let (sign, digits) = match exp.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exp),
    };
    write!(f, "{mantissa}e{sign}{digits:0>2}")
}

/// A single argument value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Node(Symbol),
    Scalar(Scalar),
    /// Explicitly unset; the engine applies its own default.
    Null,
}

impl Value {
    /// Short description used in error messages, e.g. `int 3`.
    pub fn describe(&self) -> String {
        match self {
            Value::Node(sym) => format!("Symbol `{}`", sym.name()),
            Value::Scalar(Scalar::Str(s)) => format!("str {s:?}"),
            Value::Scalar(s) => format!("{} {s}", s.type_name()),
            Value::Null => "null".to_string(),
        }
    }
}

impl From<Symbol> for Value {
    fn from(sym: Symbol) -> Self {
        Value::Node(sym)
    }
}

impl From<&Symbol> for Value {
    fn from(sym: &Symbol) -> Self {
        Value::Node(sym.clone())
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

macro_rules! scalar_from {
    ($($ty:ty => |$v:ident| $conv:expr),* $(,)?) => {
        $(
            impl From<$ty> for Scalar {
                fn from($v: $ty) -> Self {
                    $conv
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Scalar(Scalar::from(v))
                }
            }
        )*
    };
}

scalar_from! {
    bool => |v| Scalar::Bool(v),
    i32 => |v| Scalar::Int(i64::from(v)),
    i64 => |v| Scalar::Int(v),
    u32 => |v| Scalar::Int(i64::from(v)),
    f32 => |v| Scalar::Float(f64::from(v)),
    f64 => |v| Scalar::Float(v),
    &str => |v| Scalar::Str(v.to_string()),
    String => |v| Scalar::Str(v),
    DType => |v| Scalar::DType(v),
    Vec<i64> => |v| Scalar::Tuple(v),
    &[i64] => |v| Scalar::Tuple(v.to_vec()),
}

impl<const N: usize> From<[i64; N]> for Scalar {
    fn from(v: [i64; N]) -> Self {
        Scalar::Tuple(v.to_vec())
    }
}

impl<const N: usize> From<[i64; N]> for Value {
    fn from(v: [i64; N]) -> Self {
        Value::Scalar(Scalar::from(v))
    }
}
