//! Operator bindings for a symbolic compute graph.
//!
//! `mxs-core` turns the engine's registry of atomic operators into callable
//! [`OpFunction`]s. Each operator's string-typed argument metadata is
//! classified once into an [`OperatorSignature`]; the synthesized function
//! then routes every call into a single [`CreateRequest`] for the engine's
//! symbol-creation primitive.
//!
//! # Engines
//!
//! - `mxs-ffi-backend`: delegates to the engine C ABI via `mxs-sys`
//! - [`engine::RecordingEngine`]: in-process engine that records requests

pub mod attribute;
pub mod config;
pub mod engine;
pub mod name;
pub mod op;
pub mod registry;
pub mod signature;
pub mod types;
pub mod value;

pub use attribute::{AttrScope, Attrs};
pub use config::{BindingConfig, SignaturePolicy};
pub use engine::{CreateRequest, Engine, OpHandle};
pub use name::NameManager;
pub use op::{CallArgs, Convention, OpFunction};
pub use registry::OpNamespace;
pub use signature::{ArgumentKind, OperatorMetadata, OperatorSignature, RawArgument};
pub use types::DType;
pub use value::{Scalar, Symbol, SymbolHandle, Value};

pub type Result<T> = std::result::Result<T, MxsError>;

#[derive(thiserror::Error, Debug)]
pub enum MxsError {
    #[error("operator {op}: {reason}")]
    Signature { op: String, reason: String },

    #[error("operator {op}: argument `{param}` must be {expected}, but got {got}")]
    ArgumentType {
        op: String,
        param: String,
        expected: &'static str,
        got: String,
    },

    #[error("operator {op} takes no positional arguments, but got {count}")]
    UnexpectedPositional { op: String, count: usize },

    #[error("operator {op}: `{param}` is not a known dtype: {got}")]
    UnknownDType {
        op: String,
        param: String,
        got: String,
    },

    #[error("engine error: {0}")]
    Engine(String),

    #[error("import configuration error: {0}")]
    ImportConfiguration(String),

    #[error("FFI returned null pointer")]
    NullPtr,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
