//! Engine trait: the boundary to the native graph engine.
//!
//! An `Engine` enumerates registered operators, reports their metadata, and
//! creates symbols. Everything above it (classification, call routing, scope
//! handling) is engine-agnostic.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::signature::OperatorMetadata;
use crate::value::{Symbol, SymbolHandle};
use crate::{MxsError, Result};

/// Engine-side identifier of a registered operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpHandle(pub u64);

/// One normalized call into the symbol-creation primitive.
#[derive(Clone, Debug, PartialEq)]
pub struct CreateRequest {
    pub handle: OpHandle,
    /// Node list of the variadic convention; `None` for keyword-only operators.
    pub positional: Option<SmallVec<[Symbol; 4]>>,
    /// Node inputs passed by name, in routing order.
    pub keyword: Vec<(String, Symbol)>,
    pub keys: Vec<String>,
    pub vals: Vec<String>,
    pub name: String,
}

impl CreateRequest {
    /// Value recorded for scalar `key`, if any.
    pub fn val(&self, key: &str) -> Option<&str> {
        self.keys
            .iter()
            .position(|k| k == key)
            .map(|i| self.vals[i].as_str())
    }

    /// Number of node inputs carried by this request.
    pub fn node_count(&self) -> usize {
        self.positional.as_ref().map_or(0, |p| p.len()) + self.keyword.len()
    }
}

/// Pluggable graph engine.
pub trait Engine: Send + Sync {
    /// All registered operators as `(handle, name)`.
    fn list_ops(&self) -> Result<Vec<(OpHandle, String)>>;

    /// Metadata of one operator.
    fn op_metadata(&self, handle: OpHandle) -> Result<OperatorMetadata>;

    /// Create a symbol. Engine failures are returned as [`MxsError::Engine`].
    fn create_symbol(&self, request: CreateRequest) -> Result<Symbol>;
}

/// In-process engine that serves a fixed metadata table and records every
/// creation request instead of building a native graph.
pub struct RecordingEngine {
    ops: Vec<OperatorMetadata>,
    requests: Mutex<Vec<CreateRequest>>,
    failure: Mutex<Option<String>>,
    next: AtomicU64,
}

impl RecordingEngine {
    pub fn new(ops: Vec<OperatorMetadata>) -> Self {
        Self {
            ops,
            requests: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            next: AtomicU64::new(1),
        }
    }

    /// A leaf symbol, standing in for a graph variable.
    pub fn variable(&self, name: &str) -> Symbol {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        Symbol::new(SymbolHandle(id), name)
    }

    /// Make every following `create_symbol` fail with `message` (or succeed
    /// again with `None`).
    pub fn set_failure(&self, message: Option<String>) {
        *self.failure.lock() = message;
    }

    pub fn requests(&self) -> Vec<CreateRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<CreateRequest> {
        self.requests.lock().last().cloned()
    }
}

impl Engine for RecordingEngine {
    fn list_ops(&self) -> Result<Vec<(OpHandle, String)>> {
        Ok(self
            .ops
            .iter()
            .map(|op| (op.handle, op.op_name.clone()))
            .collect())
    }

    fn op_metadata(&self, handle: OpHandle) -> Result<OperatorMetadata> {
        self.ops
            .iter()
            .find(|op| op.handle == handle)
            .cloned()
            .ok_or_else(|| MxsError::Engine(format!("unknown operator handle {}", handle.0)))
    }

    fn create_symbol(&self, request: CreateRequest) -> Result<Symbol> {
        if let Some(message) = self.failure.lock().clone() {
            return Err(MxsError::Engine(message));
        }
        let sym = self.variable(&request.name);
        self.requests.lock().push(request);
        Ok(sym)
    }
}
