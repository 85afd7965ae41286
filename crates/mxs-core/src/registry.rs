//! Registry walk: one [`OpFunction`] per registered operator.
//!
//! Operators are installed under their registry name, case-sensitive.
//! Names carrying a submodule prefix (`_contrib_foo`) land in that submodule
//! with the prefix stripped; other `_`-prefixed names are internal.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{BindingConfig, SignaturePolicy};
use crate::engine::Engine;
use crate::op::OpFunction;
use crate::signature::OperatorSignature;
use crate::Result;

/// Registry name prefixes and the submodule each one maps to.
pub const SUBMODULE_PREFIXES: [(&str, &str); 5] = [
    ("_contrib_", "contrib"),
    ("_linalg_", "linalg"),
    ("_sparse_", "sparse"),
    ("_image_", "image"),
    ("_random_", "random"),
];

/// Where an operator is installed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Placement {
    Root,
    Internal,
    Submodule(&'static str),
}

/// Placement and function name for a registry name.
pub fn place(op_name: &str) -> (Placement, &str) {
    for (prefix, module) in SUBMODULE_PREFIXES {
        if let Some(stripped) = op_name.strip_prefix(prefix) {
            return (Placement::Submodule(module), stripped);
        }
    }
    if op_name.starts_with('_') {
        (Placement::Internal, op_name)
    } else {
        (Placement::Root, op_name)
    }
}

/// Installed operator functions.
#[derive(Debug, Default)]
pub struct OpNamespace {
    root: BTreeMap<String, OpFunction>,
    internal: BTreeMap<String, OpFunction>,
    submodules: BTreeMap<&'static str, BTreeMap<String, OpFunction>>,
    skipped: Vec<String>,
}

impl OpNamespace {
    /// Walk the engine's registry and synthesize every operator.
    pub fn load(engine: Arc<dyn Engine>, config: &BindingConfig) -> Result<Self> {
        let mut ns = Self::default();
        for (handle, op_name) in engine.list_ops()? {
            let meta = engine.op_metadata(handle)?;
            let (placement, func_name) = place(&op_name);
            let signature = match OperatorSignature::from_metadata(func_name, &meta) {
                Ok(signature) => signature,
                Err(err) if config.signature_policy == SignaturePolicy::Skip => {
                    tracing::warn!(op = %op_name, error = %err, "skipping operator");
                    ns.skipped.push(op_name);
                    continue;
                }
                Err(err) => return Err(err),
            };
            let func = OpFunction::synthesize(signature, Arc::clone(&engine));
            let table = match placement {
                Placement::Root => &mut ns.root,
                Placement::Internal => &mut ns.internal,
                Placement::Submodule(module) => ns.submodules.entry(module).or_default(),
            };
            table.insert(func_name.to_string(), func);
        }
        tracing::info!(
            operators = ns.len(),
            skipped = ns.skipped.len(),
            "operator namespace loaded"
        );
        Ok(ns)
    }

    pub fn get(&self, name: &str) -> Option<&OpFunction> {
        self.root.get(name)
    }

    pub fn internal(&self, name: &str) -> Option<&OpFunction> {
        self.internal.get(name)
    }

    pub fn submodule(&self, module: &str, name: &str) -> Option<&OpFunction> {
        self.submodules.get(module)?.get(name)
    }

    pub fn submodule_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.submodules.keys().copied()
    }

    /// All installed functions with their qualified name
    /// (`Concat`, `_copy`, `contrib.quadratic`).
    pub fn iter(&self) -> impl Iterator<Item = (String, &OpFunction)> + '_ {
        let root = self.root.iter().map(|(n, f)| (n.clone(), f));
        let internal = self.internal.iter().map(|(n, f)| (n.clone(), f));
        let subs = self
            .submodules
            .iter()
            .flat_map(|(m, t)| t.iter().map(move |(n, f)| (format!("{m}.{n}"), f)));
        root.chain(internal).chain(subs)
    }

    /// Registry names left out under [`SignaturePolicy::Skip`].
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.root.len()
            + self.internal.len()
            + self.submodules.values().map(BTreeMap::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement() {
        assert_eq!(place("Concat"), (Placement::Root, "Concat"));
        assert_eq!(place("_copy"), (Placement::Internal, "_copy"));
        assert_eq!(
            place("_contrib_quadratic"),
            (Placement::Submodule("contrib"), "quadratic")
        );
        assert_eq!(
            place("_random_uniform"),
            (Placement::Submodule("random"), "uniform")
        );
        assert_eq!(place("_linalg_gemm2").1, "gemm2");
    }
}
