//! Operator signature model and argument classification.
//!
//! The engine describes every operator argument with a free-form type tag
//! such as `"NDArray-or-Symbol"`, `"Symbol[]"` or `"int (non-negative),
//! required"`. Classification turns those tags into the calling convention
//! of the synthesized function, once per operator.

use serde::{Deserialize, Serialize};

use crate::engine::OpHandle;
use crate::{MxsError, Result};

/// Type-tag prefixes that denote graph-node arguments.
pub const NODE_TYPE_PREFIXES: [&str; 2] = ["NDArray", "Symbol"];

/// Type-tag suffix that turns a node argument into a node list.
pub const ARRAY_SUFFIX: &str = "[]";

/// The argument that is always scalar and coerced to a canonical type name.
pub const DTYPE_ARG: &str = "dtype";

/// One argument as reported by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawArgument {
    pub name: String,
    pub type_tag: String,
    pub description: String,
}

impl RawArgument {
    pub fn new(
        name: impl Into<String>,
        type_tag: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_tag: type_tag.into(),
            description: description.into(),
        }
    }
}

/// Introspected description of one registered operator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorMetadata {
    pub op_name: String,
    pub handle: OpHandle,
    pub description: String,
    pub args: Vec<RawArgument>,
    /// Name of the scalar argument carrying the node-input count; may be empty.
    pub key_var_num_args: String,
    pub return_type: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgumentKind {
    VariadicNode,
    OptionalNode,
    DtypeScalar,
    PlainScalar,
}

impl ArgumentKind {
    /// Kind of a single argument. The `dtype` check comes first: it is scalar
    /// whatever its type tag says.
    pub fn of(arg: &RawArgument) -> Self {
        if arg.name == DTYPE_ARG {
            ArgumentKind::DtypeScalar
        } else if NODE_TYPE_PREFIXES
            .iter()
            .any(|prefix| arg.type_tag.starts_with(prefix))
        {
            if arg.type_tag.ends_with(ARRAY_SUFFIX) {
                ArgumentKind::VariadicNode
            } else {
                ArgumentKind::OptionalNode
            }
        } else {
            ArgumentKind::PlainScalar
        }
    }

    pub fn is_node(self) -> bool {
        matches!(self, ArgumentKind::VariadicNode | ArgumentKind::OptionalNode)
    }
}

/// Calling convention of one operator, derived once from its metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorSignature {
    pub func_name: String,
    pub handle: OpHandle,
    pub variadic_arg_name: Option<String>,
    pub optional_node_names: Vec<String>,
    pub plain_scalar_names: Vec<String>,
    pub dtype_name: Option<String>,
    pub key_variadic_arg_name: Option<String>,
    /// Static parameters of the keyword-only form: node arguments, then
    /// scalar arguments (dtype included), each in declaration order.
    pub parameters: Vec<String>,
}

impl OperatorSignature {
    pub fn has_variadic_node(&self) -> bool {
        self.variadic_arg_name.is_some()
    }

    /// Whether `name` is one of the declared static parameters.
    pub fn declares(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p == name)
    }

    pub fn from_metadata(func_name: &str, meta: &OperatorMetadata) -> Result<Self> {
        classify(func_name, meta.handle, &meta.args, &meta.key_var_num_args)
    }
}

/// Classify declared arguments into an [`OperatorSignature`].
///
/// At most one node-list argument is allowed and no node argument may follow
/// it; it fills the last positional slot. Scalars may still follow it.
pub fn classify(
    func_name: &str,
    handle: OpHandle,
    args: &[RawArgument],
    key_var_num_args: &str,
) -> Result<OperatorSignature> {
    let mut variadic_arg_name: Option<String> = None;
    let mut optional_node_names = Vec::new();
    let mut plain_scalar_names = Vec::new();
    let mut scalar_order = Vec::new();
    let mut dtype_name = None;

    for arg in args {
        let kind = ArgumentKind::of(arg);
        if kind.is_node()
            && let Some(existing) = &variadic_arg_name
        {
            let reason = if kind == ArgumentKind::VariadicNode {
                format!(
                    "only one variable-size argument is allowed, found `{existing}` and `{}`",
                    arg.name
                )
            } else {
                format!(
                    "variable-size argument `{existing}` must be the last Symbol argument, \
                     but `{}` follows it",
                    arg.name
                )
            };
            return Err(MxsError::Signature {
                op: func_name.to_string(),
                reason,
            });
        }

        match kind {
            ArgumentKind::VariadicNode => variadic_arg_name = Some(arg.name.clone()),
            ArgumentKind::OptionalNode => optional_node_names.push(arg.name.clone()),
            ArgumentKind::DtypeScalar => {
                dtype_name = Some(arg.name.clone());
                scalar_order.push(arg.name.clone());
            }
            ArgumentKind::PlainScalar => {
                plain_scalar_names.push(arg.name.clone());
                scalar_order.push(arg.name.clone());
            }
        }
    }

    let mut parameters = optional_node_names.clone();
    parameters.extend(scalar_order);

    Ok(OperatorSignature {
        func_name: func_name.to_string(),
        handle,
        variadic_arg_name,
        optional_node_names,
        plain_scalar_names,
        dtype_name,
        key_variadic_arg_name: (!key_var_num_args.is_empty())
            .then(|| key_var_num_args.to_string()),
        parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arg(name: &str, type_tag: &str) -> RawArgument {
        RawArgument::new(name, type_tag, "")
    }

    #[test]
    fn test_argument_kinds() {
        assert_eq!(
            ArgumentKind::of(&arg("data", "NDArray-or-Symbol")),
            ArgumentKind::OptionalNode
        );
        assert_eq!(
            ArgumentKind::of(&arg("data", "Symbol[]")),
            ArgumentKind::VariadicNode
        );
        assert_eq!(
            ArgumentKind::of(&arg("args", "NDArray-or-Symbol[]")),
            ArgumentKind::VariadicNode
        );
        assert_eq!(
            ArgumentKind::of(&arg("num_hidden", "int, required")),
            ArgumentKind::PlainScalar
        );
        assert_eq!(
            ArgumentKind::of(&arg("kernel", "Shape(tuple), optional, default=[]")),
            ArgumentKind::PlainScalar
        );
    }

    #[test]
    fn test_dtype_wins_over_node_tag() {
        assert_eq!(
            ArgumentKind::of(&arg("dtype", "Symbol")),
            ArgumentKind::DtypeScalar
        );
    }

    #[test]
    fn test_keyword_only_signature() {
        let sig = classify(
            "FullyConnected",
            OpHandle(3),
            &[
                arg("data", "NDArray-or-Symbol"),
                arg("weight", "NDArray-or-Symbol"),
                arg("num_hidden", "int, required"),
                arg("dtype", "{'float16', 'float32'}, optional"),
                arg("no_bias", "boolean, optional, default=0"),
            ],
            "",
        )
        .unwrap();
        assert!(!sig.has_variadic_node());
        assert_eq!(sig.optional_node_names, ["data", "weight"]);
        assert_eq!(sig.plain_scalar_names, ["num_hidden", "no_bias"]);
        assert_eq!(sig.dtype_name.as_deref(), Some("dtype"));
        assert_eq!(sig.key_variadic_arg_name, None);
        assert_eq!(
            sig.parameters,
            ["data", "weight", "num_hidden", "dtype", "no_bias"]
        );
    }

    #[test]
    fn test_variadic_followed_by_scalars() {
        let sig = classify(
            "Concat",
            OpHandle(1),
            &[
                arg("data", "NDArray-or-Symbol[]"),
                arg("num_args", "int, required"),
                arg("dim", "int, optional, default='1'"),
            ],
            "num_args",
        )
        .unwrap();
        assert!(sig.has_variadic_node());
        assert_eq!(sig.variadic_arg_name.as_deref(), Some("data"));
        assert_eq!(sig.key_variadic_arg_name.as_deref(), Some("num_args"));
    }

    #[test]
    fn test_two_variadic_args_rejected() {
        let err = classify(
            "Bad",
            OpHandle(0),
            &[arg("a", "Symbol[]"), arg("b", "Symbol[]")],
            "",
        )
        .unwrap_err();
        match err {
            MxsError::Signature { op, reason } => {
                assert_eq!(op, "Bad");
                assert!(reason.contains("only one"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_node_after_variadic_rejected() {
        let err = classify(
            "Bad",
            OpHandle(0),
            &[arg("data", "Symbol[]"), arg("weight", "NDArray-or-Symbol")],
            "",
        )
        .unwrap_err();
        assert!(matches!(err, MxsError::Signature { .. }));
        assert!(err.to_string().contains("`weight` follows it"));
    }
}
