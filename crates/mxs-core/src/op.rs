//! Synthesized operator functions and call routing.
//!
//! An [`OpFunction`] is built once per registered operator from its
//! [`OperatorSignature`]. The calling convention is fixed at synthesis:
//!
//! - **Variadic**: the operator takes a node list (e.g. `Concat`). Positional
//!   arguments must all be symbols; keywords are split by value kind.
//! - **KeywordOnly**: every other operator. Declared node arguments and
//!   scalar hyperparameters are matched by name; unknown keywords are still
//!   forwarded so engine-side additions keep working.
//!
//! Every call ends in exactly one [`Engine::create_symbol`]. Argument errors
//! are detected before the request is built, so a failed call leaves no
//! engine-side state and does not consume a generated name.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::attribute::{AttrScope, Attrs};
use crate::engine::{CreateRequest, Engine};
use crate::name::NameManager;
use crate::signature::OperatorSignature;
use crate::types::DType;
use crate::value::{Scalar, Symbol, Value};
use crate::{MxsError, Result};

const NAME_KW: &str = "name";
const ATTR_KW: &str = "attr";
const OUT_KW: &str = "out";

/// Arguments of one call to a synthesized operator.
#[derive(Clone, Debug, Default)]
pub struct CallArgs {
    positional: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    name: Option<String>,
    attr: Option<Attrs>,
    out: Option<Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn args<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.positional.extend(values.into_iter().map(Into::into));
        self
    }

    /// Set a keyword argument. Keywords keep their first-set position;
    /// setting a key again replaces its value.
    pub fn kw(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.kwargs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.kwargs.push((key, value)),
        }
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attributes for this call only; they override the ambient scope.
    pub fn attr<I, K, V>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.attr = Some(
            attrs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Accepted for symmetry with eager array functions; has no effect when
    /// building a graph.
    pub fn out(mut self, value: impl Into<Value>) -> Self {
        self.out = Some(value.into());
        self
    }
}

/// Calling convention chosen at synthesis time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Convention {
    Variadic { arg_name: String },
    KeywordOnly,
}

/// Callable bound to one registered operator.
#[derive(Clone)]
pub struct OpFunction {
    signature: Arc<OperatorSignature>,
    convention: Convention,
    hint: String,
    engine: Arc<dyn Engine>,
}

impl fmt::Debug for OpFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpFunction")
            .field("name", &self.signature.func_name)
            .field("convention", &self.convention)
            .finish_non_exhaustive()
    }
}

impl OpFunction {
    pub fn synthesize(signature: OperatorSignature, engine: Arc<dyn Engine>) -> Self {
        let convention = match &signature.variadic_arg_name {
            Some(arg_name) => Convention::Variadic {
                arg_name: arg_name.clone(),
            },
            None => Convention::KeywordOnly,
        };
        let hint = signature.func_name.to_lowercase();
        tracing::debug!(
            op = %signature.func_name,
            handle = signature.handle.0,
            ?convention,
            "synthesized operator function"
        );
        Self {
            signature: Arc::new(signature),
            convention,
            hint,
            engine,
        }
    }

    pub fn name(&self) -> &str {
        &self.signature.func_name
    }

    pub fn signature(&self) -> &OperatorSignature {
        &self.signature
    }

    pub fn convention(&self) -> &Convention {
        &self.convention
    }

    /// Static parameter names: `*data` for the variadic form, otherwise the
    /// declared node and scalar arguments.
    pub fn parameters(&self) -> Vec<String> {
        match &self.convention {
            Convention::Variadic { arg_name } => vec![format!("*{arg_name}")],
            Convention::KeywordOnly => self.signature.parameters.clone(),
        }
    }

    /// Create the symbol for this call.
    pub fn call(&self, args: CallArgs) -> Result<Symbol> {
        let request = self.build_request(args)?;
        tracing::trace!(
            op = %self.signature.func_name,
            name = %request.name,
            nodes = request.node_count(),
            keys = ?request.keys,
            "create_symbol"
        );
        self.engine.create_symbol(request)
    }

    /// Route a call into the request `call` would send to the engine.
    pub fn build_request(&self, args: CallArgs) -> Result<CreateRequest> {
        let CallArgs {
            positional,
            kwargs,
            name,
            attr,
            out,
        } = args;
        let (kwargs, name) = self.take_reserved(kwargs, name)?;
        if out.is_some() {
            tracing::trace!(op = %self.signature.func_name, "ignoring `out` while building a graph");
        }

        let routed = match &self.convention {
            Convention::Variadic { arg_name } => {
                self.route_variadic(arg_name, positional, kwargs, attr.as_ref())?
            }
            Convention::KeywordOnly => self.route_keyword(positional, kwargs, attr.as_ref())?,
        };

        let name = NameManager::resolve(name.as_deref(), &self.hint);
        Ok(CreateRequest {
            handle: self.signature.handle,
            positional: routed.positional,
            keyword: routed.keyword,
            keys: routed.keys,
            vals: routed.vals,
            name,
        })
    }

    /// Strip the reserved keywords `name`, `out` and `attr` from `kwargs`.
    fn take_reserved(
        &self,
        kwargs: Vec<(String, Value)>,
        mut name: Option<String>,
    ) -> Result<(Vec<(String, Value)>, Option<String>)> {
        let mut rest = Vec::with_capacity(kwargs.len());
        for (key, value) in kwargs {
            match key.as_str() {
                NAME_KW => match value {
                    Value::Scalar(Scalar::Str(s)) => {
                        name.get_or_insert(s);
                    }
                    Value::Null => {}
                    other => return Err(self.type_error(NAME_KW, "a string", &other)),
                },
                OUT_KW => {}
                ATTR_KW => {
                    return Err(MxsError::InvalidArgument(format!(
                        "operator {}: `attr` must be passed with CallArgs::attr",
                        self.signature.func_name
                    )));
                }
                _ => rest.push((key, value)),
            }
        }
        Ok((rest, name))
    }

    fn route_variadic(
        &self,
        arg_name: &str,
        positional: Vec<Value>,
        kwargs: Vec<(String, Value)>,
        attr: Option<&Attrs>,
    ) -> Result<Routed> {
        let mut nodes = SmallVec::with_capacity(positional.len());
        for (i, value) in positional.into_iter().enumerate() {
            match value {
                Value::Node(sym) => nodes.push(sym),
                other => {
                    return Err(self.type_error(&format!("{arg_name}[{i}]"), "a Symbol", &other));
                }
            }
        }

        let mut routed = Routed {
            positional: Some(nodes),
            ..Routed::default()
        };
        for (key, value) in kwargs {
            match value {
                Value::Node(sym) => routed.keyword.push((key, sym)),
                Value::Scalar(s) if self.is_dtype(&key) => {
                    let val = self.coerce_dtype(&key, s)?;
                    routed.push_scalar(key, val);
                }
                Value::Scalar(s) => {
                    let val = s.to_string();
                    routed.push_scalar(key, val);
                }
                Value::Null => {}
            }
        }

        routed.merge_attrs(AttrScope::current_merged(attr));

        if let Some(key) = &self.signature.key_variadic_arg_name
            && !routed.keys.contains(key)
        {
            let count = routed.node_count();
            routed.push_scalar(key.clone(), count.to_string());
        }
        Ok(routed)
    }

    fn route_keyword(
        &self,
        positional: Vec<Value>,
        kwargs: Vec<(String, Value)>,
        attr: Option<&Attrs>,
    ) -> Result<Routed> {
        if !positional.is_empty() {
            return Err(MxsError::UnexpectedPositional {
                op: self.signature.func_name.clone(),
                count: positional.len(),
            });
        }

        let mut routed = Routed::default();
        let mut declared = Vec::new();
        for (key, value) in kwargs {
            if self.signature.declares(&key) {
                declared.push((key, value));
                continue;
            }
            match value {
                Value::Node(sym) => routed.keyword.push((key, sym)),
                Value::Scalar(s) => {
                    let val = s.to_string();
                    routed.push_scalar(key, val);
                }
                Value::Null => {}
            }
        }

        for name in &self.signature.optional_node_names {
            match take_declared(&mut declared, name) {
                None | Some(Value::Null) => {}
                Some(Value::Node(sym)) => routed.keyword.push((name.clone(), sym)),
                Some(other) => return Err(self.type_error(name, "a Symbol", &other)),
            }
        }

        for name in &self.signature.plain_scalar_names {
            match take_declared(&mut declared, name) {
                None | Some(Value::Null) => {}
                Some(Value::Scalar(s)) => routed.push_scalar(name.clone(), s.to_string()),
                Some(other) => return Err(self.type_error(name, "a scalar", &other)),
            }
        }

        if let Some(name) = &self.signature.dtype_name {
            match take_declared(&mut declared, name) {
                None | Some(Value::Null) => {}
                Some(Value::Scalar(s)) => {
                    let val = self.coerce_dtype(name, s)?;
                    routed.push_scalar(name.clone(), val);
                }
                Some(other) => return Err(self.type_error(name, "a dtype", &other)),
            }
        }

        routed.merge_attrs(AttrScope::current_merged(attr));
        Ok(routed)
    }

    fn is_dtype(&self, key: &str) -> bool {
        self.signature.dtype_name.as_deref() == Some(key)
    }

    fn coerce_dtype(&self, param: &str, value: Scalar) -> Result<String> {
        let dtype = match &value {
            Scalar::DType(dt) => Some(*dt),
            Scalar::Str(s) => DType::parse(s),
            _ => None,
        };
        dtype
            .map(|dt| dt.canonical_name().to_string())
            .ok_or_else(|| MxsError::UnknownDType {
                op: self.signature.func_name.clone(),
                param: param.to_string(),
                got: Value::Scalar(value).describe(),
            })
    }

    fn type_error(&self, param: &str, expected: &'static str, got: &Value) -> MxsError {
        MxsError::ArgumentType {
            op: self.signature.func_name.clone(),
            param: param.to_string(),
            expected,
            got: got.describe(),
        }
    }
}

fn take_declared(declared: &mut Vec<(String, Value)>, name: &str) -> Option<Value> {
    let idx = declared.iter().position(|(k, _)| k == name)?;
    Some(declared.remove(idx).1)
}

/// Request fields accumulated while routing one call.
#[derive(Default)]
struct Routed {
    positional: Option<SmallVec<[Symbol; 4]>>,
    keyword: Vec<(String, Symbol)>,
    keys: Vec<String>,
    vals: Vec<String>,
}

impl Routed {
    fn push_scalar(&mut self, key: String, val: String) {
        self.keys.push(key);
        self.vals.push(val);
    }

    fn is_set(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key) || self.keyword.iter().any(|(k, _)| k == key)
    }

    fn merge_attrs(&mut self, attrs: Attrs) {
        for (key, val) in attrs {
            if !self.is_set(&key) {
                self.push_scalar(key, val);
            }
        }
    }

    fn node_count(&self) -> usize {
        self.positional.as_ref().map_or(0, |p| p.len()) + self.keyword.len()
    }
}
