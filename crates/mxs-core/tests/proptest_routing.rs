//! Property tests for call routing invariants.
//!
//! Random keyword mixes of symbols, scalars and nulls are routed through a
//! keyword-only and a variadic operator; the resulting requests must keep
//! keys/vals aligned and never leak a symbol into the scalar arrays.

use std::sync::Arc;

use mxs_core::engine::{OpHandle, RecordingEngine};
use mxs_core::{
    CallArgs, OpFunction, OperatorMetadata, OperatorSignature, RawArgument, Symbol, Value,
};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Kind {
    Node,
    Int(i64),
    Text(String),
    Null,
}

fn arb_kind() -> impl Strategy<Value = Kind> {
    prop_oneof![
        Just(Kind::Node),
        any::<i64>().prop_map(Kind::Int),
        "[a-z]{1,6}".prop_map(Kind::Text),
        Just(Kind::Null),
    ]
}

/// Keyword names avoid the reserved `name`/`attr`/`out` and the declared
/// scalar parameter names, so every keyword lands in a predictable place.
fn arb_kwargs() -> impl Strategy<Value = Vec<(String, Kind)>> {
    prop::collection::btree_map("k[a-z]{1,4}", arb_kind(), 0..8)
        .prop_map(|m| m.into_iter().collect())
}

fn function(variadic: bool, engine: &Arc<RecordingEngine>) -> OpFunction {
    let args = if variadic {
        vec![RawArgument::new("data", "Symbol[]", "")]
    } else {
        vec![
            RawArgument::new("data", "NDArray-or-Symbol", ""),
            RawArgument::new("axis", "int, optional", ""),
        ]
    };
    let meta = OperatorMetadata {
        op_name: "Probe".into(),
        handle: OpHandle(1),
        description: String::new(),
        args,
        key_var_num_args: if variadic { "num_args".into() } else { String::new() },
        return_type: String::new(),
    };
    let sig = OperatorSignature::from_metadata("Probe", &meta).unwrap();
    OpFunction::synthesize(sig, engine.clone())
}

fn call_args(kwargs: &[(String, Kind)], node: &Symbol) -> CallArgs {
    kwargs.iter().fold(CallArgs::new(), |args, (k, kind)| {
        let value: Value = match kind {
            Kind::Node => node.into(),
            Kind::Int(i) => (*i).into(),
            Kind::Text(s) => s.as_str().into(),
            Kind::Null => Value::Null,
        };
        args.kw(k.clone(), value)
    })
}

proptest! {
    #[test]
    fn keys_and_vals_stay_aligned(kwargs in arb_kwargs(), variadic in any::<bool>(), n_pos in 0usize..4) {
        let engine = Arc::new(RecordingEngine::new(vec![]));
        let func = function(variadic, &engine);
        let node = engine.variable("x");
        let mut args = call_args(&kwargs, &node);
        if variadic {
            args = args.args(std::iter::repeat_n(&node, n_pos));
        }
        let req = func.build_request(args).unwrap();

        prop_assert_eq!(req.keys.len(), req.vals.len());

        let node_keys: Vec<&String> = kwargs.iter().filter(|(_, k)| matches!(k, Kind::Node)).map(|(n, _)| n).collect();
        let null_keys: Vec<&String> = kwargs.iter().filter(|(_, k)| matches!(k, Kind::Null)).map(|(n, _)| n).collect();
        for key in &node_keys {
            prop_assert!(!req.keys.contains(*key));
            prop_assert!(req.keyword.iter().any(|(k, _)| k == *key));
        }
        for key in &null_keys {
            prop_assert!(!req.keys.contains(*key));
        }

        let scalar_count = kwargs.len() - node_keys.len() - null_keys.len();
        let injected = usize::from(variadic);
        prop_assert_eq!(req.keys.len(), scalar_count + injected);

        if variadic {
            let expected = (n_pos + node_keys.len()).to_string();
            prop_assert_eq!(req.val("num_args"), Some(expected.as_str()));
        }
    }

    #[test]
    fn declared_scalar_order_ignores_call_order(axis in any::<i64>(), first in "k[a-z]{1,4}") {
        let engine = Arc::new(RecordingEngine::new(vec![]));
        let func = function(false, &engine);
        let a = func.build_request(CallArgs::new().kw("axis", axis).kw(first.clone(), 1)).unwrap();
        let b = func.build_request(CallArgs::new().kw(first.clone(), 1).kw("axis", axis)).unwrap();
        prop_assert_eq!(&a.keys, &b.keys);
        prop_assert_eq!(&a.vals, &b.vals);
        prop_assert_eq!(a.keys.last().map(String::as_str), Some("axis"));
    }
}
