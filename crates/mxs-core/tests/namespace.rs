//! Registry walk integration tests against the recording engine.

use std::sync::Arc;

use mxs_core::config::{BindingConfig, SignaturePolicy};
use mxs_core::engine::{OpHandle, RecordingEngine};
use mxs_core::{CallArgs, Convention, MxsError, NameManager, OpNamespace, OperatorMetadata, RawArgument};

fn op(name: &str, handle: u64, args: &[(&str, &str)], key_var: &str) -> OperatorMetadata {
    OperatorMetadata {
        op_name: name.to_string(),
        handle: OpHandle(handle),
        description: format!("{name} operator."),
        args: args
            .iter()
            .map(|(n, t)| RawArgument::new(*n, *t, ""))
            .collect(),
        key_var_num_args: key_var.to_string(),
        return_type: "NDArray-or-Symbol".to_string(),
    }
}

fn registry() -> Vec<OperatorMetadata> {
    vec![
        op(
            "Concat",
            1,
            &[
                ("data", "NDArray-or-Symbol[]"),
                ("num_args", "int, required"),
                ("dim", "int, optional, default='1'"),
            ],
            "num_args",
        ),
        op(
            "elemwise_add",
            2,
            &[("lhs", "NDArray-or-Symbol"), ("rhs", "NDArray-or-Symbol")],
            "",
        ),
        op("_copy", 3, &[("data", "NDArray-or-Symbol")], ""),
        op(
            "_contrib_quadratic",
            4,
            &[
                ("data", "NDArray-or-Symbol"),
                ("a", "float, optional, default=0"),
                ("b", "float, optional, default=0"),
                ("c", "float, optional, default=0"),
            ],
            "",
        ),
    ]
}

fn broken() -> OperatorMetadata {
    op(
        "BadStack",
        9,
        &[("data", "Symbol[]"), ("extra", "Symbol[]")],
        "",
    )
}

#[test]
fn load_installs_every_operator() {
    let engine = Arc::new(RecordingEngine::new(registry()));
    let ns = OpNamespace::load(engine, &BindingConfig::default()).unwrap();

    assert_eq!(ns.len(), 4);
    assert!(ns.get("Concat").is_some());
    assert!(ns.get("concat").is_none(), "lookup is case-sensitive");
    assert!(ns.internal("_copy").is_some());
    assert!(ns.get("_copy").is_none());
    let quadratic = ns.submodule("contrib", "quadratic").unwrap();
    assert_eq!(quadratic.name(), "quadratic");
    assert_eq!(ns.submodule_names().collect::<Vec<_>>(), ["contrib"]);

    let names: Vec<String> = ns.iter().map(|(n, _)| n).collect();
    assert_eq!(
        names,
        ["Concat", "elemwise_add", "_copy", "contrib.quadratic"]
    );
}

#[test]
fn conventions_follow_metadata() {
    let engine = Arc::new(RecordingEngine::new(registry()));
    let ns = OpNamespace::load(engine, &BindingConfig::default()).unwrap();

    assert_eq!(
        ns.get("Concat").unwrap().convention(),
        &Convention::Variadic {
            arg_name: "data".into()
        }
    );
    let add = ns.get("elemwise_add").unwrap();
    assert_eq!(add.convention(), &Convention::KeywordOnly);
    assert_eq!(add.parameters(), ["lhs", "rhs"]);
    assert_eq!(
        ns.submodule("contrib", "quadratic").unwrap().parameters(),
        ["data", "a", "b", "c"]
    );
}

#[test]
fn abort_policy_fails_the_walk() {
    let mut ops = registry();
    ops.push(broken());
    let engine = Arc::new(RecordingEngine::new(ops));
    let err = OpNamespace::load(engine, &BindingConfig::default()).unwrap_err();
    assert!(matches!(err, MxsError::Signature { ref op, .. } if op == "BadStack"));
}

#[test]
fn skip_policy_leaves_operator_out() {
    let _ = tracing_subscriber::fmt::try_init();
    let mut ops = registry();
    ops.insert(0, broken());
    let engine = Arc::new(RecordingEngine::new(ops));
    let config = BindingConfig {
        signature_policy: SignaturePolicy::Skip,
        ..BindingConfig::default()
    };
    let ns = OpNamespace::load(engine, &config).unwrap();
    assert_eq!(ns.len(), 4);
    assert_eq!(ns.skipped(), ["BadStack"]);
    assert!(ns.get("BadStack").is_none());
}

#[test]
fn submodule_names_use_stripped_hint() {
    let engine = Arc::new(RecordingEngine::new(registry()));
    let ns = OpNamespace::load(engine.clone(), &BindingConfig::default()).unwrap();
    let x = engine.variable("x");

    let _guard = NameManager::new().enter();
    let quadratic = ns.submodule("contrib", "quadratic").unwrap();
    let out = quadratic
        .call(CallArgs::new().kw("data", &x).kw("a", 1.0).kw("c", -2.5))
        .unwrap();
    assert_eq!(out.name(), "quadratic0");

    let req = engine.last_request().unwrap();
    assert_eq!(req.handle, OpHandle(4));
    assert_eq!(req.keys, ["a", "c"]);
    assert_eq!(req.vals, ["1.0", "-2.5"]);
}

#[test]
fn concat_through_namespace() {
    let engine = Arc::new(RecordingEngine::new(registry()));
    let ns = OpNamespace::load(engine.clone(), &BindingConfig::default()).unwrap();
    let (x, y) = (engine.variable("x"), engine.variable("y"));

    let _guard = NameManager::with_prefix("block_").enter();
    let out = ns
        .get("Concat")
        .unwrap()
        .call(CallArgs::new().args([&x, &y]).kw("dim", 0))
        .unwrap();
    assert_eq!(out.name(), "block_concat0");

    let req = engine.last_request().unwrap();
    assert_eq!(req.keys, ["dim", "num_args"]);
    assert_eq!(req.vals, ["0", "2"]);
}

#[test]
fn functions_are_shareable_across_threads() {
    let engine = Arc::new(RecordingEngine::new(registry()));
    let ns = Arc::new(OpNamespace::load(engine.clone(), &BindingConfig::default()).unwrap());

    let names: Vec<String> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ns = Arc::clone(&ns);
                let x = engine.variable("x");
                s.spawn(move || {
                    ns.internal("_copy")
                        .unwrap()
                        .call(CallArgs::new().kw("data", &x))
                        .unwrap()
                        .name()
                        .to_string()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Every thread has its own root name manager.
    assert!(names.iter().all(|n| n == "_copy0"), "{names:?}");
    assert_eq!(engine.requests().len(), 4);
}
