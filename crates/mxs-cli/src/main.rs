use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use mxs_core::{BindingConfig, CallArgs, Convention, DType, NameManager, OpNamespace};
use mxs_ffi_backend::FfiEngine;

#[derive(Parser)]
#[command(name = "mxs-cli")]
#[command(about = "Inspect and exercise the synthesized operator namespace")]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List every installed operator function.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Show the classified signature of one operator.
    Describe {
        /// Qualified name, e.g. `Concat` or `contrib.quadratic`.
        name: String,
    },
    /// Build a few symbols end to end through the engine.
    Smoke,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = BindingConfig::from_env()?;
    let engine = Arc::new(FfiEngine::from_config(&config)?);
    let ns = OpNamespace::load(engine.clone(), &config).context("loading operator namespace")?;

    match args.cmd {
        Cmd::List { json } => list(&ns, json),
        Cmd::Describe { name } => describe(&ns, &name),
        Cmd::Smoke => smoke(&engine, &ns),
    }
}

fn convention_label(convention: &Convention) -> &'static str {
    match convention {
        Convention::Variadic { .. } => "variadic",
        Convention::KeywordOnly => "keyword",
    }
}

fn list(ns: &OpNamespace, json: bool) -> anyhow::Result<()> {
    if json {
        let ops: Vec<_> = ns
            .iter()
            .map(|(name, func)| {
                serde_json::json!({
                    "name": name,
                    "convention": convention_label(func.convention()),
                    "parameters": func.parameters(),
                })
            })
            .collect();
        let doc = serde_json::json!({
            "backend": FfiEngine::backend_name(),
            "operators": ops,
            "skipped": ns.skipped(),
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("Backend: {}", FfiEngine::backend_name());
    for (name, func) in ns.iter() {
        println!(
            "{name:<24} {:<9} ({})",
            convention_label(func.convention()),
            func.parameters().join(", ")
        );
    }
    if !ns.skipped().is_empty() {
        println!("\nSkipped: {}", ns.skipped().join(", "));
    }
    Ok(())
}

fn describe(ns: &OpNamespace, name: &str) -> anyhow::Result<()> {
    let Some((_, func)) = ns.iter().find(|(qualified, _)| qualified == name) else {
        bail!("no operator named `{name}`");
    };
    let sig = func.signature();
    println!("{}  [{}]", sig.func_name, convention_label(func.convention()));
    if let Some(v) = &sig.variadic_arg_name {
        println!("  variadic:   {v}");
    }
    if let Some(k) = &sig.key_variadic_arg_name {
        println!("  count key:  {k}");
    }
    if !sig.optional_node_names.is_empty() {
        println!("  nodes:      {}", sig.optional_node_names.join(", "));
    }
    if !sig.plain_scalar_names.is_empty() {
        println!("  scalars:    {}", sig.plain_scalar_names.join(", "));
    }
    if let Some(d) = &sig.dtype_name {
        println!("  dtype:      {d}");
    }
    Ok(())
}

fn smoke(engine: &FfiEngine, ns: &OpNamespace) -> anyhow::Result<()> {
    let _names = NameManager::new().enter();
    let x = engine.variable("x")?;
    let y = engine.variable("y")?;

    let concat = ns.get("Concat").context("Concat is not registered")?;
    let c = concat.call(CallArgs::new().args([&x, &y]).kw("dim", 0))?;
    println!(
        "Concat(x, y, dim=0) -> {} with {} inputs, num_args={}",
        c.name(),
        engine.num_inputs(&c)?,
        engine.attr(&c, "num_args")?.unwrap_or_default()
    );

    let add = ns.get("elemwise_add").context("elemwise_add is not registered")?;
    let s = add.call(CallArgs::new().kw("lhs", &c).kw("rhs", &x))?;
    println!("elemwise_add(lhs, rhs) -> {}", s.name());

    let cast = ns.get("Cast").context("Cast is not registered")?;
    let h = cast.call(CallArgs::new().kw("data", &s).kw("dtype", DType::Float16))?;
    println!(
        "Cast(dtype=float16) -> {} dtype={}",
        h.name(),
        engine.attr(&h, "dtype")?.unwrap_or_default()
    );

    println!("\nAll smoke checks passed.");
    Ok(())
}
