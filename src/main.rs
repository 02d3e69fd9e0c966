//! qroute CLI
//!
//! Run one routing simulation from a YAML configuration.
//!
//! ```bash
//! qroute --config configs/ba10.yaml --router pred_q --seed 7
//! RUST_LOG=qroute=debug qroute --config configs/ba10.yaml --summary out.json
//! ```

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use qroute::{Config, PolicyKind, RouterBuilder};

/// Adaptive routing simulator.
///
/// Deterministic: the same configuration and seed always give the same
/// summary.
#[derive(Parser, Debug)]
#[command(name = "qroute")]
#[command(version, about, long_about = None)]
struct Args {
    /// YAML run configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Router variant; defaults to the first one configured
    #[arg(short, long)]
    router: Option<PolicyKind>,

    /// Override network.generator.seed
    #[arg(long)]
    seed: Option<u64>,

    /// Also write the JSON summary to this file
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Write each node's learned policy state into this directory
    #[arg(long)]
    save_policies: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let mut builder = RouterBuilder::new(config);
    if let Some(kind) = args.router {
        builder = builder.policy(kind);
    }
    if let Some(seed) = args.seed {
        builder = builder.seed(seed);
    }
    let (summary, env) = builder.run()?;

    let json = serde_json::to_string_pretty(&summary)?;
    println!("{}", json);
    if let Some(path) = &args.summary {
        fs::write(path, &json).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "summary written");
    }

    if let Some(dir) = &args.save_policies {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        for (node, state) in env.export_policies()? {
            let path = dir.join(format!("{}-{}.json", summary.policy, node.raw()));
            fs::write(&path, state).with_context(|| format!("writing {}", path.display()))?;
        }
        info!(dir = %dir.display(), nodes = summary.nodes, "policies saved");
    }
    Ok(())
}
