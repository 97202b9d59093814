//! Developer CLI for the tab tree reconciler.
//!
//! `tabtree replay` runs a scripted session against the simulated host and
//! prints the tree after every step; `tabtree keys` generates order keys.

mod scenario;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tab_tree::testing::SimHost;
use tab_tree::{order_key, runtime, MemoryStore, Reconciler, ReconcilerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scenario::{Replay, Scenario};

#[derive(Parser)]
#[command(name = "tabtree")]
#[command(about = "Replay tab tree scenarios and inspect order keys")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario file against the simulated host
    Replay {
        scenario: PathBuf,

        /// JSON reconciler config (defaults come from TABTREE_* variables)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the final state as JSON instead of trees
        #[arg(long)]
        json: bool,
    },

    /// Generate order keys between two bounds
    Keys {
        #[arg(long)]
        after: Option<String>,

        #[arg(long)]
        before: Option<String>,

        #[arg(long, default_value_t = 1)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,tab_tree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            scenario,
            config,
            json,
        } => cmd_replay(&scenario, config.as_deref(), json).await,
        Commands::Keys {
            after,
            before,
            count,
        } => cmd_keys(after.as_deref(), before.as_deref(), count),
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<ReconcilerConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
        }
        None => ReconcilerConfig::from_env().context("Failed to load configuration"),
    }
}

async fn cmd_replay(path: &std::path::Path, config: Option<&std::path::Path>, json: bool) -> Result<()> {
    let scenario = Scenario::load(path)?;
    let config = load_config(config)?;
    tracing::info!(
        scenario = %path.display(),
        steps = scenario.steps.len(),
        "replaying scenario"
    );

    let host = Arc::new(SimHost::new());
    for container_id in &scenario.containers {
        host.add_container(*container_id);
    }
    let store = Arc::new(MemoryStore::new());
    let (handle, worker) = runtime::spawn(Reconciler::new(host.clone(), store.clone(), config));
    let mut replay = Replay::new(host.clone(), store.clone(), handle);

    for (n, step) in scenario.steps.iter().enumerate() {
        let report = replay
            .run(step)
            .await
            .with_context(|| format!("step {} ({}) failed", n + 1, step.describe()))?;

        if json {
            continue;
        }
        println!("#{} {}", n + 1, step.describe());
        if let Some(report) = report {
            if !report.commands.is_empty() {
                let commands: Vec<String> = report.commands.iter().map(ToString::to_string).collect();
                println!("   commands: {}", commands.join(", "));
            }
            if !report.flattened.is_empty() {
                let flattened: Vec<String> = report.flattened.iter().map(|id| replay.name(*id)).collect();
                println!("   flattened: {}", flattened.join(", "));
            }
        }
        for container_id in &scenario.containers {
            let snapshot = replay.snapshot(*container_id).await;
            let marker = if snapshot.in_sync { "" } else { "  (out of sync)" };
            println!("   container {container_id}{marker}");
            for line in replay.render(*container_id).await {
                println!("     {line}");
            }
        }
    }

    if json {
        let mut snapshots = Vec::new();
        for container_id in &scenario.containers {
            snapshots.push(replay.snapshot(*container_id).await);
        }
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
    }

    drop(replay);
    worker.await.context("reconciler worker panicked")?;
    Ok(())
}

fn cmd_keys(after: Option<&str>, before: Option<&str>, count: usize) -> Result<()> {
    let keys = order_key::keys_between(after, before, count)?;
    for key in keys {
        println!("{key}");
    }
    Ok(())
}
