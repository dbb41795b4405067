//! Weighted round-robin simulator.
//!
//! Registers a set of synthetic backends with a [`PolicyController`], lets
//! each of them report jittered load on its own timer, then performs a batch
//! of picks and prints how traffic was distributed next to the weight table.

#![deny(missing_docs)]

mod backends;
mod logging;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use backends::reporter::spawn_load_reporter;
use backends::BackendSpec;
use wrr_core::{
    Endpoint, EndpointWeightView, PolicyController, WeightAttribute, WeightRefresher, WrrConfig,
};

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "wrr-sim", about = "Simulate weighted round-robin picks against synthetic load")]
struct Args {
    /// Backends as ADDR=QPS:UTILIZATION[:EPS], comma-separated or repeated.
    #[arg(long = "backends", alias = "backend", required = true, value_delimiter = ',')]
    backends: Vec<BackendSpec>,

    /// Backends that are registered but never report load.
    #[arg(long = "silent", value_delimiter = ',')]
    silent: Vec<SocketAddr>,

    /// Weight discovery attaches to every backend before reports arrive.
    #[arg(long, default_value_t = 0)]
    seed_weight: u32,

    /// Number of picks to perform once the warm-up is over.
    #[arg(long, default_value_t = 10_000)]
    picks: u64,

    /// Milliseconds between load reports of each backend.
    #[arg(long, default_value_t = 200)]
    report_ms: u64,

    /// Warm-up in milliseconds before picking.
    #[arg(long, default_value_t = 2_000)]
    duration_ms: u64,

    /// JSON file with policy configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Serialize)]
struct Summary {
    picks: u64,
    counts: BTreeMap<String, u64>,
    weights: Vec<EndpointWeightView>,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<WrrConfig> {
    let Some(path) = path else {
        return Ok(WrrConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config: WrrConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(config)
}

/// Runs the simulation and prints a JSON summary to stdout.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_logging(args.json_logs);

    let config = load_config(args.config.as_ref())?;
    let policy = Arc::new(PolicyController::new(config)?);

    let reporting: HashSet<SocketAddr> = args.backends.iter().map(|b| b.address).collect();
    let endpoints = args
        .backends
        .iter()
        .map(|b| b.address)
        .chain(args.silent.iter().copied().filter(|a| !reporting.contains(a)))
        .map(|address| WeightAttribute::new(args.seed_weight).attach_to(&Endpoint::new(address)))
        .collect();
    policy.update_endpoints(endpoints)?;

    info!(
        backends = args.backends.len(),
        silent = args.silent.len(),
        "starting simulation"
    );

    let refresher = WeightRefresher::spawn(Arc::clone(&policy));
    let (stop_tx, stop_rx) = watch::channel(false);
    let reporters: Vec<_> = args
        .backends
        .iter()
        .cloned()
        .map(|backend| {
            spawn_load_reporter(
                Arc::clone(&policy),
                backend,
                Duration::from_millis(args.report_ms),
                stop_rx.clone(),
            )
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(args.duration_ms)).await;

    let mut counts = BTreeMap::new();
    for _ in 0..args.picks {
        let endpoint = policy.pick()?;
        *counts.entry(endpoint.address()).or_insert(0u64) += 1;
    }

    let summary = Summary {
        picks: args.picks,
        counts: counts
            .into_iter()
            .map(|(address, n): (SocketAddr, u64)| (address.to_string(), n))
            .collect(),
        weights: policy.weights(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let _ = stop_tx.send(true);
    for reporter in reporters {
        reporter.await.context("reporter task failed")?;
    }
    refresher.shutdown().await;
    policy.close();

    info!("simulation finished");
    Ok(())
}
