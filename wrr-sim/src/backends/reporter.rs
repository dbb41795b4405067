//! Background reporters that feed simulated load into the policy.

use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

use wrr_core::{LoadReport, PolicyController};

use super::BackendSpec;

/// Spawns a Tokio task that reports `backend`'s load to `policy` every
/// `period`, with up to 10% jitter on each field, until `stop` flips to
/// `true`.
pub fn spawn_load_reporter(
    policy: Arc<PolicyController>,
    backend: BackendSpec,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(period);

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    let load = jitter(backend.load);
                    if let Err(err) = policy.report_load(backend.address, load, Instant::now()) {
                        warn!(address = %backend.address, %err, "load report rejected");
                    }
                }
            }
        }
        debug!(address = %backend.address, "reporter stopped");
    })
}

fn jitter(load: LoadReport) -> LoadReport {
    let mut rng = rand::rng();
    LoadReport {
        qps: load.qps * rng.random_range(0.9..1.1),
        eps: load.eps * rng.random_range(0.9..1.1),
        utilization: load.utilization * rng.random_range(0.9..1.1),
    }
}
