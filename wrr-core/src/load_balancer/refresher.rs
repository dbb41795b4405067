//! Background task that periodically re-evaluates endpoint staleness.

use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use crate::load_balancer::controller::PolicyController;

/// Handle to the periodic refresh task.
///
/// Without it, an endpoint that stops reporting would keep its last weight
/// until some other report or update happened to rebuild the snapshot.
/// Dropping the handle aborts the task; [`shutdown`](Self::shutdown) stops it
/// and waits for it to finish.
#[derive(Debug)]
pub struct WeightRefresher {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl WeightRefresher {
    /// Spawn a Tokio task ticking `controller` every `update_period`.
    ///
    /// The task also stops on its own once the controller is closed.
    pub fn spawn(controller: Arc<PolicyController>) -> Self {
        let period = controller.config().update_period();
        let (shutdown, mut stop) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // Prevent immediately ticking when spawned
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = interval.tick() => {
                        if controller.is_closed() {
                            break;
                        }
                        if controller.tick() {
                            debug!("refresh published a new snapshot");
                        }
                    }
                }
            }
            debug!("weight refresher stopped");
        });

        Self {
            shutdown: Some(shutdown),
            handle: Some(handle),
        }
    }

    /// Stop the task and wait until it exits.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            exited_cleanly(handle.await);
        }
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

/// Log how the refresh task ended. Returns `false` if it panicked.
fn exited_cleanly(result: Result<(), JoinError>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) if err.is_panic() => {
            warn!(%err, "weight refresher panicked");
            false
        }
        Err(err) => {
            debug!(%err, "weight refresher cancelled");
            true
        }
    }
}

impl Drop for WeightRefresher {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WrrConfig;
    use crate::domain::endpoint::Endpoint;
    use crate::load_balancer::tracker::Freshness;
    use std::net::SocketAddr;
    use std::time::{Duration, Instant};

    fn policy() -> Arc<PolicyController> {
        Arc::new(
            PolicyController::new(WrrConfig {
                staleness_timeout_ms: 20,
                update_period_ms: 100,
                ..WrrConfig::default()
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn marks_silent_endpoints_stale() {
        let policy = policy();
        let address = SocketAddr::from(([127, 0, 0, 1], 9001));
        policy
            .update_endpoints(vec![Endpoint::new(address)])
            .unwrap();
        policy.report(address, 50.0, Instant::now()).unwrap();
        assert_eq!(
            policy.picker().snapshot().get(address).unwrap().freshness,
            Freshness::Fresh
        );

        let refresher = WeightRefresher::spawn(Arc::clone(&policy));
        time::sleep(Duration::from_millis(350)).await;

        let snapshot = policy.picker().snapshot().clone();
        let entry = snapshot.get(address).unwrap();
        assert_eq!(entry.freshness, Freshness::Stale);
        assert_eq!(entry.weight, 100);

        refresher.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_the_task() {
        let refresher = WeightRefresher::spawn(policy());
        assert!(!refresher.is_finished());
        time::timeout(Duration::from_secs(1), refresher.shutdown())
            .await
            .expect("refresher did not stop");
    }

    #[tokio::test]
    async fn panicked_task_is_reported() {
        let handle = tokio::spawn(async { panic!("tick failed") });
        assert!(!exited_cleanly(handle.await));

        let handle = tokio::spawn(async {});
        assert!(exited_cleanly(handle.await));

        let handle = tokio::spawn(time::sleep(Duration::from_secs(60)));
        handle.abort();
        assert!(exited_cleanly(handle.await));
    }

    #[tokio::test]
    async fn exits_once_the_policy_is_closed() {
        let policy = policy();
        let refresher = WeightRefresher::spawn(Arc::clone(&policy));
        policy.close();

        time::sleep(Duration::from_millis(350)).await;
        assert!(refresher.is_finished());
    }
}
