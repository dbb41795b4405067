//! Policy controller: follows the endpoint set, owns one tracker per
//! endpoint and publishes picker snapshots.

use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::WrrConfig;
use crate::domain::endpoint::Endpoint;
use crate::domain::weight::WeightAttribute;
use crate::error::{Error, Result};
use crate::load_balancer::load::LoadReport;
use crate::load_balancer::picker::{WeightSnapshot, WeightedEndpoint, WeightedPicker};
use crate::load_balancer::tracker::{TrackerParams, WeightTracker};
use crate::load_balancer::view::EndpointWeightView;

/// The weighted round-robin policy.
///
/// Picks load the current picker through an `ArcSwap`, so they never wait on
/// endpoint updates or reports; an in-flight pick keeps using the snapshot it
/// loaded even if a newer one is published meanwhile. Publication itself is
/// serialized by the lock around the ordered endpoint list.
#[derive(Debug)]
pub struct PolicyController {
    config: WrrConfig,
    params: TrackerParams,
    trackers: DashMap<SocketAddr, Arc<WeightTracker>>,
    /// Endpoints in discovery order. Held while building and publishing.
    endpoints: Mutex<Vec<Endpoint>>,
    picker: ArcSwap<WeightedPicker>,
    /// Latest instant any update, report or tick was evaluated at.
    /// Publication never looks at an earlier one.
    clock: Mutex<Option<Instant>>,
    closed: AtomicBool,
}

impl PolicyController {
    /// Create a policy with no endpoints.
    pub fn new(config: WrrConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            params: TrackerParams::from(&config),
            config,
            trackers: DashMap::new(),
            endpoints: Mutex::new(Vec::new()),
            picker: ArcSwap::from_pointee(WeightedPicker::empty()),
            clock: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// The configuration this policy was built with.
    pub fn config(&self) -> &WrrConfig {
        &self.config
    }

    /// Replace the endpoint set with the one from the latest discovery update.
    pub fn update_endpoints(&self, endpoints: Vec<Endpoint>) -> Result<()> {
        self.update_endpoints_at(endpoints, Instant::now())
    }

    /// Replace the endpoint set, evaluating freshness at `now`.
    ///
    /// New addresses get a tracker with no data whose fallback weight is the
    /// weight discovery attached, if any. Trackers of addresses that are gone
    /// are dropped. When an address shows up twice only the first occurrence
    /// is kept.
    pub fn update_endpoints_at(&self, endpoints: Vec<Endpoint>, now: Instant) -> Result<()> {
        let mut current = self.endpoints.lock();
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let mut seen = HashSet::with_capacity(endpoints.len());
        let mut next = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let address = endpoint.address();
            if !seen.insert(address) {
                warn!(%address, "duplicate endpoint in update, keeping the first");
                continue;
            }

            let seed = WeightAttribute::read(&endpoint).weight();
            match self.trackers.entry(address) {
                Entry::Occupied(entry) => entry.get().set_fallback_weight(seed),
                Entry::Vacant(entry) => {
                    info!(%address, seed, "tracking new endpoint");
                    entry.insert(Arc::new(WeightTracker::new(address, self.params, seed)));
                }
            }
            next.push(endpoint);
        }

        self.trackers.retain(|address, _| {
            let keep = seen.contains(address);
            if !keep {
                info!(%address, "endpoint removed");
            }
            keep
        });

        *current = next;
        self.publish_locked(&current, self.advance_clock(now));
        Ok(())
    }

    /// Record a raw weight reported for `address` at `at`.
    ///
    /// A new snapshot is published only if the endpoint's effective weight
    /// or freshness changed. A late report updates its tracker but never
    /// rewinds the time other endpoints are classified at.
    pub fn report(&self, address: SocketAddr, raw: f64, at: Instant) -> Result<()> {
        let tracker = self.tracker(address).ok_or(Error::UnknownEndpoint(address))?;
        tracker.report(raw, at)?;
        self.publish_if_changed(&tracker, self.advance_clock(at));
        Ok(())
    }

    /// Record a structured load report for `address` at `at`.
    pub fn report_load(&self, address: SocketAddr, load: LoadReport, at: Instant) -> Result<()> {
        let raw = load
            .weight(self.config.error_utilization_penalty)
            .inspect_err(|err| warn!(%address, %err, "dropping load report"))?;
        self.report(address, raw, at)
    }

    /// Re-evaluate staleness now and publish if anything changed.
    pub fn tick(&self) -> bool {
        self.tick_at(Instant::now())
    }

    /// Re-evaluate staleness at `now` and publish if anything changed.
    pub fn tick_at(&self, now: Instant) -> bool {
        let now = self.advance_clock(now);
        let endpoints = self.endpoints.lock();
        for endpoint in endpoints.iter() {
            if let Some(tracker) = self.trackers.get(&endpoint.address()) {
                tracker.refresh(now);
            }
        }
        self.publish_locked(&endpoints, now)
    }

    /// Select an endpoint for the next call.
    pub fn pick(&self) -> Result<Endpoint> {
        self.picker.load().pick()
    }

    /// The currently published picker.
    pub fn picker(&self) -> Arc<WeightedPicker> {
        self.picker.load_full()
    }

    /// The tracker for `address`, if it is part of the endpoint set.
    pub fn tracker(&self, address: SocketAddr) -> Option<Arc<WeightTracker>> {
        self.trackers.get(&address).map(|t| Arc::clone(t.value()))
    }

    /// Weight table in endpoint order, evaluated now.
    pub fn weights(&self) -> Vec<EndpointWeightView> {
        self.weights_at(Instant::now())
    }

    /// Weight table in endpoint order, evaluated at `now`.
    pub fn weights_at(&self, now: Instant) -> Vec<EndpointWeightView> {
        let endpoints = self.endpoints.lock();
        endpoints
            .iter()
            .filter_map(|endpoint| self.tracker(endpoint.address()))
            .map(|tracker| tracker.view_at(now))
            .collect()
    }

    /// Drop every tracker and publish an empty snapshot.
    ///
    /// Picks already holding the previous snapshot complete normally; later
    /// picks fail with [`Error::NoEndpointsAvailable`].
    pub fn close(&self) {
        let mut endpoints = self.endpoints.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        endpoints.clear();
        self.trackers.clear();
        self.picker.store(Arc::new(WeightedPicker::empty()));
        info!("weighted round-robin policy closed");
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Move the controller clock forward to `at` and return the result.
    fn advance_clock(&self, at: Instant) -> Instant {
        let mut clock = self.clock.lock();
        let now = clock.map_or(at, |latest| latest.max(at));
        *clock = Some(now);
        now
    }

    fn publish_if_changed(&self, tracker: &WeightTracker, now: Instant) {
        let (weight, freshness) = tracker.effective_weight_at(now);
        let unchanged = self
            .picker
            .load()
            .snapshot()
            .get(tracker.address())
            .is_some_and(|e| e.weight == weight && e.freshness == freshness);
        if unchanged {
            return;
        }

        let endpoints = self.endpoints.lock();
        self.publish_locked(&endpoints, now);
    }

    /// Build a snapshot from the trackers and swap it in if it differs from
    /// the published one. Callers hold the endpoint lock.
    fn publish_locked(&self, endpoints: &[Endpoint], now: Instant) -> bool {
        let entries = endpoints
            .iter()
            .filter_map(|endpoint| {
                let tracker = self.tracker(endpoint.address())?;
                let (weight, freshness) = tracker.effective_weight_at(now);
                Some(WeightedEndpoint {
                    endpoint: endpoint.clone(),
                    weight,
                    freshness,
                })
            })
            .collect();
        let snapshot = WeightSnapshot::new(entries);

        if self.picker.load().snapshot() == &snapshot {
            return false;
        }

        debug!(
            endpoints = snapshot.len(),
            total_weight = snapshot.total_weight(),
            "publishing weight snapshot"
        );
        self.picker.store(Arc::new(WeightedPicker::new(snapshot)));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::tracker::Freshness;
    use std::time::Duration;

    fn addr(last: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, last], 8080))
    }

    fn controller() -> PolicyController {
        PolicyController::new(WrrConfig {
            staleness_timeout_ms: 1_000,
            smoothing_factor: 1.0,
            weight_scale: 1.0,
            ..WrrConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let config = WrrConfig {
            smoothing_factor: 2.0,
            ..WrrConfig::default()
        };
        assert!(matches!(
            PolicyController::new(config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn empty_policy_has_no_endpoints() {
        let policy = controller();
        assert!(matches!(policy.pick(), Err(Error::NoEndpointsAvailable)));
    }

    #[test]
    fn unchanged_reports_keep_the_published_picker() {
        let policy = controller();
        let now = Instant::now();
        policy
            .update_endpoints_at(vec![Endpoint::new(addr(1)), Endpoint::new(addr(2))], now)
            .unwrap();

        policy.report(addr(1), 4.0, now).unwrap();
        let published = policy.picker();
        // Rounds to the same integer weight.
        policy.report(addr(1), 4.2, now).unwrap();
        assert!(Arc::ptr_eq(&published, &policy.picker()));

        policy.report(addr(1), 6.0, now).unwrap();
        assert!(!Arc::ptr_eq(&published, &policy.picker()));
        assert_eq!(policy.picker().snapshot().get(addr(1)).unwrap().weight, 6);
    }

    #[test]
    fn unknown_endpoint_reports_are_rejected() {
        let policy = controller();
        assert!(matches!(
            policy.report(addr(9), 1.0, Instant::now()),
            Err(Error::UnknownEndpoint(a)) if a == addr(9)
        ));
    }

    #[test]
    fn invalid_load_reports_are_rejected() {
        let policy = controller();
        let now = Instant::now();
        policy
            .update_endpoints_at(vec![Endpoint::new(addr(1))], now)
            .unwrap();
        let load = LoadReport {
            qps: 0.0,
            eps: 0.0,
            utilization: 0.5,
        };
        assert!(matches!(
            policy.report_load(addr(1), load, now),
            Err(Error::InvalidLoadReport { .. })
        ));
    }

    #[test]
    fn duplicate_addresses_keep_first() {
        let policy = controller();
        let first = WeightAttribute::new(3).attach_to(&Endpoint::new(addr(1)));
        let second = WeightAttribute::new(7).attach_to(&Endpoint::new(addr(1)));
        policy
            .update_endpoints_at(vec![first, second], Instant::now())
            .unwrap();

        let snapshot = policy.picker().snapshot().clone();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.entries()[0].weight, 3);
    }

    #[test]
    fn tick_reports_whether_it_published() {
        let policy = controller();
        let start = Instant::now();
        policy
            .update_endpoints_at(vec![Endpoint::new(addr(1)), Endpoint::new(addr(2))], start)
            .unwrap();
        policy.report(addr(1), 5.0, start).unwrap();

        assert!(!policy.tick_at(start + Duration::from_millis(500)));
        assert!(policy.tick_at(start + Duration::from_millis(1_500)));
        assert!(!policy.tick_at(start + Duration::from_millis(1_600)));
    }

    #[test]
    fn late_report_keeps_stale_endpoints_stale() {
        let policy = controller();
        let start = Instant::now();
        policy
            .update_endpoints_at(vec![Endpoint::new(addr(1)), Endpoint::new(addr(2))], start)
            .unwrap();
        policy.report(addr(1), 3.0, start).unwrap();
        policy.report(addr(2), 9.0, start).unwrap();
        assert!(policy.tick_at(start + Duration::from_secs(5)));

        policy
            .report(addr(1), 7.0, start + Duration::from_millis(10))
            .unwrap();
        let snapshot = policy.picker().snapshot().clone();
        for address in [addr(1), addr(2)] {
            let entry = snapshot.get(address).unwrap();
            assert_eq!((entry.weight, entry.freshness), (1, Freshness::Stale));
        }
    }

    #[test]
    fn closed_policy_refuses_updates() {
        let policy = controller();
        let now = Instant::now();
        policy
            .update_endpoints_at(vec![Endpoint::new(addr(1))], now)
            .unwrap();
        let before = policy.picker();

        policy.close();
        assert!(policy.is_closed());
        assert!(matches!(policy.pick(), Err(Error::NoEndpointsAvailable)));
        assert!(matches!(
            policy.update_endpoints_at(vec![Endpoint::new(addr(1))], now),
            Err(Error::Closed)
        ));
        assert!(matches!(
            policy.report(addr(1), 1.0, now),
            Err(Error::UnknownEndpoint(_))
        ));
        // A picker loaded before closing still serves.
        assert_eq!(before.pick().unwrap().address(), addr(1));
        policy.close();
    }
}
