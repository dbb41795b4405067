//! Per-endpoint weight tracking.
//!
//! A tracker folds raw weights reported for one endpoint into an
//! exponentially weighted moving average and classifies the result as fresh
//! or stale depending on when the last report arrived. Endpoints that never
//! reported, or whose reports dried up, fall back to a default weight so they
//! keep receiving traffic.

use parking_lot::Mutex;
use serde::Serialize;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::WrrConfig;
use crate::error::{Error, Result};
use crate::load_balancer::view::EndpointWeightView;

/// Freshness of an endpoint's weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// No report was ever received.
    NoData,
    /// The last report arrived within the staleness timeout.
    Fresh,
    /// The last report is older than the staleness timeout.
    Stale,
}

/// Smoothing and staleness parameters shared by every tracker of a policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerParams {
    /// Weight of each new sample in the moving average, in `(0, 1]`.
    pub smoothing_factor: f64,
    /// How long a weight stays fresh without a new report.
    pub staleness_timeout: Duration,
    /// Fixed-point resolution used when turning weights into integers.
    pub weight_scale: f64,
}

impl From<&WrrConfig> for TrackerParams {
    fn from(config: &WrrConfig) -> Self {
        Self {
            smoothing_factor: config.smoothing_factor,
            staleness_timeout: config.staleness_timeout(),
            weight_scale: config.weight_scale,
        }
    }
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self::from(&WrrConfig::default())
    }
}

#[derive(Debug)]
struct EndpointWeightState {
    /// The most recent accepted report.
    raw: f64,
    /// Moving average of the current series.
    smoothed: f64,
    /// Latest report timestamp seen, `None` until the first report.
    last_report: Option<Instant>,
    /// Last classification applied by `report` or `refresh`.
    freshness: Freshness,
    /// Weight used while there is no fresh data. Never zero.
    fallback_weight: u32,
}

impl EndpointWeightState {
    fn classify(&self, now: Instant, timeout: Duration) -> Freshness {
        match self.last_report {
            None => Freshness::NoData,
            Some(last) if is_expired(last, now, timeout) => Freshness::Stale,
            Some(_) => Freshness::Fresh,
        }
    }
}

/// Tracks the smoothed weight of a single endpoint.
///
/// Each tracker owns its own lock, held only for the read-modify-write of
/// the average, so reports for different endpoints never contend.
#[derive(Debug)]
pub struct WeightTracker {
    address: SocketAddr,
    params: TrackerParams,
    state: Mutex<EndpointWeightState>,
}

impl WeightTracker {
    /// Create a tracker with no data.
    ///
    /// `fallback_weight` is the weight used until the first report and after
    /// the weight goes stale; `0` (unknown) is treated as `1`.
    pub fn new(address: SocketAddr, params: TrackerParams, fallback_weight: u32) -> Self {
        Self {
            address,
            params,
            state: Mutex::new(EndpointWeightState {
                raw: 0.0,
                smoothed: 0.0,
                last_report: None,
                freshness: Freshness::NoData,
                fallback_weight: fallback_weight.max(1),
            }),
        }
    }

    /// The address of the tracked endpoint.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Fold a raw weight reported at `at` into the average.
    ///
    /// Non-positive and non-finite values are rejected and leave the current
    /// state untouched. A report arriving after the weight went stale starts
    /// a new series instead of blending into the decayed one.
    pub fn report(&self, raw: f64, at: Instant) -> Result<()> {
        if !raw.is_finite() || raw <= 0.0 {
            warn!(address = %self.address, value = raw, "dropping invalid load report");
            return Err(Error::InvalidReport { value: raw });
        }

        let mut state = self.state.lock();
        match state.classify(at, self.params.staleness_timeout) {
            Freshness::Fresh => {
                let alpha = self.params.smoothing_factor;
                state.smoothed = alpha * raw + (1.0 - alpha) * state.smoothed;
            }
            Freshness::NoData => state.smoothed = raw,
            Freshness::Stale => {
                debug!(address = %self.address, value = raw, "restarting weight series after staleness");
                state.smoothed = raw;
            }
        }
        state.raw = raw;
        // Out-of-order reports still count, but never move the clock back.
        state.last_report = Some(state.last_report.map_or(at, |last| last.max(at)));
        state.freshness = Freshness::Fresh;
        Ok(())
    }

    /// The smoothed weight and whether it is fresh at `now`.
    ///
    /// Returns `0.0` before the first report.
    pub fn current_weight_at(&self, now: Instant) -> (f64, bool) {
        let state = self.state.lock();
        let fresh = state.classify(now, self.params.staleness_timeout) == Freshness::Fresh;
        (state.smoothed, fresh)
    }

    /// The smoothed weight and whether it is fresh right now.
    pub fn current_weight(&self) -> (f64, bool) {
        self.current_weight_at(Instant::now())
    }

    /// The integer weight the picker should use at `now`, with its freshness.
    ///
    /// The smoothed weight when fresh, the fallback weight otherwise, scaled
    /// by `weight_scale` and rounded. Never below `1`.
    pub fn effective_weight_at(&self, now: Instant) -> (u32, Freshness) {
        let state = self.state.lock();
        let freshness = state.classify(now, self.params.staleness_timeout);
        (self.scheduled_weight(&state, freshness), freshness)
    }

    fn scheduled_weight(&self, state: &EndpointWeightState, freshness: Freshness) -> u32 {
        let weight = match freshness {
            Freshness::Fresh => state.smoothed,
            Freshness::NoData | Freshness::Stale => f64::from(state.fallback_weight),
        };
        quantize(weight * self.params.weight_scale)
    }

    /// Apply the fresh-to-stale transition if the timeout elapsed by `now`.
    pub fn refresh(&self, now: Instant) -> Freshness {
        let mut state = self.state.lock();
        let freshness = state.classify(now, self.params.staleness_timeout);
        if state.freshness == Freshness::Fresh && freshness == Freshness::Stale {
            info!(
                address = %self.address,
                fallback_weight = state.fallback_weight,
                "endpoint weight went stale"
            );
        }
        state.freshness = freshness;
        freshness
    }

    /// The weight used while there is no fresh data.
    pub fn fallback_weight(&self) -> u32 {
        self.state.lock().fallback_weight
    }

    /// Replace the fallback weight, e.g. after discovery re-seeded it.
    pub fn set_fallback_weight(&self, weight: u32) {
        self.state.lock().fallback_weight = weight.max(1);
    }

    /// Diagnostic view of this tracker at `now`.
    pub fn view_at(&self, now: Instant) -> EndpointWeightView {
        let state = self.state.lock();
        let freshness = state.classify(now, self.params.staleness_timeout);
        let has_data = state.last_report.is_some();
        EndpointWeightView {
            address: self.address,
            weight: self.scheduled_weight(&state, freshness),
            freshness,
            smoothed_weight: has_data.then_some(state.smoothed),
            last_raw_weight: has_data.then_some(state.raw),
            fallback_weight: state.fallback_weight,
            last_report_age_ms: state
                .last_report
                .map(|last| now.saturating_duration_since(last).as_millis() as u64),
        }
    }
}

fn is_expired(last: Instant, now: Instant, timeout: Duration) -> bool {
    now.saturating_duration_since(last) > timeout
}

/// Round a scaled weight to the integer domain used by the picker.
fn quantize(weight: f64) -> u32 {
    weight.round().clamp(1.0, u32::MAX as f64) as u32
}
