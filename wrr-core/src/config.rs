//! Policy configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Lower bound applied to the refresh period.
pub const MIN_UPDATE_PERIOD_MS: u64 = 100;

/// Tunables for the weighted round-robin policy.
///
/// Defaults follow gRFC A58 where it defines a value; the smoothing factor is
/// specific to this implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrrConfig {
    /// How long a weight stays fresh without a new report (default: 180000).
    #[serde(default = "default_staleness_timeout_ms")]
    pub staleness_timeout_ms: u64,

    /// How often staleness is re-evaluated in the background (default: 1000).
    ///
    /// Values below [`MIN_UPDATE_PERIOD_MS`] are raised to it.
    #[serde(default = "default_update_period_ms")]
    pub update_period_ms: u64,

    /// Weight given to each new sample in the moving average, in `(0, 1]`
    /// (default: 0.5). `1.0` disables smoothing.
    #[serde(default = "default_smoothing_factor")]
    pub smoothing_factor: f64,

    /// Multiplier for the error rate when deriving weights from load
    /// reports (default: 1.0).
    #[serde(default = "default_error_utilization_penalty")]
    pub error_utilization_penalty: f64,

    /// Fixed-point resolution for scheduling: a weight `w` is scheduled as
    /// `round(w * weight_scale)`, at least 1 (default: 100). Fallback weights
    /// are scaled the same way.
    #[serde(default = "default_weight_scale")]
    pub weight_scale: f64,
}

fn default_staleness_timeout_ms() -> u64 {
    180_000
}
fn default_update_period_ms() -> u64 {
    1_000
}
fn default_smoothing_factor() -> f64 {
    0.5
}
fn default_error_utilization_penalty() -> f64 {
    1.0
}
fn default_weight_scale() -> f64 {
    100.0
}

impl Default for WrrConfig {
    fn default() -> Self {
        Self {
            staleness_timeout_ms: default_staleness_timeout_ms(),
            update_period_ms: default_update_period_ms(),
            smoothing_factor: default_smoothing_factor(),
            error_utilization_penalty: default_error_utilization_penalty(),
            weight_scale: default_weight_scale(),
        }
    }
}

impl WrrConfig {
    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.staleness_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "staleness_timeout_ms must be positive".into(),
            ));
        }
        if !(self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "smoothing_factor must be in (0, 1], got {}",
                self.smoothing_factor
            )));
        }
        if !self.error_utilization_penalty.is_finite() || self.error_utilization_penalty < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "error_utilization_penalty must be a non-negative number, got {}",
                self.error_utilization_penalty
            )));
        }
        if !self.weight_scale.is_finite() || self.weight_scale <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "weight_scale must be a positive number, got {}",
                self.weight_scale
            )));
        }
        Ok(())
    }

    /// Time after which an endpoint without reports falls back to its
    /// default weight.
    pub fn staleness_timeout(&self) -> Duration {
        Duration::from_millis(self.staleness_timeout_ms)
    }

    /// Period of the background staleness re-evaluation.
    pub fn update_period(&self) -> Duration {
        Duration::from_millis(self.update_period_ms.max(MIN_UPDATE_PERIOD_MS))
    }
}
