//! Weights derived from backend load reports.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Load a backend reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Queries per second served.
    pub qps: f64,
    /// Errors per second.
    #[serde(default)]
    pub eps: f64,
    /// Utilization, usually CPU, in `(0, 1]` but not bounded above.
    pub utilization: f64,
}

impl LoadReport {
    /// Derive a raw weight.
    ///
    /// weight = qps / (utilization + eps / qps * error_utilization_penalty)
    pub fn weight(&self, error_utilization_penalty: f64) -> Result<f64> {
        if !self.qps.is_finite() || self.qps <= 0.0 {
            return Err(Error::InvalidLoadReport {
                reason: "qps must be positive",
            });
        }
        if !self.utilization.is_finite() || self.utilization <= 0.0 {
            return Err(Error::InvalidLoadReport {
                reason: "utilization must be positive",
            });
        }
        if !self.eps.is_finite() || self.eps < 0.0 {
            return Err(Error::InvalidLoadReport {
                reason: "eps must not be negative",
            });
        }

        let penalty = self.eps / self.qps * error_utilization_penalty;
        Ok(self.qps / (self.utilization + penalty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_is_qps_per_utilization() {
        let report = LoadReport {
            qps: 100.0,
            eps: 0.0,
            utilization: 0.5,
        };
        assert_eq!(report.weight(1.0).unwrap(), 200.0);
    }

    #[test]
    fn errors_penalize_weight() {
        let report = LoadReport {
            qps: 100.0,
            eps: 50.0,
            utilization: 0.5,
        };
        assert_eq!(report.weight(1.0).unwrap(), 100.0);
        assert_eq!(report.weight(0.0).unwrap(), 200.0);
    }

    #[test]
    fn rejects_out_of_range_fields() {
        let valid = LoadReport {
            qps: 10.0,
            eps: 0.0,
            utilization: 0.1,
        };
        for report in [
            LoadReport { qps: 0.0, ..valid },
            LoadReport { qps: f64::NAN, ..valid },
            LoadReport {
                utilization: 0.0,
                ..valid
            },
            LoadReport {
                utilization: f64::INFINITY,
                ..valid
            },
            LoadReport { eps: -1.0, ..valid },
        ] {
            assert!(matches!(
                report.weight(1.0),
                Err(Error::InvalidLoadReport { .. })
            ));
        }
    }

    #[test]
    fn eps_defaults_to_zero_when_deserializing() {
        let report: LoadReport = serde_json::from_str(r#"{"qps": 5.0, "utilization": 0.25}"#).unwrap();
        assert_eq!(report.eps, 0.0);
        assert_eq!(report.weight(1.0).unwrap(), 20.0);
    }
}
