//! Serializable diagnostics for the weight table.

use serde::Serialize;
use std::net::SocketAddr;

use crate::load_balancer::tracker::Freshness;

/// Weight state of one endpoint, as exposed to observability tooling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointWeightView {
    /// Address of the endpoint.
    pub address: SocketAddr,
    /// Weight the picker uses for this endpoint.
    pub weight: u32,
    /// Freshness of the underlying data.
    pub freshness: Freshness,
    /// Moving average of the current series, if any report was received.
    pub smoothed_weight: Option<f64>,
    /// Most recent accepted raw weight.
    pub last_raw_weight: Option<f64>,
    /// Weight used while there is no fresh data.
    pub fallback_weight: u32,
    /// Milliseconds since the latest report.
    pub last_report_age_ms: Option<u64>,
}
