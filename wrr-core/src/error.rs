//! Error types surfaced by the weighted round-robin core.

use std::net::SocketAddr;

/// Errors produced while tracking weights or picking endpoints.
///
/// None of these are fatal: a rejected report leaves the previous weight in
/// place, and an empty snapshot is reported back to the caller who decides
/// whether to retry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A raw weight was non-positive or not finite.
    #[error("invalid load report value {value}")]
    InvalidReport {
        /// The rejected value.
        value: f64,
    },

    /// A structured load report could not be turned into a weight.
    #[error("invalid load report: {reason}")]
    InvalidLoadReport {
        /// Which field was out of range.
        reason: &'static str,
    },

    /// The current snapshot holds no endpoints.
    #[error("no endpoints available")]
    NoEndpointsAvailable,

    /// A report named an address the policy is not tracking.
    #[error("endpoint {0} is not tracked by this policy")]
    UnknownEndpoint(SocketAddr),

    /// The policy was closed and no longer accepts updates.
    #[error("policy is closed")]
    Closed,

    /// A configuration value was out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
