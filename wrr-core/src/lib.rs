//! Weighted round-robin core.
//!
//! This crate contains the endpoint model, per-endpoint weight tracking and the
//! smooth weighted round-robin picker that power client-side load balancing.
//! A [`PolicyController`] ties them together: it follows the endpoint set
//! handed over by discovery, folds load reports into weights and publishes
//! immutable picker snapshots that any number of threads can pick from.

pub mod config;
pub mod domain;
pub mod error;
pub mod load_balancer;

pub use config::WrrConfig;
pub use domain::attributes::{AttributeValue, Attributes};
pub use domain::endpoint::Endpoint;
pub use domain::weight::WeightAttribute;
pub use error::{Error, Result};
pub use load_balancer::controller::PolicyController;
pub use load_balancer::load::LoadReport;
pub use load_balancer::picker::{WeightSnapshot, WeightedEndpoint, WeightedPicker};
pub use load_balancer::refresher::WeightRefresher;
pub use load_balancer::tracker::{Freshness, TrackerParams, WeightTracker};
pub use load_balancer::view::EndpointWeightView;
