//! Endpoint models.

use std::net::SocketAddr;

use crate::domain::attributes::{AttributeValue, Attributes};

/// A single backend endpoint as handed over by service discovery.
///
/// Endpoints are plain values: every attribute change produces a new
/// endpoint, so copies held by the controller, the picker snapshot and the
/// caller never alias each other.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    /// The socket address of the endpoint
    address: SocketAddr,
    /// Opaque metadata attached by discovery or by balancing policies
    attributes: Attributes,
}

impl Endpoint {
    /// Create an endpoint without attributes.
    pub fn new(address: SocketAddr) -> Self {
        Self::with_attributes(address, Attributes::new())
    }

    /// Create an endpoint carrying the given attributes.
    pub fn with_attributes(address: SocketAddr, attributes: Attributes) -> Self {
        Self {
            address,
            attributes,
        }
    }

    /// The address that identifies this endpoint.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// The attributes attached to this endpoint.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Return a copy of this endpoint with `value` stored under the key `K`.
    pub fn with_attribute<K: 'static>(&self, value: AttributeValue) -> Self {
        Self {
            address: self.address,
            attributes: self.attributes.with_value::<K>(value),
        }
    }
}
