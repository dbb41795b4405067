//! Balancer weight attached to endpoints.

use std::fmt;

use crate::domain::attributes::AttributeValue;
use crate::domain::endpoint::Endpoint;

/// Key under which the weight lives in an endpoint's attribute bag.
/// Private, so no other module can read or overwrite the entry.
struct WeightKey;

/// The weight discovery or a balancing policy attached to an endpoint.
///
/// A weight of `0` means "unknown", not "send no traffic".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WeightAttribute {
    weight: u32,
}

impl WeightAttribute {
    /// Create a weight attribute.
    pub const fn new(weight: u32) -> Self {
        Self { weight }
    }

    /// The stored weight.
    pub const fn weight(&self) -> u32 {
        self.weight
    }

    /// Whether no weight was ever set.
    pub const fn is_unknown(&self) -> bool {
        self.weight == 0
    }

    /// Compare against any attribute value. Values of another variant are
    /// simply unequal.
    pub fn equal(&self, other: &AttributeValue) -> bool {
        matches!(other, AttributeValue::Weight(o) if o == self)
    }

    /// Return a copy of `endpoint` carrying this weight.
    pub fn attach_to(self, endpoint: &Endpoint) -> Endpoint {
        endpoint.with_attribute::<WeightKey>(AttributeValue::Weight(self))
    }

    /// Read the weight attached to `endpoint`, or the zero weight if none was.
    pub fn read(endpoint: &Endpoint) -> Self {
        match endpoint.attributes().value::<WeightKey>() {
            Some(AttributeValue::Weight(weight)) => *weight,
            _ => Self::default(),
        }
    }
}

impl From<WeightAttribute> for AttributeValue {
    fn from(weight: WeightAttribute) -> Self {
        AttributeValue::Weight(weight)
    }
}

impl fmt::Display for WeightAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Weight: {}", self.weight)
    }
}
