//! Immutable attribute bag carried by every endpoint.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::weight::WeightAttribute;

/// A value stored in an [`Attributes`] bag.
///
/// Two values are equal only if both the variant and its payload match, so a
/// weight never compares equal to an integer that happens to hold the same
/// number.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Balancer weight, see [`WeightAttribute`].
    Weight(WeightAttribute),
    /// Free-form text metadata.
    Text(Arc<str>),
    /// Integer metadata.
    Integer(i64),
    /// Boolean metadata.
    Flag(bool),
}

/// An immutable key/value bag.
///
/// Keys are marker types: only code that can name `K` can read or write the
/// entry stored under it, so a private marker gives its module a key nobody
/// else can collide with. Writes return a new bag and leave the original
/// untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    entries: Arc<HashMap<TypeId, AttributeValue>>,
}

impl Attributes {
    /// Create an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of this bag with `value` stored under the key `K`.
    pub fn with_value<K: 'static>(&self, value: AttributeValue) -> Self {
        let mut entries = HashMap::clone(&self.entries);
        entries.insert(TypeId::of::<K>(), value);
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Look up the value stored under the key `K`.
    pub fn value<K: 'static>(&self) -> Option<&AttributeValue> {
        self.entries.get(&TypeId::of::<K>())
    }

    /// Number of entries in the bag.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bag has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
