//! Endpoint identities and the attributes attached to them.

pub mod attributes;
pub mod endpoint;
pub mod weight;
