//! The node property store collaborator and an in-memory implementation.
mod memory_store;

pub use memory_store::*;

use std::fmt;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

#[cfg(test)]
mod memory_store_test;

/// Stable identity of a node, as handed out by its store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(Arc<str>);

impl NodeKey {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A refreshed property value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyValue {
    String(String),
    Uint(u64),
}

impl fmt::Display for PropertyValue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            PropertyValue::String(s) => f.write_str(s),
            PropertyValue::Uint(n) => write!(f, "{n}"),
        }
    }
}

/// Property storage of the nodes being refreshed.
#[cfg_attr(test, automock)]
pub trait NodePropertyStore: Send + Sync {
    /// Stores `value`. Returns `false` when the node is no longer known, in
    /// which case nothing is stored.
    fn set_value(
        &self,
        node: &NodeKey,
        name: &str,
        value: PropertyValue,
    ) -> bool;

    /// Absolute location handed to commands, e.g. `/tmp/a`; `None` once the
    /// node is gone.
    fn location(
        &self,
        node: &NodeKey,
    ) -> Option<String>;

    /// Domain-qualified location used in diagnostics, e.g. `fs:/tmp/a`
    fn full_location(
        &self,
        node: &NodeKey,
    ) -> String;
}
