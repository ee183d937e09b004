use std::collections::HashMap;

use dashmap::DashMap;
use tracing::trace;

use super::NodeKey;
use super::NodePropertyStore;
use super::PropertyValue;

#[derive(Debug, Default)]
struct NodeEntry {
    location: String,
    values: HashMap<String, PropertyValue>,
}

/// In-memory node store of a single domain; keys are `domain:location`.
#[derive(Debug)]
pub struct MemoryNodeStore {
    domain: String,
    nodes: DashMap<NodeKey, NodeEntry>,
}

impl MemoryNodeStore {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            nodes: DashMap::new(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Returns the node at `location`, creating it if needed.
    pub fn insert(
        &self,
        location: &str,
    ) -> NodeKey {
        let key = NodeKey::new(format!("{}:{}", self.domain, location));
        self.nodes.entry(key.clone()).or_insert_with(|| NodeEntry {
            location: location.to_string(),
            values: HashMap::new(),
        });
        key
    }

    /// Drops the node and its values.
    pub fn evict(
        &self,
        node: &NodeKey,
    ) -> bool {
        self.nodes.remove(node).is_some()
    }

    pub fn contains(
        &self,
        node: &NodeKey,
    ) -> bool {
        self.nodes.contains_key(node)
    }

    pub fn value(
        &self,
        node: &NodeKey,
        name: &str,
    ) -> Option<PropertyValue> {
        self.nodes.get(node).and_then(|entry| entry.values.get(name).cloned())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl NodePropertyStore for MemoryNodeStore {
    fn set_value(
        &self,
        node: &NodeKey,
        name: &str,
        value: PropertyValue,
    ) -> bool {
        match self.nodes.get_mut(node) {
            Some(mut entry) => {
                trace!(%node, name, %value, "property stored");
                entry.values.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    fn location(
        &self,
        node: &NodeKey,
    ) -> Option<String> {
        self.nodes.get(node).map(|entry| entry.location.clone())
    }

    fn full_location(
        &self,
        node: &NodeKey,
    ) -> String {
        node.to_string()
    }
}
