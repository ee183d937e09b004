use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::NodeKey;
use crate::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl fmt::Display for RequestId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// One consumer waiting for one property of one node.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub task: Arc<Task>,
    pub node: NodeKey,
    pub property: Arc<str>,
    pub refreshed: bool,
}

/// Consumer requests keyed by id.
///
/// Two consumers asking for the same (node, property) get two entries; both
/// are resolved by the same subprocess.
#[derive(Debug, Default)]
pub struct PendingRequestTable {
    next_id: AtomicU64,
    entries: DashMap<RequestId, PendingRequest>,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        task: Arc<Task>,
        node: NodeKey,
        property: Arc<str>,
    ) -> RequestId {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        trace!(request = %id, task = %task.id(), %node, %property, "request registered");
        self.entries.insert(
            id,
            PendingRequest {
                task,
                node,
                property,
                refreshed: false,
            },
        );
        id
    }

    /// Flags every entry among `ids` asking for `property`. Returns how many
    /// entries were flagged.
    pub fn mark_refreshed(
        &self,
        ids: &[RequestId],
        property: &str,
    ) -> usize {
        let mut marked = 0;
        for id in ids {
            if let Some(mut entry) = self.entries.get_mut(id) {
                if &*entry.property == property {
                    entry.refreshed = true;
                    marked += 1;
                }
            }
        }
        marked
    }

    pub fn is_refreshed(
        &self,
        id: RequestId,
    ) -> Option<bool> {
        self.entries.get(&id).map(|e| e.refreshed)
    }

    /// Drops the entry of a cancelled consumer.
    pub fn remove(
        &self,
        id: RequestId,
    ) -> bool {
        let removed = self.entries.remove(&id).is_some();
        if removed {
            trace!(request = %id, "request dropped");
        }
        removed
    }

    /// Removes and returns the entry for resolution.
    pub fn take(
        &self,
        id: RequestId,
    ) -> Option<PendingRequest> {
        self.entries.remove(&id).map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
