//! Coordination store seam
//!
//! The daemon consumes a hierarchical store with watchable nodes and an
//! exclusive lock primitive. Only the watch/read/lock contract lives here;
//! [`MemoryStore`] implements it in-process for development and tests.

mod memory;
mod subscription;

pub use memory::MemoryStore;
pub use subscription::{LeaderGuard, Subscription};

use crate::error::StoreResult;
use async_trait::async_trait;

/// What happened to a watched node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEventKind {
    /// State delivered once when the watch is established
    Initial,
    /// Node was created after the watch was established
    Created,
    /// Node data changed
    Changed,
    /// Node was deleted
    Deleted,
}

/// Notification delivered by a data watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEvent {
    pub kind: NodeEventKind,
    /// Node payload, `None` when the node does not exist
    pub data: Option<Vec<u8>>,
}

impl NodeEvent {
    pub fn new(kind: NodeEventKind, data: Option<Vec<u8>>) -> Self {
        Self { kind, data }
    }

    pub fn deleted() -> Self {
        Self::new(NodeEventKind::Deleted, None)
    }

    /// Whether the node is gone or carries nothing to read
    pub fn is_absent(&self) -> bool {
        self.kind == NodeEventKind::Deleted
            || self.data.as_deref().map_or(true, <[u8]>::is_empty)
    }
}

/// Watch and lock contract of the coordination store
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Watch the children of `path`.
    ///
    /// The full child list is delivered once on establishment and again after
    /// every membership change. A missing container reads as no children.
    async fn watch_children(&self, path: &str) -> StoreResult<Subscription<Vec<String>>>;

    /// Watch the data of `path`.
    ///
    /// The current state is delivered once on establishment as
    /// [`NodeEventKind::Initial`], with `data: None` if the node is missing.
    async fn watch_data(&self, path: &str) -> StoreResult<Subscription<NodeEvent>>;

    /// Wait until the caller holds the exclusive lock at `path`.
    async fn acquire_lock(&self, path: &str) -> StoreResult<LeaderGuard>;
}

/// Split an absolute node path into parent and child name
pub(crate) fn split_path(path: &str) -> Option<(&str, &str)> {
    if !path.starts_with('/') || path.len() < 2 || path.ends_with('/') {
        return None;
    }
    let (parent, name) = path.rsplit_once('/')?;
    Some((if parent.is_empty() { "/" } else { parent }, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/scheduled/web#1"), Some(("/scheduled", "web#1")));
        assert_eq!(split_path("/scheduled"), Some(("/", "scheduled")));
        assert_eq!(split_path("/a/b/c"), Some(("/a/b", "c")));
        assert_eq!(split_path("/"), None);
        assert_eq!(split_path("relative"), None);
        assert_eq!(split_path("/trailing/"), None);
    }

    #[test]
    fn test_absent_events() {
        assert!(NodeEvent::deleted().is_absent());
        assert!(NodeEvent::new(NodeEventKind::Initial, None).is_absent());
        assert!(NodeEvent::new(NodeEventKind::Changed, Some(Vec::new())).is_absent());
        assert!(!NodeEvent::new(NodeEventKind::Changed, Some(b"count: 1".to_vec())).is_absent());
    }
}
