//! In-memory coordination store

use super::subscription::{LeaderGuard, Subscription};
use super::{split_path, CoordinationStore, NodeEvent, NodeEventKind};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

#[derive(Default)]
struct LockQueue {
    holder: Option<u64>,
    waiters: VecDeque<(u64, oneshot::Sender<()>)>,
}

#[derive(Default)]
struct Inner {
    nodes: BTreeMap<String, Vec<u8>>,
    sequences: HashMap<String, u64>,
    child_watchers: HashMap<String, Vec<mpsc::UnboundedSender<Vec<String>>>>,
    data_watchers: HashMap<String, Vec<mpsc::UnboundedSender<NodeEvent>>>,
    locks: HashMap<String, LockQueue>,
    sessions: HashMap<u64, watch::Sender<bool>>,
    next_session: u64,
}

impl Inner {
    fn exists(&self, path: &str) -> bool {
        path == "/" || self.nodes.contains_key(path)
    }

    fn children(&self, path: &str) -> Vec<String> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, _)| {
                let name = &key[prefix.len()..];
                (!name.contains('/')).then(|| name.to_string())
            })
            .collect()
    }

    fn notify_children(&mut self, parent: &str) {
        let children = self.children(parent);
        if let Some(watchers) = self.child_watchers.get_mut(parent) {
            watchers.retain(|tx| tx.send(children.clone()).is_ok());
        }
    }

    fn notify_data(&mut self, path: &str, event: NodeEvent) {
        if let Some(watchers) = self.data_watchers.get_mut(path) {
            watchers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    fn insert(&mut self, path: &str, data: Vec<u8>) -> StoreResult<()> {
        let (parent, _) = split_path(path).ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
        if !self.exists(parent) {
            return Err(StoreError::NoNode(parent.to_string()));
        }
        if self.nodes.contains_key(path) {
            return Err(StoreError::NodeExists(path.to_string()));
        }

        self.nodes.insert(path.to_string(), data.clone());
        self.notify_data(path, NodeEvent::new(NodeEventKind::Created, Some(data)));
        let parent = parent.to_string();
        self.notify_children(&parent);
        Ok(())
    }

    /// Drop `session` from a lock queue, handing the lock to the next live waiter.
    fn release(&mut self, path: &str, session: u64) {
        self.sessions.remove(&session);

        let Some(queue) = self.locks.get_mut(path) else {
            return;
        };

        if queue.holder != Some(session) {
            queue.waiters.retain(|(id, _)| *id != session);
            return;
        }

        queue.holder = None;
        while let Some((next, tx)) = queue.waiters.pop_front() {
            if tx.send(()).is_ok() {
                queue.holder = Some(next);
                break;
            }
        }
    }
}

/// Releases a lock slot when dropped
struct LockRelease {
    inner: Arc<Mutex<Inner>>,
    path: String,
    session: u64,
}

impl Drop for LockRelease {
    fn drop(&mut self) {
        self.inner.lock().release(&self.path, self.session);
    }
}

/// In-memory coordination store for development and testing
///
/// Paths are absolute and `/`-separated. Like a real store, a node can only
/// be created under an existing parent and deleted once it has no children.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node
    pub fn create(&self, path: &str, data: impl Into<Vec<u8>>) -> StoreResult<()> {
        self.inner.lock().insert(path, data.into())
    }

    /// Create `path` and any missing ancestors with empty data
    pub fn ensure_path(&self, path: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.exists(path) {
            return Ok(());
        }
        split_path(path).ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;

        let mut current = String::new();
        for segment in path.trim_start_matches('/').split('/') {
            current.push('/');
            current.push_str(segment);
            if !inner.exists(&current) {
                inner.insert(&current, Vec::new())?;
            }
        }
        Ok(())
    }

    /// Create a child of `parent` named `<prefix><10-digit sequence>`
    ///
    /// Returns the child name.
    pub fn create_sequential(
        &self,
        parent: &str,
        prefix: &str,
        data: impl Into<Vec<u8>>,
    ) -> StoreResult<String> {
        let mut inner = self.inner.lock();
        if !inner.exists(parent) {
            return Err(StoreError::NoNode(parent.to_string()));
        }

        let sequence = inner.sequences.entry(parent.to_string()).or_insert(0);
        let name = format!("{}{:010}", prefix, *sequence);
        *sequence += 1;

        let path = if parent == "/" {
            format!("/{}", name)
        } else {
            format!("{}/{}", parent, name)
        };
        inner.insert(&path, data.into())?;
        Ok(name)
    }

    /// Replace the data of an existing node
    pub fn set(&self, path: &str, data: impl Into<Vec<u8>>) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let data = data.into();
        match inner.nodes.get_mut(path) {
            Some(slot) => *slot = data.clone(),
            None => return Err(StoreError::NoNode(path.to_string())),
        }
        inner.notify_data(path, NodeEvent::new(NodeEventKind::Changed, Some(data)));
        Ok(())
    }

    /// Delete a node without children
    pub fn delete(&self, path: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if !inner.nodes.contains_key(path) {
            return Err(StoreError::NoNode(path.to_string()));
        }
        if !inner.children(path).is_empty() {
            return Err(StoreError::NotEmpty(path.to_string()));
        }

        inner.nodes.remove(path);
        inner.notify_data(path, NodeEvent::deleted());
        if let Some((parent, _)) = split_path(path) {
            let parent = parent.to_string();
            inner.notify_children(&parent);
        }
        Ok(())
    }

    /// Read a node
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.lock().nodes.get(path).cloned()
    }

    /// List the children of a node, in lexical order
    pub fn children(&self, path: &str) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock();
        if !inner.exists(path) {
            return Err(StoreError::NoNode(path.to_string()));
        }
        Ok(inner.children(path))
    }

    /// Invalidate a lock holder's session, as a store would on session expiry
    ///
    /// The holder's guard reports `lost()` and the lock passes to the next
    /// waiter. Returns `false` if the session is unknown.
    pub fn expire_session(&self, session: u64) -> bool {
        let mut inner = self.inner.lock();
        let Some(lost) = inner.sessions.get(&session).cloned() else {
            return false;
        };

        let path = inner
            .locks
            .iter()
            .find(|(_, queue)| {
                queue.holder == Some(session) || queue.waiters.iter().any(|(id, _)| *id == session)
            })
            .map(|(path, _)| path.clone());
        if let Some(path) = path {
            inner.release(&path, session);
        }

        let _ = lost.send(true);
        true
    }

    /// Session currently holding the lock at `path`
    pub fn lock_holder(&self, path: &str) -> Option<u64> {
        self.inner.lock().locks.get(path).and_then(|queue| queue.holder)
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn watch_children(&self, path: &str) -> StoreResult<Subscription<Vec<String>>> {
        if path != "/" && split_path(path).is_none() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }

        let (tx, subscription) = Subscription::channel(path);
        let mut inner = self.inner.lock();
        let _ = tx.send(inner.children(path));
        inner
            .child_watchers
            .entry(path.to_string())
            .or_default()
            .push(tx);
        Ok(subscription)
    }

    async fn watch_data(&self, path: &str) -> StoreResult<Subscription<NodeEvent>> {
        if split_path(path).is_none() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }

        let (tx, subscription) = Subscription::channel(path);
        let mut inner = self.inner.lock();
        let current = inner.nodes.get(path).cloned();
        let _ = tx.send(NodeEvent::new(NodeEventKind::Initial, current));
        inner
            .data_watchers
            .entry(path.to_string())
            .or_default()
            .push(tx);
        Ok(subscription)
    }

    async fn acquire_lock(&self, path: &str) -> StoreResult<LeaderGuard> {
        let (lost_tx, lost_rx) = watch::channel(false);

        let (session, pending) = {
            let mut inner = self.inner.lock();
            let session = inner.next_session;
            inner.next_session += 1;
            inner.sessions.insert(session, lost_tx);

            let queue = inner.locks.entry(path.to_string()).or_default();
            let pending = if queue.holder.is_none() {
                queue.holder = Some(session);
                None
            } else {
                let (tx, rx) = oneshot::channel();
                queue.waiters.push_back((session, tx));
                Some(rx)
            };
            (session, pending)
        };

        // Built before waiting so a cancelled acquisition leaves the queue.
        let release = LockRelease {
            inner: self.inner.clone(),
            path: path.to_string(),
            session,
        };

        if let Some(granted) = pending {
            granted.await.map_err(|_| StoreError::SessionExpired)?;
        }

        tracing::debug!(path = %path, session, "Lock acquired");
        Ok(LeaderGuard::new(path, session, lost_rx, Box::new(release)))
    }
}
