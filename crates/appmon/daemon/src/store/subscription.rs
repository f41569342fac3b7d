//! Handles returned by watch and lock registration

use tokio::sync::{mpsc, watch};

/// Handle for an established watch
///
/// Notifications arrive in the order the store produced them. Dropping the
/// handle ends the watch; the store prunes it on its next notification.
#[derive(Debug)]
pub struct Subscription<T> {
    path: String,
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Create a handle and the sender the store feeds it through
    pub fn channel(path: impl Into<String>) -> (mpsc::UnboundedSender<T>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                path: path.into(),
                rx,
            },
        )
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Next notification, or `None` once the store side has closed the watch
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// End the watch
    pub fn cancel(mut self) {
        self.rx.close();
    }
}

/// Proof of holding an exclusive lock
///
/// The lock is released when the guard is dropped, whichever way the holder
/// exits. `lost()` resolves if the store invalidates the session first.
pub struct LeaderGuard {
    path: String,
    session: u64,
    lost: watch::Receiver<bool>,
    _release: Box<dyn Send + Sync>,
}

impl LeaderGuard {
    /// `release` is dropped together with the guard and must free the lock.
    pub fn new(
        path: impl Into<String>,
        session: u64,
        lost: watch::Receiver<bool>,
        release: Box<dyn Send + Sync>,
    ) -> Self {
        Self {
            path: path.into(),
            session,
            lost,
            _release: release,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn is_lost(&self) -> bool {
        *self.lost.borrow()
    }

    /// Resolve once the lock is no longer held by this guard
    pub async fn lost(&mut self) {
        // A closed sender means the store went away with the session.
        let _ = self.lost.wait_for(|lost| *lost).await;
    }
}

impl std::fmt::Debug for LeaderGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderGuard")
            .field("path", &self.path)
            .field("session", &self.session)
            .field("lost", &self.is_lost())
            .finish()
    }
}
