//! Error types for appmon-daemon

use thiserror::Error;

/// Daemon-level errors
///
/// Every variant ends the current run. Recoverable conditions never reach
/// this type; they are logged where they happen.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Coordination store error outside watch processing
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The leader lock was invalidated while reconciling
    #[error("Leadership lost on {0}")]
    LeadershipLost(String),

    /// Unhandled failure while processing a watch notification
    #[error("Fatal watch error: {0}")]
    Watch(#[from] DispatchError),
}

/// Coordination store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Node does not exist
    #[error("No node: {0}")]
    NoNode(String),

    /// Node already exists
    #[error("Node exists: {0}")]
    NodeExists(String),

    /// Node still has children
    #[error("Node not empty: {0}")]
    NotEmpty(String),

    /// Path is not a valid absolute node path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Session backing a lock or watch is gone
    #[error("Session expired")]
    SessionExpired,

    /// Store connection error
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Instance controller errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    /// The application backing a monitor is not configured
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other controller failure
    #[error("Controller failure: {0}")]
    Failed(String),
}

/// How the dispatcher treats an error raised while handling a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Log and keep running
    Recoverable,
    /// Stop the run; supervision restarts the process and rebuilds the watches
    Fatal,
}

/// Errors raised while handling a watch notification
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Registering a watch failed
    #[error("Unable to watch {path}: {source}")]
    Watch {
        path: String,
        #[source]
        source: StoreError,
    },

    /// A watch ended without being cancelled
    #[error("Watch closed unexpectedly: {0}")]
    WatchClosed(String),

    /// Removing a monitor that was never registered
    #[error("Monitor not registered: {0}")]
    UnknownMonitor(String),
}

impl DispatchError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DispatchError::UnknownMonitor(_) => ErrorClass::Recoverable,
            DispatchError::Watch { .. } | DispatchError::WatchClosed(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_classes() {
        assert_eq!(
            DispatchError::UnknownMonitor("web".to_string()).class(),
            ErrorClass::Recoverable
        );
        assert!(DispatchError::WatchClosed("/scheduled".to_string()).is_fatal());
        assert!(DispatchError::Watch {
            path: "/app-monitors/web".to_string(),
            source: StoreError::SessionExpired,
        }
        .is_fatal());
    }

    #[test]
    fn test_daemon_error_from_dispatch() {
        let err: DaemonError = DispatchError::WatchClosed("/scheduled".to_string()).into();
        assert!(matches!(err, DaemonError::Watch(DispatchError::WatchClosed(_))));
        assert_eq!(
            err.to_string(),
            "Fatal watch error: Watch closed unexpectedly: /scheduled"
        );
    }
}
