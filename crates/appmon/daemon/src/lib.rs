//! App monitor daemon library
//!
//! Keeps the number of scheduled instances of each monitored application at
//! the target its monitor node declares:
//! - Watches monitors and scheduled instances in the coordination store
//! - Reconciles the two and asks the instance controller to converge them
//! - Rate-limits scale-ups per monitor
//! - Runs only while holding the leader lock

#![deny(unsafe_code)]

pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod reconciler;
pub mod runner;
pub mod state;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{DaemonConfig, ReconcilerConfig, StoreLayout};
pub use controller::{InstanceController, StoreInstanceController};
pub use dispatcher::{ControlEvent, WatchDispatcher, WatchOutcome};
pub use error::{ControllerError, DaemonError, DaemonResult, DispatchError, ErrorClass, StoreError};
pub use reconciler::{reconcile, PassReport, Reconciler};
pub use runner::{Leadership, RunLoop};
pub use state::{MonitorConfig, MonitorRegistry, ReconcilerState, ScheduledIndex};
pub use store::{CoordinationStore, LeaderGuard, MemoryStore, NodeEvent, NodeEventKind, Subscription};
