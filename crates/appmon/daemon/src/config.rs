//! Configuration for appmon-daemon

use crate::error::DaemonError;
use crate::runner::Leadership;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Coordination store layout
    #[serde(default)]
    pub store: StoreLayout,

    /// Reconciler configuration
    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    /// Leader election configuration
    #[serde(default)]
    pub leadership: LeadershipConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Development store seeding
    #[serde(default)]
    pub development: DevelopmentConfig,
}

/// Where the daemon finds its state in the coordination store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreLayout {
    /// Container holding one child per scheduled instance
    #[serde(default = "default_scheduled_path")]
    pub scheduled: String,

    /// Container holding one child per monitor
    #[serde(default = "default_monitors_path")]
    pub monitors: String,

    /// Lock node used for leader election
    #[serde(default = "default_election_path")]
    pub election: String,
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            scheduled: default_scheduled_path(),
            monitors: default_monitors_path(),
            election: default_election_path(),
        }
    }
}

impl StoreLayout {
    /// Path of a single monitor node
    pub fn monitor(&self, name: &str) -> String {
        format!("{}/{}", self.monitors, name)
    }

    /// Path of a single scheduled instance node
    pub fn scheduled_instance(&self, id: &str) -> String {
        format!("{}/{}", self.scheduled, id)
    }
}

/// Reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Minimum seconds between two scale-up bursts of one monitor
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,

    /// Safety-net tick interval in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Capacity of the event queue feeding the reconciler
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            backoff_secs: default_backoff_secs(),
            tick_interval_ms: default_tick_interval_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ReconcilerConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Leader election configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadershipConfig {
    /// Reconcile without taking the leader lock (single process or debugging)
    #[serde(default)]
    pub no_lock: bool,
}

impl LeadershipConfig {
    pub fn mode(&self) -> Leadership {
        if self.no_lock {
            Leadership::Assume
        } else {
            Leadership::Elect
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Seed data for the in-process development store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevelopmentConfig {
    /// Monitors written at startup, name to target count
    #[serde(default)]
    pub monitors: BTreeMap<String, u32>,

    /// Monitors the development controller reports as not configured
    #[serde(default)]
    pub unknown: Vec<String>,
}

// Default value helpers
fn default_scheduled_path() -> String {
    "/scheduled".to_string()
}

fn default_monitors_path() -> String {
    "/app-monitors".to_string()
}

fn default_election_path() -> String {
    "/election/appmonitor".to_string()
}

fn default_backoff_secs() -> u64 {
    60
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from defaults, an optional file, and `APPMON_` variables
    ///
    /// Nested keys use a double underscore, e.g. `APPMON_RECONCILER__BACKOFF_SECS`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("APPMON")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Reject settings the run loop cannot work with
    pub fn validate(&self) -> Result<(), DaemonError> {
        for (key, path) in [
            ("store.scheduled", &self.store.scheduled),
            ("store.monitors", &self.store.monitors),
            ("store.election", &self.store.election),
        ] {
            if !path.starts_with('/') || path.len() < 2 || path.ends_with('/') {
                return Err(DaemonError::Config(format!(
                    "{} must be an absolute node path, got {:?}",
                    key, path
                )));
            }
        }

        if self.store.scheduled == self.store.monitors {
            return Err(DaemonError::Config(
                "store.scheduled and store.monitors must differ".to_string(),
            ));
        }

        if self.reconciler.tick_interval_ms == 0 {
            return Err(DaemonError::Config(
                "reconciler.tick_interval_ms must be positive".to_string(),
            ));
        }

        if self.reconciler.queue_capacity == 0 {
            return Err(DaemonError::Config(
                "reconciler.queue_capacity must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
