//! Strongly-typed names for monitors and scheduled instances
//!
//! Both are plain strings in the coordination store. The newtypes keep a
//! monitor key from being passed where an instance name is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Marker separating the monitor name from the sequence in an instance name.
pub const SEQUENCE_MARKER: char = '#';

/// Errors raised when an instance name does not follow `<monitor>#<sequence>`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("instance name has no sequence marker: {0}")]
    MissingSequence(String),

    #[error("instance name has an empty monitor portion: {0}")]
    EmptyMonitor(String),
}

/// Name of a monitor node
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorName(String);

impl MonitorName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MonitorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MonitorName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for MonitorName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for MonitorName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Name of a scheduled instance, `<monitor>#<sequence>`
///
/// The sequence only makes the name unique. It carries no ordering meaning
/// beyond the lexical order the store hands back.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build the name the store assigns to the `sequence`-th instance of `monitor`.
    pub fn compose(monitor: &MonitorName, sequence: u64) -> Self {
        Self(format!("{}{}{:010}", monitor, SEQUENCE_MARKER, sequence))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split on the last sequence marker.
    ///
    /// Monitor names may themselves contain `#`; only the final marker
    /// introduces the sequence.
    pub fn split(&self) -> Result<(MonitorName, &str), IdError> {
        let (monitor, sequence) = self
            .0
            .rsplit_once(SEQUENCE_MARKER)
            .ok_or_else(|| IdError::MissingSequence(self.0.clone()))?;

        if monitor.is_empty() {
            return Err(IdError::EmptyMonitor(self.0.clone()));
        }

        Ok((MonitorName::new(monitor), sequence))
    }

    /// Monitor this instance belongs to.
    pub fn monitor(&self) -> Result<MonitorName, IdError> {
        self.split().map(|(monitor, _)| monitor)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for InstanceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_last_marker() {
        let id = InstanceId::new("proid.web#0000000004");
        assert_eq!(
            id.split().unwrap(),
            (MonitorName::new("proid.web"), "0000000004")
        );

        let nested = InstanceId::new("odd#name#17");
        assert_eq!(nested.split().unwrap(), (MonitorName::new("odd#name"), "17"));
    }

    #[test]
    fn test_short_sequence() {
        let id = InstanceId::new("web#1");
        assert_eq!(id.monitor().unwrap().as_str(), "web");
    }

    #[test]
    fn test_missing_marker() {
        let id = InstanceId::new("stray-node");
        assert_eq!(
            id.monitor(),
            Err(IdError::MissingSequence("stray-node".to_string()))
        );
    }

    #[test]
    fn test_empty_monitor() {
        assert!(matches!(
            InstanceId::new("#0001").monitor(),
            Err(IdError::EmptyMonitor(_))
        ));
    }

    #[test]
    fn test_compose_pads_sequence() {
        let id = InstanceId::compose(&MonitorName::new("api"), 42);
        assert_eq!(id.as_str(), "api#0000000042");
        assert_eq!(id.monitor().unwrap().as_str(), "api");
    }
}
