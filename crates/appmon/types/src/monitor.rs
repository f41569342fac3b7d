//! Monitor payload parsing
//!
//! A monitor node stores a small YAML document, for example:
//!
//! ```yaml
//! count: 3
//! ```
//!
//! JSON payloads parse too, since JSON is a subset of YAML.
//!
//! `count` must be an integer in `0..=u32::MAX`. Anything else, including a
//! larger integer, is rejected and the monitor is treated as invalid.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Overrides handed to the instance controller when creating instances.
pub type InstanceOverrides = serde_json::Map<String, serde_json::Value>;

/// Errors raised while reading a monitor payload
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("monitor payload is empty")]
    Empty,

    #[error("monitor payload is not valid: {0}")]
    Invalid(#[from] serde_yaml::Error),
}

/// Desired state carried by a monitor node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSpec {
    /// Number of instances that should be scheduled
    pub count: u32,
}

impl MonitorSpec {
    pub fn new(count: u32) -> Self {
        Self { count }
    }

    /// Parse a raw node payload.
    pub fn parse(data: &[u8]) -> Result<Self, PayloadError> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Err(PayloadError::Empty);
        }
        Ok(serde_yaml::from_slice(data)?)
    }

    /// Serialize into the payload format written to the store.
    pub fn to_payload(&self) -> Vec<u8> {
        format!("count: {}\n", self.count).into_bytes()
    }
}
