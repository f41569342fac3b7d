//! Corrective actions emitted by a reconciliation pass

use crate::ids::{InstanceId, MonitorName};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single request to the instance controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Create `count` new instances under `monitor`
    Create { monitor: MonitorName, count: u32 },

    /// Delete exactly one scheduled instance
    Delete { instance: InstanceId },
}

impl Action {
    pub fn create(monitor: impl Into<MonitorName>, count: u32) -> Self {
        Self::Create {
            monitor: monitor.into(),
            count,
        }
    }

    pub fn delete(instance: impl Into<InstanceId>) -> Self {
        Self::Delete {
            instance: instance.into(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create { monitor, count } => write!(f, "create({}, {})", monitor, count),
            Self::Delete { instance } => write!(f, "delete({})", instance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Action::create("web", 3).to_string(), "create(web, 3)");
        assert_eq!(Action::delete("web#4").to_string(), "delete(web#4)");
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(Action::create("web", 2)).unwrap();
        assert_eq!(json["type"], "create");
        assert_eq!(json["monitor"], "web");
        assert_eq!(json["count"], 2);
    }
}
