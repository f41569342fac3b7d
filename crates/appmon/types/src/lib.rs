//! App monitor types
//!
//! Value types shared by the app monitor control plane. A *monitor* declares
//! how many instances of an application should be scheduled; the daemon
//! compares that target with the scheduled instances it observes in the
//! coordination store and emits [`Action`]s to converge the two.
//!
//! ## Key Concepts
//!
//! - **MonitorName**: Key of a monitor node and namespace of its instances
//! - **InstanceId**: Scheduled instance name, `<monitor>#<sequence>`
//! - **MonitorSpec**: Parsed monitor payload (`count`)
//! - **Action**: Corrective step produced by a reconciliation pass

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod action;
pub mod ids;
pub mod monitor;

pub use action::Action;
pub use ids::{IdError, InstanceId, MonitorName, SEQUENCE_MARKER};
pub use monitor::{InstanceOverrides, MonitorSpec, PayloadError};
