//! Instance controller seam
//!
//! The controller owns instance creation and deletion. Reconciliation only
//! asks; it never retries a failed request on its own.

mod store_backed;

pub use store_backed::StoreInstanceController;

use crate::error::ControllerError;
use appmon_types::{InstanceId, InstanceOverrides, MonitorName};
use async_trait::async_trait;

/// Creates and deletes scheduled instances
#[async_trait]
pub trait InstanceController: Send + Sync {
    /// Create `count` new instances under `monitor`
    ///
    /// Fails with [`ControllerError::NotFound`] when the application behind
    /// the monitor is not configured.
    async fn create(
        &self,
        monitor: &MonitorName,
        overrides: &InstanceOverrides,
        count: u32,
    ) -> Result<Vec<InstanceId>, ControllerError>;

    /// Delete exactly one instance
    async fn delete(&self, instance: &InstanceId) -> Result<(), ControllerError>;
}
