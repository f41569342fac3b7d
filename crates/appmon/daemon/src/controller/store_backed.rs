//! Development controller that schedules instances straight into a MemoryStore

use super::InstanceController;
use crate::config::StoreLayout;
use crate::error::{ControllerError, StoreError};
use crate::store::MemoryStore;
use appmon_types::{InstanceId, InstanceOverrides, MonitorName, SEQUENCE_MARKER};
use async_trait::async_trait;
use std::collections::HashSet;

/// Instance controller backed by the in-memory store
///
/// Each created instance becomes a sequential child of the scheduled
/// container, so watches on that container observe it like a real
/// scheduler's placement.
#[derive(Clone)]
pub struct StoreInstanceController {
    store: MemoryStore,
    layout: StoreLayout,
    unknown: HashSet<MonitorName>,
}

impl StoreInstanceController {
    pub fn new(store: MemoryStore, layout: StoreLayout) -> Self {
        Self {
            store,
            layout,
            unknown: HashSet::new(),
        }
    }

    /// Report these monitors as not configured
    pub fn with_unknown(mut self, names: impl IntoIterator<Item = MonitorName>) -> Self {
        self.unknown.extend(names);
        self
    }
}

#[async_trait]
impl InstanceController for StoreInstanceController {
    async fn create(
        &self,
        monitor: &MonitorName,
        overrides: &InstanceOverrides,
        count: u32,
    ) -> Result<Vec<InstanceId>, ControllerError> {
        if self.unknown.contains(monitor) {
            return Err(ControllerError::NotFound(monitor.to_string()));
        }

        let payload = serde_json::to_vec(overrides)
            .map_err(|e| ControllerError::Failed(e.to_string()))?;
        let prefix = format!("{}{}", monitor, SEQUENCE_MARKER);

        let mut created = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = self
                .store
                .create_sequential(&self.layout.scheduled, &prefix, payload.clone())
                .map_err(|e| ControllerError::Failed(e.to_string()))?;
            created.push(InstanceId::new(name));
        }

        tracing::info!(monitor = %monitor, count, "Created instances");
        Ok(created)
    }

    async fn delete(&self, instance: &InstanceId) -> Result<(), ControllerError> {
        let path = self.layout.scheduled_instance(instance.as_str());
        match self.store.delete(&path) {
            Ok(()) => {
                tracing::info!(instance = %instance, "Deleted instance");
                Ok(())
            }
            Err(StoreError::NoNode(_)) => Err(ControllerError::NotFound(instance.to_string())),
            Err(e) => Err(ControllerError::Failed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> (MemoryStore, StoreInstanceController) {
        let store = MemoryStore::new();
        store.ensure_path("/scheduled").unwrap();
        let controller = StoreInstanceController::new(store.clone(), StoreLayout::default());
        (store, controller)
    }

    #[tokio::test]
    async fn test_create_schedules_sequential_instances() {
        let (store, controller) = controller();
        let created = controller
            .create(&MonitorName::new("web"), &InstanceOverrides::new(), 2)
            .await
            .unwrap();

        assert_eq!(
            created,
            vec![
                InstanceId::new("web#0000000000"),
                InstanceId::new("web#0000000001")
            ]
        );
        assert_eq!(store.children("/scheduled").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_monitor_is_not_found() {
        let (store, controller) = controller();
        let controller = controller.with_unknown([MonitorName::new("ghost")]);

        let result = controller
            .create(&MonitorName::new("ghost"), &InstanceOverrides::new(), 1)
            .await;
        assert_eq!(result, Err(ControllerError::NotFound("ghost".to_string())));
        assert!(store.children("/scheduled").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, controller) = controller();
        store.create("/scheduled/web#1", "").unwrap();

        controller.delete(&InstanceId::new("web#1")).await.unwrap();
        assert!(store.children("/scheduled").unwrap().is_empty());

        assert!(matches!(
            controller.delete(&InstanceId::new("web#1")).await,
            Err(ControllerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_without_container_fails() {
        let store = MemoryStore::new();
        let controller = StoreInstanceController::new(store, StoreLayout::default());
        assert!(matches!(
            controller
                .create(&MonitorName::new("web"), &InstanceOverrides::new(), 1)
                .await,
            Err(ControllerError::Failed(_))
        ));
    }
}
