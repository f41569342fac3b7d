//! Test doubles shared by unit tests

use crate::controller::InstanceController;
use crate::error::ControllerError;
use appmon_types::{Action, InstanceId, InstanceOverrides, MonitorName};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;

/// Controller that records every request and fails on demand
#[derive(Default)]
pub struct RecordingController {
    calls: Mutex<Vec<Action>>,
    overrides: Mutex<Vec<InstanceOverrides>>,
    fail_create: HashSet<MonitorName>,
    not_found: HashSet<MonitorName>,
    fail_delete: HashSet<InstanceId>,
}

impl RecordingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create(mut self, monitor: &str) -> Self {
        self.fail_create.insert(MonitorName::new(monitor));
        self
    }

    pub fn not_found(mut self, monitor: &str) -> Self {
        self.not_found.insert(MonitorName::new(monitor));
        self
    }

    pub fn fail_delete(mut self, instance: &str) -> Self {
        self.fail_delete.insert(InstanceId::new(instance));
        self
    }

    pub fn calls(&self) -> Vec<Action> {
        self.calls.lock().clone()
    }

    pub fn overrides_seen(&self) -> Vec<InstanceOverrides> {
        self.overrides.lock().clone()
    }

    pub fn creations_for(&self, monitor: &str) -> usize {
        self.calls()
            .iter()
            .filter(|action| {
                matches!(action, Action::Create { monitor: m, .. } if m.as_str() == monitor)
            })
            .count()
    }
}

#[async_trait]
impl InstanceController for RecordingController {
    async fn create(
        &self,
        monitor: &MonitorName,
        overrides: &InstanceOverrides,
        count: u32,
    ) -> Result<Vec<InstanceId>, ControllerError> {
        self.calls.lock().push(Action::create(monitor.clone(), count));
        self.overrides.lock().push(overrides.clone());

        if self.not_found.contains(monitor) {
            return Err(ControllerError::NotFound(monitor.to_string()));
        }
        if self.fail_create.contains(monitor) {
            return Err(ControllerError::Failed("scheduler unavailable".to_string()));
        }
        Ok((0..count)
            .map(|i| InstanceId::compose(monitor, u64::from(i)))
            .collect())
    }

    async fn delete(&self, instance: &InstanceId) -> Result<(), ControllerError> {
        self.calls.lock().push(Action::delete(instance.clone()));

        if self.fail_delete.contains(instance) {
            return Err(ControllerError::Failed("instance busy".to_string()));
        }
        Ok(())
    }
}
