//! Applies reconciliation actions against the instance controller

use crate::controller::InstanceController;
use crate::error::ControllerError;
use appmon_types::{Action, InstanceOverrides};
use std::sync::Arc;

/// Outcome of executing one pass's actions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Instances the controller reported as created
    pub created: u32,
    /// Instances deleted
    pub deleted: usize,
    /// Requests that failed and were logged
    pub failures: usize,
}

/// Issues controller requests one at a time, in action order
///
/// Each request is awaited before the next is sent. A failed request is
/// logged and counted; it never stops the remaining actions and is not
/// retried here.
pub struct ActionExecutor {
    controller: Arc<dyn InstanceController>,
    overrides: InstanceOverrides,
}

impl ActionExecutor {
    pub fn new(controller: Arc<dyn InstanceController>) -> Self {
        Self {
            controller,
            overrides: InstanceOverrides::new(),
        }
    }

    pub async fn execute(&self, actions: Vec<Action>) -> PassReport {
        let mut report = PassReport::default();

        for action in actions {
            match action {
                Action::Create { monitor, count } => {
                    tracing::info!(monitor = %monitor, count, "Scaling up");
                    match self.controller.create(&monitor, &self.overrides, count).await {
                        Ok(created) => report.created += created.len() as u32,
                        Err(ControllerError::NotFound(_)) => {
                            report.failures += 1;
                            tracing::warn!(monitor = %monitor, "Application not configured");
                        }
                        Err(e) => {
                            report.failures += 1;
                            tracing::error!(
                                monitor = %monitor,
                                count,
                                error = %e,
                                "Unable to create instances"
                            );
                        }
                    }
                }
                Action::Delete { instance } => {
                    tracing::info!(instance = %instance, "Scaling down");
                    match self.controller.delete(&instance).await {
                        Ok(()) => report.deleted += 1,
                        Err(e) => {
                            report.failures += 1;
                            tracing::error!(
                                instance = %instance,
                                error = %e,
                                "Unable to delete instance"
                            );
                        }
                    }
                }
            }
        }

        report
    }
}
