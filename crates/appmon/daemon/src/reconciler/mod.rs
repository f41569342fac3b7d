//! Convergence of scheduled instance counts toward monitor targets
//!
//! [`reconcile`] decides what to do from the cached state alone. The
//! [`Reconciler`] pairs it with an [`ActionExecutor`] that performs the
//! requests. Passes are always run from the run loop's single context, so
//! two passes never overlap.

mod executor;

pub use executor::{ActionExecutor, PassReport};

use crate::controller::InstanceController;
use crate::state::ReconcilerState;
use appmon_types::Action;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Compute the corrective actions for one pass.
///
/// Scale-ups stamp the monitor's backoff so repeated notifications of the
/// same shortfall produce at most one creation burst per window. Scale-downs
/// are never delayed and remove the trailing instances of the snapshot order.
pub fn reconcile(state: &mut ReconcilerState, now: Instant, backoff: Duration) -> Vec<Action> {
    let ReconcilerState { registry, index } = state;
    let mut actions = Vec::new();

    for (name, monitor) in registry.iter_mut() {
        let instances = index.instances(name);
        let current = instances.len();
        let target = monitor.target_count as usize;

        tracing::debug!(monitor = %name, current, target, "Evaluating monitor");

        if current == target {
            continue;
        }

        if current < target {
            if monitor.is_backing_off(now) {
                tracing::debug!(monitor = %name, current, target, "Skipping scale-up until backoff expires");
                continue;
            }

            monitor.next_allowed_scale_up = Some(now + backoff);
            actions.push(Action::Create {
                monitor: name.clone(),
                count: (target - current) as u32,
            });
        } else {
            actions.extend(
                instances[target..]
                    .iter()
                    .map(|instance| Action::Delete {
                        instance: instance.clone(),
                    }),
            );
        }
    }

    actions
}

/// Runs reconciliation passes against an instance controller
pub struct Reconciler {
    backoff: Duration,
    executor: ActionExecutor,
}

impl Reconciler {
    pub fn new(controller: Arc<dyn InstanceController>, backoff: Duration) -> Self {
        Self {
            backoff,
            executor: ActionExecutor::new(controller),
        }
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Run one pass at the current time
    pub async fn pass(&self, state: &mut ReconcilerState) -> PassReport {
        self.pass_at(state, Instant::now()).await
    }

    /// Run one pass as of `now`
    pub async fn pass_at(&self, state: &mut ReconcilerState, now: Instant) -> PassReport {
        let actions = reconcile(state, now, self.backoff);
        if actions.is_empty() {
            return PassReport::default();
        }

        let report = self.executor.execute(actions).await;
        tracing::debug!(
            created = report.created,
            deleted = report.deleted,
            failures = report.failures,
            "Reconciliation pass complete"
        );
        report
    }
}
