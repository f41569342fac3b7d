//! Leadership-gated run loop
//!
//! The loop owns [`ReconcilerState`] and is the only place it is touched.
//! It waits on three sources:
//! - the event queue fed by the watch forwarders
//! - a fixed tick that re-runs reconciliation on the cached state
//! - loss of the leader lock, which ends the run

use crate::config::{ReconcilerConfig, StoreLayout};
use crate::controller::InstanceController;
use crate::dispatcher::WatchDispatcher;
use crate::error::{DaemonError, DaemonResult};
use crate::reconciler::Reconciler;
use crate::state::ReconcilerState;
use crate::store::{CoordinationStore, LeaderGuard};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// How the run loop obtains the right to reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leadership {
    /// Hold the election lock for the whole run
    Elect,
    /// Reconcile without the lock (single process or debugging)
    Assume,
}

/// Ties leadership, watch registration and the safety-net tick together
pub struct RunLoop {
    store: Arc<dyn CoordinationStore>,
    controller: Arc<dyn InstanceController>,
    layout: StoreLayout,
    config: ReconcilerConfig,
    leadership: Leadership,
}

impl RunLoop {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        controller: Arc<dyn InstanceController>,
        layout: StoreLayout,
        config: ReconcilerConfig,
        leadership: Leadership,
    ) -> Self {
        Self {
            store,
            controller,
            layout,
            config,
            leadership,
        }
    }

    /// Run until a fatal error or loss of leadership
    pub async fn run(self) -> DaemonResult<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run until `shutdown` resolves, a fatal error, or loss of leadership
    pub async fn run_until<F>(self, shutdown: F) -> DaemonResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut guard = match self.leadership {
            Leadership::Elect => {
                tracing::info!(path = %self.layout.election, "Waiting for leader lock");
                let guard = tokio::select! {
                    guard = self.store.acquire_lock(&self.layout.election) => guard?,
                    _ = &mut shutdown => return Ok(()),
                };
                tracing::info!(
                    path = guard.path(),
                    session = guard.session(),
                    "Acquired leader lock"
                );
                Some(guard)
            }
            Leadership::Assume => {
                tracing::info!("Running without lock");
                None
            }
        };

        let (tx, mut rx) = mpsc::channel(self.config.queue_capacity);
        let reconciler = Reconciler::new(self.controller.clone(), self.config.backoff());
        let mut dispatcher = WatchDispatcher::new(self.store.clone(), self.layout.clone(), tx, reconciler);
        let mut state = ReconcilerState::new();

        dispatcher.watch_containers(&mut state).await?;
        tracing::info!("Ready");

        let period = self.config.tick_interval();
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                biased;

                _ = leadership_lost(&mut guard) => {
                    tracing::error!(path = %self.layout.election, "Leader lock lost, stopping reconciliation");
                    break Err(DaemonError::LeadershipLost(self.layout.election.clone()));
                }
                _ = &mut shutdown => {
                    tracing::info!("Shutting down");
                    break Ok(());
                }
                Some(event) = rx.recv() => {
                    if let Err(e) = dispatcher.handle(event, &mut state).await {
                        tracing::error!(error = %e, "Unhandled error while processing watch");
                        break Err(e.into());
                    }
                }
                _ = tick.tick() => {
                    dispatcher.reconcile(&mut state).await;
                }
            }
        };

        dispatcher.shutdown();
        drop(guard);
        result
    }
}

/// Resolves when the held lock is lost; never resolves without a lock
async fn leadership_lost(guard: &mut Option<LeaderGuard>) {
    match guard {
        Some(guard) => guard.lost().await,
        None => std::future::pending().await,
    }
}
