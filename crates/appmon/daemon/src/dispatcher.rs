//! Turns coordination store notifications into state changes
//!
//! Watches are forwarded into one bounded queue by small tasks; the run loop
//! drains that queue and hands each [`ControlEvent`] to
//! [`WatchDispatcher::handle`]. Handling and reconciliation therefore never
//! overlap, whatever thread the store delivers notifications on.

use crate::config::StoreLayout;
use crate::error::{DispatchError, ErrorClass};
use crate::reconciler::{PassReport, Reconciler};
use crate::state::{ReconcilerState, ScheduledIndex};
use crate::store::{CoordinationStore, NodeEvent, Subscription};
use appmon_types::{MonitorName, MonitorSpec};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Item on the run loop's event queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// Full child list of the scheduled container
    ScheduledChanged(Vec<String>),

    /// Full child list of the monitors container
    MonitorsChanged(Vec<String>),

    /// Data notification from one monitor's watch
    MonitorData {
        name: MonitorName,
        watch_id: u64,
        event: NodeEvent,
    },

    /// A container watch ended on the store side
    WatchClosed { path: String },

    /// A monitor data watch ended on the store side
    MonitorWatchClosed { name: MonitorName, watch_id: u64 },
}

/// What a handler wants done with the watch that produced its notification
#[derive(Debug)]
pub enum WatchOutcome {
    Continue,
    StopWatching,
    Fatal(DispatchError),
}

struct MonitorWatch {
    id: u64,
    task: JoinHandle<()>,
}

/// Spawn a task pumping a subscription into the event queue
fn forward<T, F>(
    mut subscription: Subscription<T>,
    events: mpsc::Sender<ControlEvent>,
    wrap: F,
    closed: ControlEvent,
) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Fn(T) -> ControlEvent + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(item) = subscription.next().await {
            if events.send(wrap(item)).await.is_err() {
                return;
            }
        }
        let _ = events.send(closed).await;
    })
}

/// Applies watch notifications to [`ReconcilerState`] and drives passes
pub struct WatchDispatcher {
    store: Arc<dyn CoordinationStore>,
    layout: StoreLayout,
    events: mpsc::Sender<ControlEvent>,
    reconciler: Reconciler,
    containers: Vec<JoinHandle<()>>,
    watches: HashMap<MonitorName, MonitorWatch>,
    next_watch_id: u64,
}

impl WatchDispatcher {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        layout: StoreLayout,
        events: mpsc::Sender<ControlEvent>,
        reconciler: Reconciler,
    ) -> Self {
        Self {
            store,
            layout,
            events,
            reconciler,
            containers: Vec::new(),
            watches: HashMap::new(),
            next_watch_id: 0,
        }
    }

    /// Register the scheduled and monitors container watches
    ///
    /// The first scheduled snapshot is applied to `state` before the monitors
    /// watch exists, so no pass ever runs against an index the store has not
    /// delivered yet.
    pub async fn watch_containers(
        &mut self,
        state: &mut ReconcilerState,
    ) -> Result<(), DispatchError> {
        let mut scheduled = self.subscribe_children(&self.layout.scheduled).await?;
        let children = scheduled
            .next()
            .await
            .ok_or_else(|| DispatchError::WatchClosed(scheduled.path().to_string()))?;
        state.replace_index(ScheduledIndex::from_snapshot(children));

        let closed = ControlEvent::WatchClosed {
            path: scheduled.path().to_string(),
        };
        self.containers.push(forward(
            scheduled,
            self.events.clone(),
            ControlEvent::ScheduledChanged,
            closed,
        ));

        let monitors = self.subscribe_children(&self.layout.monitors).await?;
        let closed = ControlEvent::WatchClosed {
            path: monitors.path().to_string(),
        };
        self.containers.push(forward(
            monitors,
            self.events.clone(),
            ControlEvent::MonitorsChanged,
            closed,
        ));

        Ok(())
    }

    async fn subscribe_children(
        &self,
        path: &str,
    ) -> Result<Subscription<Vec<String>>, DispatchError> {
        self.store
            .watch_children(path)
            .await
            .map_err(|source| DispatchError::Watch {
                path: path.to_string(),
                source,
            })
    }

    /// Handle one queued notification
    ///
    /// Returns an error only for fatal conditions; everything recoverable is
    /// logged here.
    pub async fn handle(
        &mut self,
        event: ControlEvent,
        state: &mut ReconcilerState,
    ) -> Result<(), DispatchError> {
        let outcome = match event {
            ControlEvent::ScheduledChanged(children) => self.on_scheduled(children, state).await,
            ControlEvent::MonitorsChanged(children) => self.on_monitors(children, state).await,
            ControlEvent::MonitorData {
                name,
                watch_id,
                event,
            } => {
                if !self.is_current(&name, watch_id) {
                    tracing::debug!(monitor = %name, watch_id, "Dropping notification from stopped watch");
                    return Ok(());
                }
                let outcome = self.on_monitor_data(&name, event, state).await;
                if matches!(outcome, WatchOutcome::StopWatching) {
                    self.unwatch(&name);
                }
                outcome
            }
            ControlEvent::MonitorWatchClosed { name, watch_id } => {
                if self.is_current(&name, watch_id) {
                    WatchOutcome::Fatal(DispatchError::WatchClosed(self.layout.monitor(name.as_str())))
                } else {
                    WatchOutcome::Continue
                }
            }
            ControlEvent::WatchClosed { path } => {
                WatchOutcome::Fatal(DispatchError::WatchClosed(path))
            }
        };

        match outcome {
            WatchOutcome::Continue | WatchOutcome::StopWatching => Ok(()),
            WatchOutcome::Fatal(e) => Err(e),
        }
    }

    /// Run a pass over the current state
    pub async fn reconcile(&self, state: &mut ReconcilerState) -> PassReport {
        self.reconciler.pass(state).await
    }

    /// Monitors with a live data watch
    pub fn watched(&self) -> impl Iterator<Item = &MonitorName> {
        self.watches.keys()
    }

    /// Cancel every watch forwarder
    pub fn shutdown(&mut self) {
        for task in self.containers.drain(..) {
            task.abort();
        }
        for (_, watch) in self.watches.drain() {
            watch.task.abort();
        }
    }

    async fn on_scheduled(
        &mut self,
        children: Vec<String>,
        state: &mut ReconcilerState,
    ) -> WatchOutcome {
        state.replace_index(ScheduledIndex::from_snapshot(children));
        self.reconciler.pass(state).await;
        WatchOutcome::Continue
    }

    async fn on_monitors(
        &mut self,
        children: Vec<String>,
        state: &mut ReconcilerState,
    ) -> WatchOutcome {
        let listed: BTreeSet<MonitorName> = children.into_iter().map(MonitorName::from).collect();

        let known: BTreeSet<MonitorName> = state
            .registry
            .names()
            .chain(self.watches.keys())
            .cloned()
            .collect();

        for name in known.difference(&listed) {
            tracing::info!(monitor = %name, "Removing extra monitor");
            self.unwatch(name);
            if let Err(e) = remove_monitor(state, name) {
                match e.class() {
                    ErrorClass::Recoverable => {
                        tracing::warn!(monitor = %name, error = %e, "Failed to remove monitor")
                    }
                    ErrorClass::Fatal => return WatchOutcome::Fatal(e),
                }
            }
        }

        for name in listed.difference(&known) {
            tracing::info!(monitor = %name, "Adding missing monitor");
            if let Err(e) = self.watch_monitor(name.clone()).await {
                return WatchOutcome::Fatal(e);
            }
        }

        WatchOutcome::Continue
    }

    async fn on_monitor_data(
        &mut self,
        name: &MonitorName,
        event: NodeEvent,
        state: &mut ReconcilerState,
    ) -> WatchOutcome {
        if event.is_absent() {
            tracing::info!(monitor = %name, "Removing watch on deleted monitor");
            state.registry.remove(name);
            return WatchOutcome::StopWatching;
        }

        let data = event.data.unwrap_or_default();
        let spec = match MonitorSpec::parse(&data) {
            Ok(spec) => spec,
            Err(e) => {
                tracing::error!(monitor = %name, error = %e, "Invalid monitor");
                state.registry.remove(name);
                return WatchOutcome::StopWatching;
            }
        };

        tracing::info!(monitor = %name, count = spec.count, "Reconfigure monitor");
        state.registry.upsert(name.clone(), spec.count);
        self.reconciler.pass(state).await;
        WatchOutcome::Continue
    }

    async fn watch_monitor(&mut self, name: MonitorName) -> Result<(), DispatchError> {
        let path = self.layout.monitor(name.as_str());
        let subscription = self
            .store
            .watch_data(&path)
            .await
            .map_err(|source| DispatchError::Watch { path, source })?;

        let id = self.next_watch_id;
        self.next_watch_id += 1;

        let watched = name.clone();
        let task = forward(
            subscription,
            self.events.clone(),
            move |event| ControlEvent::MonitorData {
                name: watched.clone(),
                watch_id: id,
                event,
            },
            ControlEvent::MonitorWatchClosed {
                name: name.clone(),
                watch_id: id,
            },
        );

        self.watches.insert(name, MonitorWatch { id, task });
        Ok(())
    }

    fn unwatch(&mut self, name: &MonitorName) {
        if let Some(watch) = self.watches.remove(name) {
            watch.task.abort();
        }
    }

    fn is_current(&self, name: &MonitorName, watch_id: u64) -> bool {
        self.watches.get(name).map_or(false, |watch| watch.id == watch_id)
    }
}

impl Drop for WatchDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn remove_monitor(state: &mut ReconcilerState, name: &MonitorName) -> Result<(), DispatchError> {
    state
        .registry
        .remove(name)
        .map(|_| ())
        .ok_or_else(|| DispatchError::UnknownMonitor(name.to_string()))
}
