//! Cached desired and actual state
//!
//! Both maps mirror the coordination store and are rebuilt from the watches
//! on every start. They are owned by the run loop and only ever touched from
//! its single execution context.

use appmon_types::{InstanceId, MonitorName};
use std::collections::btree_map::{self, BTreeMap};
use tokio::time::Instant;

/// Desired state of one monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Number of instances that should be scheduled
    pub target_count: u32,
    /// Earliest time another scale-up may be requested, `None` when not backing off
    pub next_allowed_scale_up: Option<Instant>,
}

impl MonitorConfig {
    pub fn new(target_count: u32) -> Self {
        Self {
            target_count,
            next_allowed_scale_up: None,
        }
    }

    /// Whether a scale-up is still held back at `now`
    pub fn is_backing_off(&self, now: Instant) -> bool {
        self.next_allowed_scale_up.map_or(false, |next| now < next)
    }
}

/// Monitors keyed by name
#[derive(Debug, Default, Clone)]
pub struct MonitorRegistry {
    monitors: BTreeMap<MonitorName, MonitorConfig>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a monitor, clearing any backoff
    pub fn upsert(&mut self, name: MonitorName, target_count: u32) {
        self.monitors.insert(name, MonitorConfig::new(target_count));
    }

    pub fn remove(&mut self, name: &MonitorName) -> Option<MonitorConfig> {
        self.monitors.remove(name)
    }

    pub fn get(&self, name: &MonitorName) -> Option<&MonitorConfig> {
        self.monitors.get(name)
    }

    pub fn contains(&self, name: &MonitorName) -> bool {
        self.monitors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &MonitorName> {
        self.monitors.keys()
    }

    pub fn iter_mut(&mut self) -> btree_map::IterMut<'_, MonitorName, MonitorConfig> {
        self.monitors.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }
}

/// Scheduled instances grouped by monitor, from the last full snapshot
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScheduledIndex {
    groups: BTreeMap<MonitorName, Vec<InstanceId>>,
}

impl ScheduledIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group a full child listing of the scheduled container.
    ///
    /// Children are sorted first so the per-monitor order does not depend on
    /// the order the store delivered them in. Names without a sequence marker
    /// belong to no monitor and are skipped.
    pub fn from_snapshot<I, S>(children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids: Vec<InstanceId> = children
            .into_iter()
            .map(InstanceId::new)
            .collect();
        ids.sort();

        let mut groups: BTreeMap<MonitorName, Vec<InstanceId>> = BTreeMap::new();
        for id in ids {
            match id.monitor() {
                Ok(monitor) => groups.entry(monitor).or_default().push(id),
                Err(e) => tracing::warn!(error = %e, "Ignoring scheduled node"),
            }
        }

        Self { groups }
    }

    /// Instances of `monitor`, in snapshot order
    pub fn instances(&self, monitor: &MonitorName) -> &[InstanceId] {
        self.groups.get(monitor).map_or(&[], Vec::as_slice)
    }

    pub fn count(&self, monitor: &MonitorName) -> usize {
        self.instances(monitor).len()
    }
}

/// Everything one reconciliation pass reads and writes
#[derive(Debug, Default)]
pub struct ReconcilerState {
    pub registry: MonitorRegistry,
    pub index: ScheduledIndex,
}

impl ReconcilerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a new scheduled snapshot, discarding the previous one
    pub fn replace_index(&mut self, index: ScheduledIndex) {
        self.index = index;
    }
}
