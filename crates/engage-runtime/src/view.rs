//! Read-side view of the session
//!
//! The core logic task is the only writer. It refreshes the view after each
//! handler and before emitting that handler's app events, so a UI reacting to
//! an event always reads state at least as new as the event.

use dashmap::DashMap;
use engage_core::{
    channel::{Connectivity, GroupSnapshot},
    types::GroupId,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct SessionView {
    groups: Arc<DashMap<GroupId, GroupSnapshot>>,
    node_count: Arc<AtomicUsize>,
    transmitting: Arc<AtomicBool>,
}

impl SessionView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self, group_id: &GroupId) -> Option<GroupSnapshot> {
        self.groups.get(group_id).map(|entry| entry.value().clone())
    }

    /// All snapshots, ordered by group id
    pub fn groups(&self) -> Vec<GroupSnapshot> {
        let mut snapshots: Vec<GroupSnapshot> = self.groups.iter().map(|entry| entry.value().clone()).collect();
        snapshots.sort_by(|a, b| a.group_id.cmp(&b.group_id));
        snapshots
    }

    pub fn connectivity(&self, group_id: &GroupId) -> Connectivity {
        self.groups
            .get(group_id)
            .map(|entry| entry.connectivity())
            .unwrap_or(Connectivity::Disconnected)
    }

    pub fn node_count(&self) -> usize {
        self.node_count.load(Ordering::Acquire)
    }

    pub fn is_transmitting(&self) -> bool {
        self.transmitting.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    // ---- Writer side (core logic task) ----

    pub(crate) fn publish(&self, snapshots: Vec<GroupSnapshot>, node_count: usize, transmitting: bool) {
        self.groups
            .retain(|id, _| snapshots.iter().any(|snapshot| &snapshot.group_id == id));
        for snapshot in snapshots {
            self.groups.insert(snapshot.group_id.clone(), snapshot);
        }
        self.node_count.store(node_count, Ordering::Release);
        self.transmitting.store(transmitting, Ordering::Release);
    }
}
