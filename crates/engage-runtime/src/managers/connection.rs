//! Connection state management for the Engage runtime
//!
//! The [`ConnectionManager`] keeps one [`ConnectionTracker`] per created group
//! and folds engine connection reports into it. Connectivity is tracked apart
//! from the lifecycle: a joined group may be disconnected and vice versa.

use engage_core::{
    config::MulticastFailoverConfig,
    transport::{
        ConnectionChange, ConnectionDetail, ConnectionEventKind, ConnectionTracker, FailoverDecision,
        GroupConnectionState,
    },
    types::{GroupId, Timestamp},
};
use hashbrown::HashMap;
use std::collections::VecDeque;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const MAX_AUDIT_ENTRIES: usize = 1000;

// ----------------------------------------------------------------------------
// Connection Manager
// ----------------------------------------------------------------------------

/// One recorded connectivity change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionAuditEntry {
    pub timestamp: Timestamp,
    pub group_id: GroupId,
    pub kind: ConnectionEventKind,
    pub before: GroupConnectionState,
    pub after: GroupConnectionState,
}

/// Manages connection trackers for all created groups
#[derive(Debug, Default)]
pub struct ConnectionManager {
    trackers: HashMap<GroupId, ConnectionTracker>,
    audit_trail: VecDeque<ConnectionAuditEntry>,
    stats: ConnectionStats,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember whether the group's transport plan includes a relay
    pub fn plan(&mut self, group_id: &GroupId, relay_planned: bool) {
        self.trackers
            .entry(group_id.clone())
            .or_insert_with(|| ConnectionTracker::new(group_id.clone(), relay_planned))
            .set_relay_planned(relay_planned);
    }

    /// A fresh create: all transport flags false
    pub fn on_created(&mut self, group_id: &GroupId) {
        let tracker = self
            .trackers
            .entry(group_id.clone())
            .or_insert_with(|| ConnectionTracker::new(group_id.clone(), false));
        tracker.reset();
    }

    /// Fold an engine connection report into the group's tracker
    pub fn apply(
        &mut self,
        group_id: &GroupId,
        kind: ConnectionEventKind,
        detail: Option<&ConnectionDetail>,
        now: Timestamp,
    ) -> ConnectionChange {
        let tracker = self.trackers.entry(group_id.clone()).or_insert_with(|| {
            debug!(group_id = %group_id, "Connection report for untracked group");
            ConnectionTracker::new(group_id.clone(), false)
        });

        let before = tracker.state();
        let change = tracker.apply(kind, detail, now);
        self.stats.reports_applied += 1;
        if change.ambiguous {
            self.stats.ambiguous_reports += 1;
        }

        if change.changed {
            let after = tracker.state();
            self.stats.state_changes += 1;
            self.audit_trail.push_back(ConnectionAuditEntry {
                timestamp: now,
                group_id: group_id.clone(),
                kind,
                before,
                after,
            });
            if self.audit_trail.len() > MAX_AUDIT_ENTRIES {
                self.audit_trail.pop_front();
            }
        }
        change
    }

    /// Connection state of a group; all false when untracked
    pub fn state(&self, group_id: &GroupId) -> GroupConnectionState {
        self.trackers
            .get(group_id)
            .map(ConnectionTracker::state)
            .unwrap_or_default()
    }

    pub fn is_connected_in_some_way(&self, group_id: &GroupId) -> bool {
        self.state(group_id).is_connected_in_some_way()
    }

    pub fn tracker(&self, group_id: &GroupId) -> Option<&ConnectionTracker> {
        self.trackers.get(group_id)
    }

    /// Erase a group's connection entry
    pub fn remove(&mut self, group_id: &GroupId) -> bool {
        self.trackers.remove(group_id).is_some()
    }

    pub fn clear(&mut self) {
        if !self.trackers.is_empty() {
            info!(count = self.trackers.len(), "Clearing all connection state");
        }
        self.trackers.clear();
    }

    /// Groups whose multicast loss has reached the failover threshold
    ///
    /// Each loss episode is reported once.
    pub fn due_failovers(&mut self, now: Timestamp, config: MulticastFailoverConfig) -> Vec<(GroupId, u64)> {
        let mut due = Vec::new();
        for (group_id, tracker) in self.trackers.iter_mut() {
            if let FailoverDecision::FailoverDue { lost_for_ms } = tracker.evaluate(now, config) {
                tracker.mark_failover_announced();
                self.stats.failovers_announced += 1;
                info!(group_id = %group_id, lost_for_ms, "Multicast failover due");
                due.push((group_id.clone(), lost_for_ms));
            }
        }
        due.sort();
        due
    }

    pub fn connected_count(&self) -> usize {
        self.trackers.values().filter(|t| t.is_connected_in_some_way()).count()
    }

    pub fn audit_trail(&self) -> &VecDeque<ConnectionAuditEntry> {
        &self.audit_trail
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub reports_applied: u64,
    /// Reports that arrived without a usable connection detail
    pub ambiguous_reports: u64,
    pub state_changes: u64,
    pub failovers_announced: u64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
