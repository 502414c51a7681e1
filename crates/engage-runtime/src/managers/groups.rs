//! Group lifecycle management for the Engage runtime
//!
//! The [`GroupManager`] owns the active mission and the runtime state layered
//! over each of its groups. Every lifecycle change goes through
//! [`GroupLifecycle::transition`]; a rejected transition leaves the stored
//! state untouched.

use engage_core::{
    channel::{Effect, GroupSnapshot},
    config::MulticastFailoverConfig,
    errors::LifecycleError,
    mission::{AddOutcome, GroupDescriptor, MissionConfiguration},
    presence::PresenceDescriptor,
    protocol::lifecycle::{AuditEntry, GroupLifecycle, GroupRuntimeState, LifecycleEvent, LifecycleState},
    transport::{GroupConnectionState, TransportPlan},
    types::{GroupId, GroupType, NodeId, UiMode},
    EngageResult,
};
use hashbrown::HashMap;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

const MAX_AUDIT_ENTRIES: usize = 1000;

// ----------------------------------------------------------------------------
// Group Manager
// ----------------------------------------------------------------------------

/// A create request that passed transport planning
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub group_id: GroupId,
    pub plan: TransportPlan,
    pub effects: Vec<Effect>,
}

/// Outcome of replacing the active mission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissionChange {
    /// Groups whose runtime state was carried over
    pub preserved: Vec<GroupId>,
    /// Groups no longer present; their runtime state is gone
    pub removed: Vec<GroupId>,
}

#[derive(Debug, Default)]
pub struct GroupManager {
    mission: Option<MissionConfiguration>,
    runtime: HashMap<GroupId, GroupRuntimeState>,
    audit_trail: VecDeque<AuditEntry>,
    stats: GroupStats,
}

impl GroupManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mission(&self) -> Option<&MissionConfiguration> {
        self.mission.as_ref()
    }

    fn mission_ref(&self) -> Result<&MissionConfiguration, LifecycleError> {
        self.mission.as_ref().ok_or(LifecycleError::NoMission)
    }

    fn mission_mut(&mut self) -> Result<&mut MissionConfiguration, LifecycleError> {
        self.mission.as_mut().ok_or(LifecycleError::NoMission)
    }

    /// Replace the active mission
    ///
    /// Runtime state of groups still present is kept, everything else is
    /// dropped. Dynamic groups discovered under the previous mission are
    /// offered to the new one.
    pub fn apply_mission(&mut self, mut mission: MissionConfiguration) -> MissionChange {
        if let Some(previous) = self.mission.take() {
            for group in previous.groups().iter().filter(|g| g.dynamic) {
                if let Err(e) = mission.add_dynamic_group(group.clone()) {
                    warn!(group_id = %group.id, "Dropping dynamic group on mission change: {}", e);
                }
            }
        }

        let mut change = MissionChange::default();
        let present: Vec<GroupId> = mission.groups().iter().map(|g| g.id.clone()).collect();
        self.runtime.retain(|id, _| {
            if present.contains(id) {
                change.preserved.push(id.clone());
                true
            } else {
                change.removed.push(id.clone());
                false
            }
        });
        for id in present {
            self.runtime.entry(id).or_default();
        }

        info!(
            mission_id = %mission.id,
            groups = mission.groups().len(),
            removed = change.removed.len(),
            "Active mission replaced"
        );
        self.mission = Some(mission);
        change
    }

    pub fn add_dynamic_group(&mut self, group: GroupDescriptor) -> EngageResult<AddOutcome> {
        let group_id = group.id.clone();
        let outcome = self.mission_mut()?.add_dynamic_group(group)?;
        if outcome == AddOutcome::Added {
            self.runtime.entry(group_id.clone()).or_default();
            info!(group_id = %group_id, "Dynamic group added");
        } else {
            debug!(group_id = %group_id, "Dynamic group rediscovered");
        }
        Ok(outcome)
    }

    pub fn descriptor(&self, group_id: &GroupId) -> Result<&GroupDescriptor, LifecycleError> {
        self.mission_ref()?
            .group(group_id.as_str())
            .ok_or_else(|| LifecycleError::GroupNotFound {
                group_id: group_id.to_string(),
            })
    }

    pub fn runtime(&self, group_id: &GroupId) -> Option<&GroupRuntimeState> {
        self.runtime.get(group_id)
    }

    pub fn runtime_mut(&mut self, group_id: &GroupId) -> Option<&mut GroupRuntimeState> {
        self.runtime.get_mut(group_id)
    }

    pub fn group_ids(&self) -> Vec<GroupId> {
        self.mission
            .as_ref()
            .map(|m| m.groups().iter().map(|g| g.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Ids of groups of the given type in mission order
    pub fn ids_of_type(&self, group_type: GroupType) -> Vec<GroupId> {
        self.mission
            .as_ref()
            .map(|m| m.groups_of_type(group_type).map(|g| g.id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn is_presence_group(&self, group_id: &GroupId) -> bool {
        self.descriptor(group_id)
            .is_ok_and(|g| g.group_type == GroupType::Presence)
    }

    // ---- Lifecycle ----

    /// Run one lifecycle transition and store the result
    pub fn apply_lifecycle(
        &mut self,
        group_id: &GroupId,
        event: LifecycleEvent,
    ) -> Result<Vec<Effect>, LifecycleError> {
        self.descriptor(group_id)?;
        let runtime = self.runtime.entry(group_id.clone()).or_default();
        let lifecycle = GroupLifecycle::with_state(group_id.clone(), runtime.lifecycle);

        match lifecycle.transition(event) {
            Ok(transition) => {
                runtime.lifecycle = transition.new_state.state;
                debug!(
                    group_id = %group_id,
                    from = %transition.audit_entry.from_state,
                    to = %transition.audit_entry.to_state,
                    "Lifecycle transition"
                );
                self.audit_trail.push_back(transition.audit_entry);
                if self.audit_trail.len() > MAX_AUDIT_ENTRIES {
                    self.audit_trail.pop_front();
                }
                self.stats.state_transitions += 1;
                Ok(transition.effects.into_vec())
            }
            Err(source) => {
                self.stats.rejected_transitions += 1;
                Err(LifecycleError::Rejected {
                    group_id: group_id.to_string(),
                    source,
                })
            }
        }
    }

    /// Clear rx, tx, members and tx selection, keeping the lifecycle state
    pub fn reset_runtime(&mut self, group_id: &GroupId) {
        if let Some(runtime) = self.runtime.get_mut(group_id) {
            runtime.reset();
        }
        if let Some(group) = self.mission.as_mut().and_then(|m| m.group_mut(group_id.as_str())) {
            group.tx_selected = false;
        }
    }

    /// Plan the transport and ask the engine to create the group
    pub fn create(
        &mut self,
        group_id: &GroupId,
        failover: MulticastFailoverConfig,
        user_alias: Option<&str>,
    ) -> Result<CreateRequest, LifecycleError> {
        let mission = self.mission_ref()?;
        let group = self.descriptor(group_id)?;
        let plan = TransportPlan::for_group(mission, group, failover);
        let config_json = plan
            .build_group_config(group, user_alias)
            .ok_or_else(|| LifecycleError::NoUsableTransport {
                group_id: group_id.to_string(),
            })?;

        let effects = self.apply_lifecycle(group_id, LifecycleEvent::CreateRequested { config_json })?;
        self.stats.creates_requested += 1;
        Ok(CreateRequest {
            group_id: group_id.clone(),
            plan,
            effects,
        })
    }

    /// Create every group, skipping those without a usable transport
    pub fn create_all(&mut self, failover: MulticastFailoverConfig, user_alias: Option<&str>) -> Vec<CreateRequest> {
        let mut requests = Vec::new();
        for group_id in self.group_ids() {
            match self.create(&group_id, failover, user_alias) {
                Ok(request) => requests.push(request),
                Err(LifecycleError::NoUsableTransport { .. }) => {
                    warn!(group_id = %group_id, "Skipping group without a usable transport");
                }
                Err(e) => debug!(group_id = %group_id, "Not creating group: {}", e),
            }
        }
        requests
    }

    pub fn join(&mut self, group_id: &GroupId) -> Result<Vec<Effect>, LifecycleError> {
        let effects = self.apply_lifecycle(group_id, LifecycleEvent::JoinRequested)?;
        self.stats.joins_requested += 1;
        Ok(effects)
    }

    /// Join presence, raw and the audio groups selected for `ui_mode`
    pub fn join_selected(&mut self, ui_mode: UiMode) -> Result<Vec<Effect>, LifecycleError> {
        let ids = self.mission_ref()?.ids_of_selected_groups(ui_mode);
        let mut effects = Vec::new();
        for group_id in ids {
            let already = self.runtime(&group_id).is_some_and(|r| {
                matches!(r.lifecycle, LifecycleState::Joining | LifecycleState::Joined)
            });
            if already {
                continue;
            }
            match self.join(&group_id) {
                Ok(mut join_effects) => effects.append(&mut join_effects),
                Err(e) => warn!(group_id = %group_id, "Could not join selected group: {}", e),
            }
        }
        Ok(effects)
    }

    /// Leave a group; never fails for a known group
    pub fn leave(&mut self, group_id: &GroupId) -> Result<Vec<Effect>, LifecycleError> {
        match self.apply_lifecycle(group_id, LifecycleEvent::LeaveRequested) {
            Ok(effects) => Ok(effects),
            Err(LifecycleError::Rejected { .. }) => {
                debug!(group_id = %group_id, "Leave ignored; group was never joined");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    pub fn leave_all(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        for group_id in self.group_ids() {
            if let Ok(mut leave_effects) = self.leave(&group_id) {
                effects.append(&mut leave_effects);
            }
        }
        effects
    }

    pub fn delete(&mut self, group_id: &GroupId) -> Result<Vec<Effect>, LifecycleError> {
        self.apply_lifecycle(group_id, LifecycleEvent::DeleteRequested)
    }

    // ---- Engine Outcomes ----

    pub fn on_created(&mut self, group_id: &GroupId) -> Result<(), LifecycleError> {
        self.apply_lifecycle(group_id, LifecycleEvent::Created)?;
        self.reset_runtime(group_id);
        Ok(())
    }

    pub fn on_create_failed(
        &mut self,
        group_id: &GroupId,
        status: Option<i32>,
    ) -> Result<(), LifecycleError> {
        self.apply_lifecycle(group_id, LifecycleEvent::CreateFailed)?;
        self.reset_runtime(group_id);
        if let Some(runtime) = self.runtime.get_mut(group_id) {
            runtime.inoperable_error = status;
        }
        Ok(())
    }

    pub fn on_deleted(&mut self, group_id: &GroupId) -> Result<(), LifecycleError> {
        self.apply_lifecycle(group_id, LifecycleEvent::Deleted)?;
        self.reset_runtime(group_id);
        Ok(())
    }

    pub fn on_joined(&mut self, group_id: &GroupId) -> Result<(), LifecycleError> {
        self.apply_lifecycle(group_id, LifecycleEvent::Joined).map(|_| ())
    }

    pub fn on_join_failed(&mut self, group_id: &GroupId) -> Result<(), LifecycleError> {
        self.apply_lifecycle(group_id, LifecycleEvent::JoinFailed)?;
        self.reset_runtime(group_id);
        Ok(())
    }

    pub fn on_left(&mut self, group_id: &GroupId) -> Result<(), LifecycleError> {
        self.apply_lifecycle(group_id, LifecycleEvent::Left)?;
        self.reset_runtime(group_id);
        Ok(())
    }

    pub fn set_rx(&mut self, group_id: &GroupId, active: bool) -> Result<(), LifecycleError> {
        self.descriptor(group_id)?;
        self.runtime.entry(group_id.clone()).or_default().rx = active;
        Ok(())
    }

    pub fn set_rx_muted(&mut self, group_id: &GroupId, muted: bool) -> Result<(), LifecycleError> {
        self.descriptor(group_id)?;
        self.runtime.entry(group_id.clone()).or_default().rx_muted = muted;
        Ok(())
    }

    /// Engine stopped: every group back to idle with fresh runtime state
    pub fn go_idle(&mut self) {
        for runtime in self.runtime.values_mut() {
            runtime.reset();
            runtime.lifecycle = LifecycleState::Idle;
        }
        if let Some(mission) = self.mission.as_mut() {
            let ids: Vec<GroupId> = mission.groups().iter().map(|g| g.id.clone()).collect();
            for id in ids {
                if let Some(group) = mission.group_mut(id.as_str()) {
                    group.tx_selected = false;
                }
            }
        }
        info!("All groups returned to idle");
    }

    // ---- Selection ----

    pub fn select_for_single_view(&mut self, group_id: &GroupId) -> Result<(), LifecycleError> {
        if self.mission_mut()?.select_for_single_view(group_id.as_str()) {
            Ok(())
        } else {
            Err(LifecycleError::GroupNotFound {
                group_id: group_id.to_string(),
            })
        }
    }

    pub fn set_selected_for_multi_view(
        &mut self,
        group_id: &GroupId,
        selected: bool,
    ) -> Result<(), LifecycleError> {
        if self.mission_mut()?.set_selected_for_multi_view(group_id.as_str(), selected) {
            Ok(())
        } else {
            Err(LifecycleError::GroupNotFound {
                group_id: group_id.to_string(),
            })
        }
    }

    pub fn set_tx_selected(&mut self, group_id: &GroupId, selected: bool) -> Result<(), LifecycleError> {
        if self.mission_mut()?.set_tx_selected(group_id.as_str(), selected) {
            Ok(())
        } else {
            Err(LifecycleError::GroupNotFound {
                group_id: group_id.to_string(),
            })
        }
    }

    // ---- Membership ----

    /// Record `descriptor`'s group memberships on the groups we know
    pub fn sync_memberships(&mut self, descriptor: &PresenceDescriptor) {
        self.remove_member(&descriptor.node_id);
        for (group_id, tracker) in &descriptor.memberships {
            if let Some(runtime) = self.runtime.get_mut(group_id) {
                runtime.members.insert(descriptor.node_id.clone(), tracker.clone());
            }
        }
    }

    pub fn remove_member(&mut self, node_id: &NodeId) {
        for runtime in self.runtime.values_mut() {
            runtime.members.remove(node_id);
        }
    }

    pub fn clear_members(&mut self) {
        for runtime in self.runtime.values_mut() {
            runtime.members.clear();
        }
    }

    // ---- Read Side ----

    pub fn snapshot(&self, group_id: &GroupId, connection: GroupConnectionState) -> Option<GroupSnapshot> {
        let descriptor = self.descriptor(group_id).ok()?;
        let runtime = self.runtime.get(group_id).cloned().unwrap_or_default();
        Some(GroupSnapshot::new(descriptor, &runtime, connection))
    }

    pub fn count_where(&self, predicate: impl Fn(&GroupRuntimeState) -> bool) -> usize {
        self.runtime.values().filter(|r| predicate(r)).count()
    }

    pub fn audit_trail(&self) -> &VecDeque<AuditEntry> {
        &self.audit_trail
    }

    pub fn stats(&self) -> &GroupStats {
        &self.stats
    }
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupStats {
    pub state_transitions: u64,
    pub rejected_transitions: u64,
    pub creates_requested: u64,
    pub joins_requested: u64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
