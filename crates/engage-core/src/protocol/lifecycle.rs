//! Linear Group Lifecycle State Machine
//!
//! Each group moves through an explicit lifecycle driven by local requests and
//! engine events. Transitions consume the current state and either produce the
//! next state with the engine effects to issue, or reject the event and leave
//! the caller holding the unchanged state.

use crate::channel::Effect;
use crate::presence::GroupMembershipTracker;
use crate::protocol::transmit::TxState;
use crate::types::{GroupId, NodeId, Timestamp};
use core::fmt;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

// ----------------------------------------------------------------------------
// Lifecycle States and Events
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LifecycleState {
    #[default]
    Idle,
    Creating,
    Created,
    CreateFailed,
    Joining,
    Joined,
    JoinFailed,
    Left,
}

impl LifecycleState {
    pub fn name(self) -> &'static str {
        match self {
            LifecycleState::Idle => "Idle",
            LifecycleState::Creating => "Creating",
            LifecycleState::Created => "Created",
            LifecycleState::CreateFailed => "CreateFailed",
            LifecycleState::Joining => "Joining",
            LifecycleState::Joined => "Joined",
            LifecycleState::JoinFailed => "JoinFailed",
            LifecycleState::Left => "Left",
        }
    }

    /// The engine holds a created instance of the group
    pub fn is_created(self) -> bool {
        matches!(
            self,
            LifecycleState::Created
                | LifecycleState::Joining
                | LifecycleState::Joined
                | LifecycleState::JoinFailed
                | LifecycleState::Left
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Local requests and engine outcomes that move a group's lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// Ask the engine to create the group from its final configuration
    CreateRequested { config_json: String },
    Created,
    CreateFailed,
    JoinRequested,
    Joined,
    JoinFailed,
    LeaveRequested,
    Left,
    DeleteRequested,
    Deleted,
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::CreateRequested { .. } => "CreateRequested",
            LifecycleEvent::Created => "Created",
            LifecycleEvent::CreateFailed => "CreateFailed",
            LifecycleEvent::JoinRequested => "JoinRequested",
            LifecycleEvent::Joined => "Joined",
            LifecycleEvent::JoinFailed => "JoinFailed",
            LifecycleEvent::LeaveRequested => "LeaveRequested",
            LifecycleEvent::Left => "Left",
            LifecycleEvent::DeleteRequested => "DeleteRequested",
            LifecycleEvent::Deleted => "Deleted",
        }
    }
}

// ----------------------------------------------------------------------------
// State Transition Results
// ----------------------------------------------------------------------------

/// Result of a lifecycle transition
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub new_state: GroupLifecycle,
    /// Engine effects to issue as a result of the transition; at most one
    pub effects: SmallVec<[Effect; 1]>,
    pub audit_entry: AuditEntry,
}

/// Audit trail entry for state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: Timestamp,
    pub group_id: GroupId,
    pub from_state: String,
    pub to_state: String,
    pub event: String,
    pub effects_count: usize,
}

// ----------------------------------------------------------------------------
// State Machine Implementation
// ----------------------------------------------------------------------------

/// A group's lifecycle state, consumed by each transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLifecycle {
    pub group_id: GroupId,
    pub state: LifecycleState,
}

impl GroupLifecycle {
    pub fn new(group_id: GroupId) -> Self {
        Self {
            group_id,
            state: LifecycleState::Idle,
        }
    }

    pub fn with_state(group_id: GroupId, state: LifecycleState) -> Self {
        Self { group_id, state }
    }

    /// Process an event and transition to the next state (consumes self)
    pub fn transition(self, event: LifecycleEvent) -> Result<StateTransition, StateTransitionError> {
        use LifecycleEvent as E;
        use LifecycleState as S;

        let from = self.state;
        let event_name = event.name();
        let group_id = self.group_id;

        let (to, effects) = match (from, event) {
            (S::Idle | S::CreateFailed, E::CreateRequested { config_json }) => (
                S::Creating,
                smallvec![Effect::CreateGroup {
                    group_id: group_id.clone(),
                    config_json,
                }],
            ),
            (S::Idle | S::Creating | S::CreateFailed, E::Created) => (S::Created, SmallVec::new()),
            (S::Creating, E::CreateFailed) => (S::CreateFailed, SmallVec::new()),

            (S::Created | S::JoinFailed | S::Left, E::JoinRequested) => (
                S::Joining,
                smallvec![Effect::JoinGroup {
                    group_id: group_id.clone(),
                }],
            ),
            (S::Created | S::Joining | S::JoinFailed | S::Left, E::Joined) => (S::Joined, SmallVec::new()),
            (S::Created | S::Joining, E::JoinFailed) => (S::JoinFailed, SmallVec::new()),

            (S::Joining | S::Joined | S::JoinFailed, E::LeaveRequested) => (
                S::Left,
                smallvec![Effect::LeaveGroup {
                    group_id: group_id.clone(),
                }],
            ),
            // Already not a member: nothing to tell the engine
            (S::Created | S::Left, E::LeaveRequested) => (from, SmallVec::new()),
            (S::Joining | S::Joined | S::Left, E::Left) => (S::Left, SmallVec::new()),

            (state, E::DeleteRequested) if state != S::Idle => (
                state,
                smallvec![Effect::DeleteGroup {
                    group_id: group_id.clone(),
                }],
            ),
            (_, E::Deleted) => (S::Idle, SmallVec::new()),

            (state, _) => {
                return Err(StateTransitionError::InvalidTransition {
                    from_state: state.name().to_string(),
                    event: event_name.to_string(),
                    reason: format!("Event {} not valid for group {} in state {}", event_name, group_id, state),
                });
            }
        };

        let audit_entry = AuditEntry {
            timestamp: Timestamp::now(),
            group_id: group_id.clone(),
            from_state: from.name().to_string(),
            to_state: to.name().to_string(),
            event: event_name.to_string(),
            effects_count: effects.len(),
        };

        Ok(StateTransition {
            new_state: GroupLifecycle { group_id, state: to },
            effects,
            audit_entry,
        })
    }
}

// ----------------------------------------------------------------------------
// Group Runtime State
// ----------------------------------------------------------------------------

/// Runtime state of one group, layered over its descriptor
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupRuntimeState {
    pub lifecycle: LifecycleState,
    pub tx: TxState,
    pub rx: bool,
    pub rx_muted: bool,
    pub last_tx_start: Option<Timestamp>,
    /// Engine status code from the last failed create, if any
    pub inoperable_error: Option<i32>,
    pub members: HashMap<NodeId, GroupMembershipTracker>,
}

impl GroupRuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear everything except the lifecycle state
    pub fn reset(&mut self) {
        self.tx = TxState::Idle;
        self.rx = false;
        self.rx_muted = false;
        self.last_tx_start = None;
        self.inoperable_error = None;
        self.members.clear();
    }

    // ---- Derived flags ----

    pub fn created(&self) -> bool {
        self.lifecycle.is_created()
    }

    pub fn create_error(&self) -> bool {
        self.lifecycle == LifecycleState::CreateFailed
    }

    pub fn joined(&self) -> bool {
        self.lifecycle == LifecycleState::Joined
    }

    pub fn join_error(&self) -> bool {
        self.lifecycle == LifecycleState::JoinFailed
    }

    pub fn tx_active(&self) -> bool {
        self.tx == TxState::Active
    }

    pub fn tx_pending(&self) -> bool {
        self.tx == TxState::Pending
    }

    pub fn tx_error(&self) -> bool {
        self.tx == TxState::Failed
    }

    pub fn tx_usurped(&self) -> bool {
        self.tx == TxState::Usurped
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateTransitionError {
    /// Invalid state transition attempted
    InvalidTransition {
        from_state: String,
        event: String,
        reason: String,
    },
}

impl fmt::Display for StateTransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateTransitionError::InvalidTransition {
                from_state,
                event,
                reason,
            } => {
                write!(
                    f,
                    "Invalid transition from {} on event {}: {}",
                    from_state, event, reason
                )
            }
        }
    }
}

impl std::error::Error for StateTransitionError {}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
