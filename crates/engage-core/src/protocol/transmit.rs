//! Transmit state, outcomes and begin-transmit parameters

use super::lifecycle::StateTransitionError;
use crate::config::TransmitConfig;
use core::fmt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ----------------------------------------------------------------------------
// Transmit State Machine
// ----------------------------------------------------------------------------

/// Per-group transmit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TxState {
    #[default]
    Idle,
    /// Begin-transmit issued, waiting for the engine
    Pending,
    /// Engine reported the transmit started
    Active,
    Failed,
    /// Preempted by another transmitter of equal or higher priority
    Usurped,
    /// Terminated by the engine's maximum transmit time
    Expired,
}

/// How a transmit ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxOutcome {
    Ended,
    Failed,
    Usurped,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxEvent {
    Requested,
    Started,
    /// The local user released the transmit
    Released,
    Terminated(TxOutcome),
    Reset,
}

impl TxState {
    pub fn name(self) -> &'static str {
        match self {
            TxState::Idle => "Idle",
            TxState::Pending => "Pending",
            TxState::Active => "Active",
            TxState::Failed => "Failed",
            TxState::Usurped => "Usurped",
            TxState::Expired => "Expired",
        }
    }

    /// Pending or active
    pub fn is_in_flight(self) -> bool {
        matches!(self, TxState::Pending | TxState::Active)
    }

    pub fn transition(self, event: TxEvent) -> Result<TxState, StateTransitionError> {
        use TxState as S;

        let next = match (self, event) {
            (S::Idle | S::Failed | S::Usurped | S::Expired, TxEvent::Requested) => S::Pending,
            (S::Pending | S::Active, TxEvent::Started) => S::Active,
            (S::Pending | S::Active, TxEvent::Released) => S::Idle,
            (state, TxEvent::Released) => state,
            (_, TxEvent::Terminated(outcome)) => outcome.into(),
            (_, TxEvent::Reset) => S::Idle,
            (state, event) => {
                return Err(StateTransitionError::InvalidTransition {
                    from_state: state.name().to_string(),
                    event: format!("{:?}", event),
                    reason: format!("Transmit event {:?} not valid in state {}", event, state.name()),
                })
            }
        };
        Ok(next)
    }
}

impl From<TxOutcome> for TxState {
    fn from(outcome: TxOutcome) -> Self {
        match outcome {
            TxOutcome::Ended => TxState::Idle,
            TxOutcome::Failed => TxState::Failed,
            TxOutcome::Usurped => TxState::Usurped,
            TxOutcome::Expired => TxState::Expired,
        }
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ----------------------------------------------------------------------------
// Engine Transmit Status
// ----------------------------------------------------------------------------

/// Status code carried in a group transmit detail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TxStatus {
    #[default]
    Undefined,
    Started,
    Ended,
    NotAnAudioGroup,
    NotJoined,
    NotConnected,
    AlreadyTransmitting,
    InvalidParams,
    PriorityTooLow,
    RxActiveOnNonFdx,
    CannotSubscribeToMic,
    InvalidId,
}

impl TxStatus {
    /// Unknown codes decode as `Undefined`
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => TxStatus::Started,
            2 => TxStatus::Ended,
            -1 => TxStatus::NotAnAudioGroup,
            -2 => TxStatus::NotJoined,
            -3 => TxStatus::NotConnected,
            -4 => TxStatus::AlreadyTransmitting,
            -5 => TxStatus::InvalidParams,
            -6 => TxStatus::PriorityTooLow,
            -7 => TxStatus::RxActiveOnNonFdx,
            -8 => TxStatus::CannotSubscribeToMic,
            -9 => TxStatus::InvalidId,
            _ => TxStatus::Undefined,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            TxStatus::Undefined => 0,
            TxStatus::Started => 1,
            TxStatus::Ended => 2,
            TxStatus::NotAnAudioGroup => -1,
            TxStatus::NotJoined => -2,
            TxStatus::NotConnected => -3,
            TxStatus::AlreadyTransmitting => -4,
            TxStatus::InvalidParams => -5,
            TxStatus::PriorityTooLow => -6,
            TxStatus::RxActiveOnNonFdx => -7,
            TxStatus::CannotSubscribeToMic => -8,
            TxStatus::InvalidId => -9,
        }
    }

    pub fn is_error(self) -> bool {
        self.code() <= 0
    }
}

/// Engine detail accompanying transmit events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupTxDetail {
    pub id: String,
    pub status: TxStatus,
    pub local_priority: Option<i64>,
    pub remote_priority: Option<i64>,
}

impl GroupTxDetail {
    /// Decode from event extra JSON, either the bare object or nested under `groupTxDetail`
    pub fn from_event_json(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        let object = value
            .get("groupTxDetail")
            .and_then(Value::as_object)
            .or_else(|| value.as_object())?;

        Some(Self {
            id: object.get("id").and_then(Value::as_str)?.to_string(),
            status: TxStatus::from_code(object.get("status").and_then(Value::as_i64).unwrap_or(0)),
            local_priority: object.get("localPriority").and_then(Value::as_i64),
            remote_priority: object.get("remotePriority").and_then(Value::as_i64),
        })
    }
}

// ----------------------------------------------------------------------------
// Begin-Transmit Parameters
// ----------------------------------------------------------------------------

/// Parameters sent with every begin-transmit request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedTxParams {
    pub flags: u32,
    pub priority: u8,
    pub subchannel_tag: u16,
    pub include_node_id: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Audio starts muted and is unmuted once the grant completes
    pub muted: bool,
}

impl AdvancedTxParams {
    /// A priority override zeroes the flags
    pub fn from_config(config: &TransmitConfig) -> Self {
        let (priority, flags) = if config.priority_tx_level > 0 {
            (config.priority_tx_level, 0)
        } else {
            (config.default_priority, config.default_flags)
        };

        Self {
            flags,
            priority,
            subchannel_tag: 0,
            include_node_id: true,
            alias: config.user_alias.clone().filter(|a| !a.is_empty()),
            muted: true,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_state_flow() {
        let state = TxState::Idle.transition(TxEvent::Requested).unwrap();
        assert_eq!(state, TxState::Pending);
        let state = state.transition(TxEvent::Started).unwrap();
        assert_eq!(state, TxState::Active);
        let state = state
            .transition(TxEvent::Terminated(TxOutcome::Usurped))
            .unwrap();
        assert_eq!(state, TxState::Usurped);
        assert!(!state.is_in_flight());
        assert_eq!(state.transition(TxEvent::Requested).unwrap(), TxState::Pending);
    }

    #[test]
    fn test_invalid_tx_transitions() {
        assert!(TxState::Idle.transition(TxEvent::Started).is_err());
        assert!(TxState::Active.transition(TxEvent::Requested).is_err());
        assert_eq!(TxState::Failed.transition(TxEvent::Released).unwrap(), TxState::Failed);
    }

    #[test]
    fn test_expired_is_neither_usurped_nor_failed() {
        let state = TxState::Active
            .transition(TxEvent::Terminated(TxOutcome::Expired))
            .unwrap();
        assert_eq!(state, TxState::Expired);
        assert_ne!(state, TxState::Usurped);
        assert_ne!(state, TxState::Failed);
    }

    #[test]
    fn test_tx_status_codes() {
        for code in -9..=2 {
            assert_eq!(TxStatus::from_code(code).code(), code);
        }
        assert_eq!(TxStatus::from_code(42), TxStatus::Undefined);
        assert!(TxStatus::PriorityTooLow.is_error());
        assert!(!TxStatus::Started.is_error());
    }

    #[test]
    fn test_tx_detail_decoding() {
        let nested = r#"{"groupTxDetail": {"id": "{g}", "status": -6, "localPriority": 0, "remotePriority": 3}}"#;
        let detail = GroupTxDetail::from_event_json(nested).unwrap();
        assert_eq!(detail.status, TxStatus::PriorityTooLow);
        assert_eq!(detail.remote_priority, Some(3));

        let bare = r#"{"id": "{g}", "status": 1}"#;
        assert_eq!(GroupTxDetail::from_event_json(bare).unwrap().status, TxStatus::Started);
        assert!(GroupTxDetail::from_event_json("garbage").is_none());
    }

    #[test]
    fn test_priority_override_zeroes_flags() {
        let mut config = TransmitConfig {
            default_priority: 2,
            default_flags: 0x10,
            user_alias: Some("ALPHA1".to_string()),
            ..TransmitConfig::default()
        };
        let params = AdvancedTxParams::from_config(&config);
        assert_eq!((params.priority, params.flags), (2, 0x10));
        assert!(params.muted && params.include_node_id);
        assert_eq!(params.subchannel_tag, 0);

        config.priority_tx_level = 7;
        let params = AdvancedTxParams::from_config(&config);
        assert_eq!((params.priority, params.flags), (7, 0));
        assert!(params.to_json().contains("\"alias\":\"ALPHA1\""));
    }
}
