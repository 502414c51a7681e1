//! Engine events and their validating decode
//!
//! The engine reports everything as a `{kind, id, json}` triple, with an
//! optional binary payload for blobs and a seconds counter for license
//! expiry. [`EngineEvent::decode`] is the single place where those raw
//! reports are checked and turned into typed events; nothing past it looks at
//! engine JSON again.

use crate::license::LicenseDescriptor;
use crate::presence::PresenceDescriptor;
use crate::protocol::transmit::GroupTxDetail;
use crate::transport::ConnectionDetail;
use crate::types::{GroupId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Node id used by the engine for "everyone"
pub const NULL_NODE_ID: &str = "{00000000-0000-0000-0000-000000000000}";

// ----------------------------------------------------------------------------
// Decode Errors
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventDecodeError {
    #[error("Unknown engine event kind '{kind}'")]
    UnknownKind { kind: String },
    #[error("Engine event '{kind}' carries no group id")]
    MissingGroupId { kind: String },
    #[error("Engine event '{kind}' is missing its {what}")]
    MissingPayload { kind: String, what: String },
    #[error("Engine event '{kind}' has an invalid payload: {reason}")]
    InvalidPayload { kind: String, reason: String },
}

// ----------------------------------------------------------------------------
// Raw Engine Event
// ----------------------------------------------------------------------------

/// Undecoded engine report
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawEngineEvent {
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub json: Option<String>,
    #[serde(default)]
    pub payload: Option<Vec<u8>>,
    #[serde(default)]
    pub seconds_left: Option<u64>,
}

impl RawEngineEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_json(mut self, json: impl Into<String>) -> Self {
        self.json = Some(json.into());
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_seconds_left(mut self, seconds_left: u64) -> Self {
        self.seconds_left = Some(seconds_left);
        self
    }
}

// ----------------------------------------------------------------------------
// Supporting Details
// ----------------------------------------------------------------------------

/// `groupCreationDetail` carried with create failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCreationDetail {
    pub id: String,
    pub status: i32,
}

impl GroupCreationDetail {
    pub fn from_event_json(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        let object = value
            .get("groupCreationDetail")
            .and_then(Value::as_object)
            .or_else(|| value.as_object())?;
        let status = object.get("status")?.as_i64()?;
        Some(Self {
            id: object.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
            status: i32::try_from(status).ok()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlobPayloadType {
    #[default]
    Undefined,
    AppTextUtf8,
    JsonTextUtf8,
    AppBinary,
    HumanBiometrics,
}

impl BlobPayloadType {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => BlobPayloadType::AppTextUtf8,
            2 => BlobPayloadType::JsonTextUtf8,
            3 => BlobPayloadType::AppBinary,
            4 => BlobPayloadType::HumanBiometrics,
            _ => BlobPayloadType::Undefined,
        }
    }
}

/// Header of a received blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    pub payload_type: BlobPayloadType,
    pub source: String,
    pub target: String,
    pub size: Option<u64>,
}

impl BlobInfo {
    fn from_json(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        let object = value
            .get("blobHeader")
            .and_then(Value::as_object)
            .or_else(|| value.as_object())?;
        Some(Self {
            payload_type: BlobPayloadType::from_code(object.get("payloadType")?.as_i64()?),
            source: object.get("source")?.as_str()?.to_string(),
            target: object.get("target").and_then(Value::as_str).unwrap_or(NULL_NODE_ID).to_string(),
            size: object.get("size").and_then(Value::as_u64),
        })
    }

    /// Addressed to everyone or to `node_id`
    pub fn is_for(&self, node_id: &str) -> bool {
        self.target.is_empty() || self.target == NULL_NODE_ID || self.target == node_id
    }
}

// ----------------------------------------------------------------------------
// Engine Event
// ----------------------------------------------------------------------------

/// Typed engine event (Engine → Core Logic)
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    EngineStarted,
    EngineStopped,

    GroupCreated {
        group_id: GroupId,
    },
    GroupCreateFailed {
        group_id: GroupId,
        detail: Option<GroupCreationDetail>,
    },
    GroupDeleted {
        group_id: GroupId,
    },

    GroupJoined {
        group_id: GroupId,
    },
    GroupJoinFailed {
        group_id: GroupId,
    },
    GroupLeft {
        group_id: GroupId,
    },

    GroupConnected {
        group_id: GroupId,
        detail: Option<ConnectionDetail>,
    },
    GroupConnectFailed {
        group_id: GroupId,
        detail: Option<ConnectionDetail>,
    },
    GroupDisconnected {
        group_id: GroupId,
        detail: Option<ConnectionDetail>,
    },

    GroupRxStarted {
        group_id: GroupId,
    },
    GroupRxEnded {
        group_id: GroupId,
    },
    GroupRxMuted {
        group_id: GroupId,
    },
    GroupRxUnmuted {
        group_id: GroupId,
    },

    GroupTxStarted {
        group_id: GroupId,
        detail: Option<GroupTxDetail>,
    },
    GroupTxEnded {
        group_id: GroupId,
        detail: Option<GroupTxDetail>,
    },
    GroupTxFailed {
        group_id: GroupId,
        detail: Option<GroupTxDetail>,
    },
    GroupTxUsurpedByPriority {
        group_id: GroupId,
        detail: Option<GroupTxDetail>,
    },
    GroupMaxTxTimeExceeded {
        group_id: GroupId,
        detail: Option<GroupTxDetail>,
    },

    NodeDiscovered {
        group_id: GroupId,
        descriptor: PresenceDescriptor,
    },
    NodeRediscovered {
        group_id: GroupId,
        descriptor: PresenceDescriptor,
    },
    NodeUndiscovered {
        group_id: GroupId,
        descriptor: PresenceDescriptor,
    },

    LicenseChanged {
        descriptor: Option<LicenseDescriptor>,
    },
    LicenseExpired,
    LicenseExpiring {
        seconds_left: u64,
    },

    GroupBlobReceived {
        group_id: GroupId,
        info: BlobInfo,
        payload: Vec<u8>,
    },
    GroupTimelineReport {
        group_id: GroupId,
        report_json: String,
    },
    GroupTimelineReportFailed {
        group_id: GroupId,
    },
}

impl EngineEvent {
    /// Validate and type a raw engine report
    ///
    /// Optional details that fail to decode are dropped with a warning; the
    /// event itself still goes through. Presence and blob events without a
    /// decodable body are rejected.
    pub fn decode(raw: RawEngineEvent, now: Timestamp) -> Result<Self, EventDecodeError> {
        let RawEngineEvent {
            kind,
            id,
            json,
            payload,
            seconds_left,
        } = raw;

        let group_id = || -> Result<GroupId, EventDecodeError> {
            id.as_deref()
                .filter(|id| !id.is_empty())
                .map(GroupId::new)
                .ok_or_else(|| EventDecodeError::MissingGroupId { kind: kind.clone() })
        };
        let body = || -> Result<&str, EventDecodeError> {
            json.as_deref().filter(|j| !j.is_empty()).ok_or_else(|| EventDecodeError::MissingPayload {
                kind: kind.clone(),
                what: "JSON body".to_string(),
            })
        };
        let tx_detail = || optional_detail(&kind, json.as_deref(), GroupTxDetail::from_event_json);
        let connection_detail = || optional_detail(&kind, json.as_deref(), ConnectionDetail::from_event_json);
        let presence = || -> Result<PresenceDescriptor, EventDecodeError> {
            PresenceDescriptor::parse(body()?, now).map_err(|e| EventDecodeError::InvalidPayload {
                kind: kind.clone(),
                reason: e.to_string(),
            })
        };

        let event = match kind.as_str() {
            "engineStarted" => EngineEvent::EngineStarted,
            "engineStopped" => EngineEvent::EngineStopped,

            "groupCreated" => EngineEvent::GroupCreated { group_id: group_id()? },
            "groupCreateFailed" => EngineEvent::GroupCreateFailed {
                group_id: group_id()?,
                detail: optional_detail(&kind, json.as_deref(), GroupCreationDetail::from_event_json),
            },
            "groupDeleted" => EngineEvent::GroupDeleted { group_id: group_id()? },

            "groupJoined" => EngineEvent::GroupJoined { group_id: group_id()? },
            "groupJoinFailed" => EngineEvent::GroupJoinFailed { group_id: group_id()? },
            "groupLeft" => EngineEvent::GroupLeft { group_id: group_id()? },

            "groupConnected" => EngineEvent::GroupConnected {
                group_id: group_id()?,
                detail: connection_detail(),
            },
            "groupConnectFailed" => EngineEvent::GroupConnectFailed {
                group_id: group_id()?,
                detail: connection_detail(),
            },
            "groupDisconnected" => EngineEvent::GroupDisconnected {
                group_id: group_id()?,
                detail: connection_detail(),
            },

            "groupRxStarted" => EngineEvent::GroupRxStarted { group_id: group_id()? },
            "groupRxEnded" => EngineEvent::GroupRxEnded { group_id: group_id()? },
            "groupRxMuted" => EngineEvent::GroupRxMuted { group_id: group_id()? },
            "groupRxUnmuted" => EngineEvent::GroupRxUnmuted { group_id: group_id()? },

            "groupTxStarted" => EngineEvent::GroupTxStarted {
                group_id: group_id()?,
                detail: tx_detail(),
            },
            "groupTxEnded" => EngineEvent::GroupTxEnded {
                group_id: group_id()?,
                detail: tx_detail(),
            },
            "groupTxFailed" => EngineEvent::GroupTxFailed {
                group_id: group_id()?,
                detail: tx_detail(),
            },
            "groupTxUsurpedByPriority" => EngineEvent::GroupTxUsurpedByPriority {
                group_id: group_id()?,
                detail: tx_detail(),
            },
            "groupMaxTxTimeExceeded" => EngineEvent::GroupMaxTxTimeExceeded {
                group_id: group_id()?,
                detail: tx_detail(),
            },

            "groupNodeDiscovered" => EngineEvent::NodeDiscovered {
                group_id: group_id()?,
                descriptor: presence()?,
            },
            "groupNodeRediscovered" => EngineEvent::NodeRediscovered {
                group_id: group_id()?,
                descriptor: presence()?,
            },
            "groupNodeUndiscovered" => EngineEvent::NodeUndiscovered {
                group_id: group_id()?,
                descriptor: presence()?,
            },

            "licenseChanged" => EngineEvent::LicenseChanged {
                descriptor: optional_detail(&kind, json.as_deref(), |text| LicenseDescriptor::parse(text).ok()),
            },
            "licenseExpired" => EngineEvent::LicenseExpired,
            "licenseExpiring" => EngineEvent::LicenseExpiring {
                seconds_left: seconds_left.ok_or_else(|| EventDecodeError::MissingPayload {
                    kind: kind.clone(),
                    what: "seconds left".to_string(),
                })?,
            },

            "groupBlobReceived" => {
                let group_id = group_id()?;
                let info = BlobInfo::from_json(body()?).ok_or_else(|| EventDecodeError::InvalidPayload {
                    kind: kind.clone(),
                    reason: "blob header lacks payloadType or source".to_string(),
                })?;
                let payload = payload.ok_or_else(|| EventDecodeError::MissingPayload {
                    kind: kind.clone(),
                    what: "blob payload".to_string(),
                })?;
                EngineEvent::GroupBlobReceived { group_id, info, payload }
            }
            "groupTimelineReport" => EngineEvent::GroupTimelineReport {
                group_id: group_id()?,
                report_json: body()?.to_string(),
            },
            "groupTimelineReportFailed" => EngineEvent::GroupTimelineReportFailed { group_id: group_id()? },

            _ => return Err(EventDecodeError::UnknownKind { kind: kind.clone() }),
        };
        Ok(event)
    }

    /// Wire name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::EngineStarted => "engineStarted",
            EngineEvent::EngineStopped => "engineStopped",
            EngineEvent::GroupCreated { .. } => "groupCreated",
            EngineEvent::GroupCreateFailed { .. } => "groupCreateFailed",
            EngineEvent::GroupDeleted { .. } => "groupDeleted",
            EngineEvent::GroupJoined { .. } => "groupJoined",
            EngineEvent::GroupJoinFailed { .. } => "groupJoinFailed",
            EngineEvent::GroupLeft { .. } => "groupLeft",
            EngineEvent::GroupConnected { .. } => "groupConnected",
            EngineEvent::GroupConnectFailed { .. } => "groupConnectFailed",
            EngineEvent::GroupDisconnected { .. } => "groupDisconnected",
            EngineEvent::GroupRxStarted { .. } => "groupRxStarted",
            EngineEvent::GroupRxEnded { .. } => "groupRxEnded",
            EngineEvent::GroupRxMuted { .. } => "groupRxMuted",
            EngineEvent::GroupRxUnmuted { .. } => "groupRxUnmuted",
            EngineEvent::GroupTxStarted { .. } => "groupTxStarted",
            EngineEvent::GroupTxEnded { .. } => "groupTxEnded",
            EngineEvent::GroupTxFailed { .. } => "groupTxFailed",
            EngineEvent::GroupTxUsurpedByPriority { .. } => "groupTxUsurpedByPriority",
            EngineEvent::GroupMaxTxTimeExceeded { .. } => "groupMaxTxTimeExceeded",
            EngineEvent::NodeDiscovered { .. } => "groupNodeDiscovered",
            EngineEvent::NodeRediscovered { .. } => "groupNodeRediscovered",
            EngineEvent::NodeUndiscovered { .. } => "groupNodeUndiscovered",
            EngineEvent::LicenseChanged { .. } => "licenseChanged",
            EngineEvent::LicenseExpired => "licenseExpired",
            EngineEvent::LicenseExpiring { .. } => "licenseExpiring",
            EngineEvent::GroupBlobReceived { .. } => "groupBlobReceived",
            EngineEvent::GroupTimelineReport { .. } => "groupTimelineReport",
            EngineEvent::GroupTimelineReportFailed { .. } => "groupTimelineReportFailed",
        }
    }

    /// Group the event concerns, if any
    pub fn group_id(&self) -> Option<&GroupId> {
        match self {
            EngineEvent::EngineStarted
            | EngineEvent::EngineStopped
            | EngineEvent::LicenseChanged { .. }
            | EngineEvent::LicenseExpired
            | EngineEvent::LicenseExpiring { .. } => None,
            EngineEvent::GroupCreated { group_id }
            | EngineEvent::GroupCreateFailed { group_id, .. }
            | EngineEvent::GroupDeleted { group_id }
            | EngineEvent::GroupJoined { group_id }
            | EngineEvent::GroupJoinFailed { group_id }
            | EngineEvent::GroupLeft { group_id }
            | EngineEvent::GroupConnected { group_id, .. }
            | EngineEvent::GroupConnectFailed { group_id, .. }
            | EngineEvent::GroupDisconnected { group_id, .. }
            | EngineEvent::GroupRxStarted { group_id }
            | EngineEvent::GroupRxEnded { group_id }
            | EngineEvent::GroupRxMuted { group_id }
            | EngineEvent::GroupRxUnmuted { group_id }
            | EngineEvent::GroupTxStarted { group_id, .. }
            | EngineEvent::GroupTxEnded { group_id, .. }
            | EngineEvent::GroupTxFailed { group_id, .. }
            | EngineEvent::GroupTxUsurpedByPriority { group_id, .. }
            | EngineEvent::GroupMaxTxTimeExceeded { group_id, .. }
            | EngineEvent::NodeDiscovered { group_id, .. }
            | EngineEvent::NodeRediscovered { group_id, .. }
            | EngineEvent::NodeUndiscovered { group_id, .. }
            | EngineEvent::GroupBlobReceived { group_id, .. }
            | EngineEvent::GroupTimelineReport { group_id, .. }
            | EngineEvent::GroupTimelineReportFailed { group_id } => Some(group_id),
        }
    }
}

fn optional_detail<T>(kind: &str, json: Option<&str>, decode: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let text = json.filter(|j| !j.trim().is_empty())?;
    let detail = decode(text);
    if detail.is_none() {
        warn!(kind, "Ignoring undecodable event detail");
    }
    detail
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ConnectionType;

    fn decode(raw: RawEngineEvent) -> Result<EngineEvent, EventDecodeError> {
        EngineEvent::decode(raw, Timestamp::new(5))
    }

    #[test]
    fn test_group_events_require_id() {
        assert!(matches!(
            decode(RawEngineEvent::new("groupJoined")),
            Err(EventDecodeError::MissingGroupId { .. })
        ));
        assert!(matches!(
            decode(RawEngineEvent::new("groupJoined").with_id("")),
            Err(EventDecodeError::MissingGroupId { .. })
        ));
        let event = decode(RawEngineEvent::new("groupJoined").with_id("{g}")).unwrap();
        assert_eq!(event.group_id().map(GroupId::as_str), Some("{g}"));
        assert_eq!(event.kind(), "groupJoined");
    }

    #[test]
    fn test_unknown_kind() {
        assert!(matches!(
            decode(RawEngineEvent::new("groupRtpReceived").with_id("{g}")),
            Err(EventDecodeError::UnknownKind { .. })
        ));
    }

    #[test]
    fn test_connection_detail_is_optional() {
        let with = decode(
            RawEngineEvent::new("groupConnected")
                .with_id("{g}")
                .with_json(r#"{"groupConnectionDetail": {"id": "{g}", "connectionType": 1, "asFailover": false}}"#),
        )
        .unwrap();
        match with {
            EngineEvent::GroupConnected { detail: Some(d), .. } => {
                assert_eq!(d.connection_type, ConnectionType::IpMulticast)
            }
            other => panic!("unexpected {:?}", other),
        }

        let garbled = decode(RawEngineEvent::new("groupDisconnected").with_id("{g}").with_json("{oops")).unwrap();
        assert!(matches!(garbled, EngineEvent::GroupDisconnected { detail: None, .. }));
    }

    #[test]
    fn test_create_failed_detail() {
        let event = decode(
            RawEngineEvent::new("groupCreateFailed")
                .with_id("{g}")
                .with_json(r#"{"groupCreationDetail": {"id": "{g}", "status": -3}}"#),
        )
        .unwrap();
        match event {
            EngineEvent::GroupCreateFailed { detail: Some(d), .. } => assert_eq!(d.status, -3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_presence_events_need_valid_descriptor() {
        assert!(matches!(
            decode(RawEngineEvent::new("groupNodeDiscovered").with_id("{p}")),
            Err(EventDecodeError::MissingPayload { .. })
        ));
        assert!(matches!(
            decode(RawEngineEvent::new("groupNodeDiscovered").with_id("{p}").with_json("{}")),
            Err(EventDecodeError::InvalidPayload { .. })
        ));
        let event = decode(
            RawEngineEvent::new("groupNodeDiscovered")
                .with_id("{p}")
                .with_json(r#"{"identity": {"nodeId": "{n}"}}"#),
        )
        .unwrap();
        match event {
            EngineEvent::NodeDiscovered { descriptor, .. } => {
                assert_eq!(descriptor.node_id.as_str(), "{n}");
                assert_eq!(descriptor.last_update, Timestamp::new(5));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_license_expiring_needs_seconds() {
        assert!(decode(RawEngineEvent::new("licenseExpiring")).is_err());
        assert_eq!(
            decode(RawEngineEvent::new("licenseExpiring").with_seconds_left(60)).unwrap(),
            EngineEvent::LicenseExpiring { seconds_left: 60 }
        );
        assert_eq!(
            decode(RawEngineEvent::new("licenseChanged")).unwrap(),
            EngineEvent::LicenseChanged { descriptor: None }
        );
    }

    #[test]
    fn test_blob_decoding() {
        let raw = RawEngineEvent::new("groupBlobReceived")
            .with_id("{g}")
            .with_json(r#"{"payloadType": 1, "source": "{n}", "target": "{00000000-0000-0000-0000-000000000000}", "size": 2}"#)
            .with_payload(b"hi".to_vec());
        match decode(raw).unwrap() {
            EngineEvent::GroupBlobReceived { info, payload, .. } => {
                assert_eq!(info.payload_type, BlobPayloadType::AppTextUtf8);
                assert!(info.is_for("{me}"));
                assert_eq!(payload, b"hi");
            }
            other => panic!("unexpected {:?}", other),
        }

        let no_payload = RawEngineEvent::new("groupBlobReceived")
            .with_id("{g}")
            .with_json(r#"{"payloadType": 1, "source": "{n}"}"#);
        assert!(matches!(decode(no_payload), Err(EventDecodeError::MissingPayload { .. })));
    }
}
