//! Group descriptors: the static, per-channel part of a mission
//!
//! A descriptor is decoded once from its JSON object and keeps every field it
//! does not model in an opaque map so the group can be written back without
//! losing vendor extensions.

use super::rallypoint::Endpoint;
use crate::errors::ConfigurationError;
use crate::types::{GroupId, GroupType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_ENCODER: i32 = 25;
pub const DEFAULT_TX_FRAMING_MS: i32 = 60;
pub const DEFAULT_TX_SECS: i32 = 120;
pub const UNLIMITED_TX_SECS: i32 = 86_400;

// ----------------------------------------------------------------------------
// Wire Sub-objects
// ----------------------------------------------------------------------------

/// The `txAudio` object of an audio group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxAudio {
    #[serde(default = "default_encoder")]
    pub encoder: i32,
    #[serde(default = "default_framing_ms")]
    pub framing_ms: i32,
    #[serde(default)]
    pub fdx: bool,
    #[serde(default = "default_max_tx_secs")]
    pub max_tx_secs: i32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for TxAudio {
    fn default() -> Self {
        Self {
            encoder: DEFAULT_ENCODER,
            framing_ms: DEFAULT_TX_FRAMING_MS,
            fdx: false,
            max_tx_secs: DEFAULT_TX_SECS,
            extra: Map::new(),
        }
    }
}

fn default_encoder() -> i32 {
    DEFAULT_ENCODER
}

fn default_framing_ms() -> i32 {
    DEFAULT_TX_FRAMING_MS
}

fn default_max_tx_secs() -> i32 {
    DEFAULT_TX_SECS
}

/// One entry of a group's `rallypoints` array
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RallypointEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<Endpoint>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Which transports a group may use regardless of mission relay settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NetworkMode {
    #[default]
    #[serde(alias = "nothingSpecial")]
    Default,
    MulticastOnly,
    RallypointOnly,
}

impl NetworkMode {
    pub fn allows_multicast(self) -> bool {
        matches!(self, NetworkMode::Default | NetworkMode::MulticastOnly)
    }

    pub fn allows_rallypoint(self) -> bool {
        matches!(self, NetworkMode::Default | NetworkMode::RallypointOnly)
    }

    pub fn is_default(&self) -> bool {
        *self == NetworkMode::Default
    }
}

/// Serde shape of a group object
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupWire {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default)]
    group_type: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    crypto_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rx: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tx: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tx_audio: Option<TxAudio>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    rallypoints: Vec<RallypointEntry>,
    #[serde(default)]
    ept: i32,
    #[serde(default)]
    anonymous_alias: bool,
    #[serde(default, skip_serializing_if = "NetworkMode::is_default")]
    network_mode: NetworkMode,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

// ----------------------------------------------------------------------------
// Group Descriptor
// ----------------------------------------------------------------------------

/// One communication channel of a mission
#[derive(Debug, Clone, PartialEq)]
pub struct GroupDescriptor {
    pub id: GroupId,
    pub group_type: GroupType,
    pub name: String,
    pub crypto_password: Option<String>,
    pub rx: Option<Endpoint>,
    pub tx: Option<Endpoint>,
    pub tx_audio: Option<TxAudio>,
    pub rallypoints: Vec<RallypointEntry>,
    /// Emergency priority translation level, zero when disabled
    pub ept: i32,
    pub anonymous_alias: bool,
    /// Added at runtime by discovery rather than by the mission document
    pub dynamic: bool,
    pub network_mode: NetworkMode,
    pub selected_for_single_view: bool,
    pub selected_for_multi_view: bool,
    pub tx_selected: bool,
    extra: Map<String, Value>,
}

impl GroupDescriptor {
    /// Create a descriptor with no endpoints
    pub fn new(id: impl Into<GroupId>, group_type: GroupType, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            group_type,
            name: name.into(),
            crypto_password: None,
            rx: None,
            tx: None,
            tx_audio: None,
            rallypoints: Vec::new(),
            ept: 0,
            anonymous_alias: false,
            dynamic: false,
            network_mode: NetworkMode::Default,
            selected_for_single_view: false,
            selected_for_multi_view: false,
            tx_selected: false,
            extra: Map::new(),
        }
    }

    /// Builder-style setter for symmetric rx/tx multicast endpoints
    pub fn with_multicast(mut self, address: impl Into<String>, port: u16) -> Self {
        let endpoint = Endpoint::new(address, port);
        self.rx = Some(endpoint.clone());
        self.tx = Some(endpoint);
        self
    }

    pub fn with_crypto_password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.crypto_password = if password.is_empty() { None } else { Some(password) };
        self
    }

    pub fn with_tx_audio(mut self, tx_audio: TxAudio) -> Self {
        self.tx_audio = Some(tx_audio);
        self
    }

    pub fn with_network_mode(mut self, mode: NetworkMode) -> Self {
        self.network_mode = mode;
        self
    }

    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Decode a group from its JSON object
    pub fn from_json(value: &Value) -> Result<Self, ConfigurationError> {
        let wire: GroupWire =
            serde_json::from_value(value.clone()).map_err(|e| ConfigurationError::InvalidField {
                field: "groups".to_string(),
                reason: e.to_string(),
            })?;

        let id = match wire.id {
            Some(id) if !id.is_empty() => GroupId::new(id),
            _ => {
                return Err(ConfigurationError::MissingField {
                    field: "id".to_string(),
                    context: "group".to_string(),
                })
            }
        };

        let group_type = GroupType::from_ordinal(wire.group_type).ok_or_else(|| {
            ConfigurationError::UnknownGroupType {
                group_id: id.to_string(),
                ordinal: wire.group_type,
            }
        })?;

        Ok(Self {
            id,
            group_type,
            name: wire.name,
            crypto_password: wire.crypto_password.filter(|p| !p.is_empty()),
            rx: wire.rx,
            tx: wire.tx,
            tx_audio: wire.tx_audio,
            rallypoints: wire.rallypoints,
            ept: wire.ept,
            anonymous_alias: wire.anonymous_alias,
            dynamic: false,
            network_mode: wire.network_mode,
            selected_for_single_view: false,
            selected_for_multi_view: false,
            tx_selected: false,
            extra: wire.extra,
        })
    }

    /// Encode the group as its JSON object, preserving unmodeled fields
    pub fn to_json(&self) -> Value {
        let wire = GroupWire {
            id: Some(self.id.to_string()),
            group_type: self.group_type.ordinal(),
            name: self.name.clone(),
            crypto_password: self.crypto_password.clone(),
            rx: self.rx.clone(),
            tx: self.tx.clone(),
            tx_audio: self.tx_audio.clone(),
            rallypoints: self.rallypoints.clone(),
            ept: self.ept,
            anonymous_alias: self.anonymous_alias,
            network_mode: self.network_mode,
            extra: self.extra.clone(),
        };
        serde_json::to_value(wire).unwrap_or(Value::Null)
    }

    pub fn is_encrypted(&self) -> bool {
        self.crypto_password.is_some()
    }

    /// Full duplex audio
    pub fn is_fdx(&self) -> bool {
        self.tx_audio.as_ref().is_some_and(|t| t.fdx)
    }

    /// Whether both rx and tx endpoints are usable for plain multicast
    pub fn could_work_without_rallypoint(&self) -> bool {
        self.rx.as_ref().is_some_and(Endpoint::is_usable)
            && self.tx.as_ref().is_some_and(Endpoint::is_usable)
    }

    /// First usable host in the group's own rallypoint list
    pub fn first_usable_rallypoint(&self) -> Option<&Endpoint> {
        self.rallypoints
            .iter()
            .filter_map(|entry| entry.host.as_ref())
            .find(|host| host.is_usable())
    }

    /// Unmodeled JSON fields carried through verbatim
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Compare the fields a mission document carries, ignoring runtime selection
    pub fn same_definition(&self, other: &GroupDescriptor) -> bool {
        self.id == other.id
            && self.group_type == other.group_type
            && self.name == other.name
            && self.crypto_password == other.crypto_password
            && self.rx == other.rx
            && self.tx == other.tx
            && self.tx_audio == other.tx_audio
            && self.rallypoints == other.rallypoints
            && self.ept == other.ept
            && self.anonymous_alias == other.anonymous_alias
            && self.network_mode == other.network_mode
            && self.extra == other.extra
    }
}
