//! Presence descriptors
//!
//! A presence descriptor is a node's identity and liveness announcement as
//! carried on the presence group. Descriptors are decoded once at the engine
//! boundary and merged in place when a node is rediscovered.

pub mod membership;

pub use membership::{GroupMembershipTracker, MemberStatus};

use crate::errors::ConfigurationError;
use crate::types::{GroupId, NodeId, Timestamp};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

// ----------------------------------------------------------------------------
// Telemetry
// ----------------------------------------------------------------------------

/// Geographic position of a node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub direction: Option<f64>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            speed: None,
            direction: None,
        }
    }

    /// Latitude and longitude within range and no NaN anywhere
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && [self.altitude, self.speed, self.direction]
                .iter()
                .all(|v| v.map_or(true, |v| !v.is_nan()))
    }

    fn from_json(object: &Map<String, Value>) -> Option<Self> {
        let location = Location {
            latitude: object.get("latitude").and_then(Value::as_f64)?,
            longitude: object.get("longitude").and_then(Value::as_f64)?,
            altitude: object.get("altitude").and_then(Value::as_f64),
            speed: object.get("speed").and_then(Value::as_f64),
            direction: object.get("direction").and_then(Value::as_f64),
        };
        location.is_valid().then_some(location)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Power {
    #[serde(default = "unknown_kind")]
    pub source: i32,
    #[serde(default)]
    pub state: i32,
    #[serde(default)]
    pub level: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connectivity {
    #[serde(rename = "type", default = "unknown_kind")]
    pub kind: i32,
    #[serde(default)]
    pub strength: i32,
    #[serde(default)]
    pub rating: i32,
}

fn unknown_kind() -> i32 {
    -1
}

// ----------------------------------------------------------------------------
// Wire Shape
// ----------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityWire {
    node_id: Option<String>,
    user_id: Option<String>,
    display_name: Option<String>,
    #[serde(rename = "type")]
    identity_type: Option<String>,
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupAliasWire {
    group_id: Option<String>,
    #[serde(default)]
    status: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresenceWire {
    #[serde(rename = "self", default)]
    is_self: bool,
    comment: Option<String>,
    custom: Option<String>,
    identity: Option<IdentityWire>,
    location: Option<Value>,
    power: Option<Power>,
    connectivity: Option<Connectivity>,
    #[serde(default)]
    group_aliases: Vec<GroupAliasWire>,
}

// ----------------------------------------------------------------------------
// Presence Descriptor
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceDescriptor {
    pub node_id: NodeId,
    pub is_self: bool,
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub identity_type: Option<String>,
    pub identity_format: Option<String>,
    pub comment: Option<String>,
    pub custom: Option<String>,
    pub location: Option<Location>,
    pub power: Option<Power>,
    pub connectivity: Option<Connectivity>,
    pub memberships: HashMap<GroupId, GroupMembershipTracker>,
    pub last_update: Timestamp,
}

impl PresenceDescriptor {
    pub fn new(node_id: NodeId, last_update: Timestamp) -> Self {
        Self {
            node_id,
            is_self: false,
            user_id: None,
            display_name: None,
            identity_type: None,
            identity_format: None,
            comment: None,
            custom: None,
            location: None,
            power: None,
            connectivity: None,
            memberships: HashMap::new(),
            last_update,
        }
    }

    /// Decode a presence descriptor; the identity node id is required
    pub fn parse(text: &str, now: Timestamp) -> Result<Self, ConfigurationError> {
        let wire: PresenceWire = serde_json::from_str(text).map_err(|e| ConfigurationError::MalformedJson {
            reason: e.to_string(),
        })?;

        let identity = wire.identity.unwrap_or_default();
        let node_id = non_empty(identity.node_id).ok_or_else(|| ConfigurationError::MissingField {
            field: "identity.nodeId".to_string(),
            context: "presence descriptor".to_string(),
        })?;
        let node_id = NodeId::new(node_id);

        let location = match wire.location {
            None | Some(Value::Null) => None,
            Some(value) => {
                let parsed = value.as_object().and_then(Location::from_json);
                if parsed.is_none() {
                    warn!(node_id = %node_id, "Dropping presence location that failed validation");
                }
                parsed
            }
        };

        let memberships = wire
            .group_aliases
            .into_iter()
            .filter_map(|alias| {
                let group_id = GroupId::new(non_empty(alias.group_id)?);
                let tracker = GroupMembershipTracker::new(
                    node_id.clone(),
                    group_id.clone(),
                    MemberStatus::from_bits(alias.status),
                    now,
                );
                Some((group_id, tracker))
            })
            .collect();

        Ok(Self {
            node_id,
            is_self: wire.is_self,
            user_id: non_empty(identity.user_id),
            display_name: non_empty(identity.display_name),
            identity_type: non_empty(identity.identity_type),
            identity_format: non_empty(identity.format),
            comment: non_empty(wire.comment),
            custom: non_empty(wire.custom),
            location,
            power: wire.power,
            connectivity: wire.connectivity,
            memberships,
            last_update: now,
        })
    }

    /// Display name, then user id, then node id
    pub fn friendly_name(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.user_id.as_deref())
            .unwrap_or(self.node_id.as_str())
    }

    /// Merge a rediscovered descriptor into this one
    ///
    /// Fields present in `update` replace ours; absent optional fields keep
    /// their current values. The membership set is replaced wholesale.
    /// Returns `false` without changes when the node ids differ.
    pub fn merge(&mut self, update: PresenceDescriptor) -> bool {
        if self.node_id != update.node_id {
            return false;
        }

        self.is_self = update.is_self;
        merge_field(&mut self.user_id, update.user_id);
        merge_field(&mut self.display_name, update.display_name);
        merge_field(&mut self.identity_type, update.identity_type);
        merge_field(&mut self.identity_format, update.identity_format);
        merge_field(&mut self.comment, update.comment);
        merge_field(&mut self.custom, update.custom);
        merge_field(&mut self.location, update.location);
        merge_field(&mut self.power, update.power);
        merge_field(&mut self.connectivity, update.connectivity);
        self.memberships = update.memberships;
        self.last_update = update.last_update;
        true
    }

    pub fn clear_memberships(&mut self) {
        self.memberships.clear();
    }

    pub fn membership(&self, group_id: &str) -> Option<&GroupMembershipTracker> {
        self.memberships.get(group_id)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

fn merge_field<T>(current: &mut Option<T>, update: Option<T>) {
    if update.is_some() {
        *current = update;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(value: Value) -> PresenceDescriptor {
        PresenceDescriptor::parse(&value.to_string(), Timestamp::new(1_000)).unwrap()
    }

    #[test]
    fn test_parse_full_descriptor() {
        let pd = descriptor(json!({
            "self": true,
            "comment": "on patrol",
            "identity": {"nodeId": "{n1}", "userId": "u@x", "displayName": "Unit 1", "type": "user"},
            "location": {"latitude": 45.5, "longitude": -73.6, "altitude": 30.0},
            "power": {"source": 2, "level": 80},
            "connectivity": {"type": 1, "strength": 3, "rating": 4},
            "groupAliases": [{"groupId": "{g1}", "status": 3}, {"groupId": "", "status": 1}]
        }));
        assert_eq!(pd.node_id.as_str(), "{n1}");
        assert!(pd.is_self);
        assert_eq!(pd.friendly_name(), "Unit 1");
        assert_eq!(pd.location.unwrap().altitude, Some(30.0));
        assert_eq!(pd.power.unwrap().state, 0);
        assert_eq!(pd.memberships.len(), 1);
        assert!(pd.membership("{g1}").unwrap().status.is_connected());
    }

    #[test]
    fn test_identity_type_must_be_string_or_absent() {
        let result = PresenceDescriptor::parse(
            &json!({"identity": {"nodeId": "{n}", "type": 1}}).to_string(),
            Timestamp::ZERO,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_node_id_is_error() {
        let result = PresenceDescriptor::parse(&json!({"identity": {"userId": "u"}}).to_string(), Timestamp::ZERO);
        assert!(matches!(result, Err(ConfigurationError::MissingField { .. })));
        assert!(PresenceDescriptor::parse("{}", Timestamp::ZERO).is_err());
    }

    #[test]
    fn test_invalid_location_is_dropped_not_fatal() {
        let pd = descriptor(json!({
            "identity": {"nodeId": "{n}"},
            "location": {"latitude": 91.0, "longitude": 0.0}
        }));
        assert!(pd.location.is_none());

        let pd = descriptor(json!({
            "identity": {"nodeId": "{n}"},
            "location": {"latitude": 10.0}
        }));
        assert!(pd.location.is_none());
    }

    #[test]
    fn test_friendly_name_fallbacks() {
        let pd = descriptor(json!({"identity": {"nodeId": "{n}", "userId": "user"}}));
        assert_eq!(pd.friendly_name(), "user");
        let pd = descriptor(json!({"identity": {"nodeId": "{n}", "displayName": ""}}));
        assert_eq!(pd.friendly_name(), "{n}");
    }

    #[test]
    fn test_merge_keeps_absent_fields_and_replaces_memberships() {
        let mut pd = descriptor(json!({
            "identity": {"nodeId": "{n}", "displayName": "Old"},
            "location": {"latitude": 1.0, "longitude": 2.0},
            "groupAliases": [{"groupId": "{a}", "status": 1}, {"groupId": "{b}", "status": 1}]
        }));
        let update = descriptor(json!({
            "identity": {"nodeId": "{n}", "userId": "new-user"},
            "groupAliases": [{"groupId": "{c}", "status": 2}]
        }));
        assert!(pd.merge(update));
        assert_eq!(pd.display_name.as_deref(), Some("Old"));
        assert_eq!(pd.user_id.as_deref(), Some("new-user"));
        assert!(pd.location.is_some());
        assert_eq!(pd.memberships.len(), 1);
        assert!(pd.membership("{c}").is_some());

        let other = descriptor(json!({"identity": {"nodeId": "{other}"}}));
        assert!(!pd.merge(other));
        assert_eq!(pd.node_id.as_str(), "{n}");
    }
}
