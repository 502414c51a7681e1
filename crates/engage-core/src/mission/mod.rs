//! Mission configuration model
//!
//! A mission is the unit of configuration distributed to a fleet of devices:
//! identity, relay settings, failover policy and an ordered list of groups.
//! [`MissionConfiguration::parse`] is the single validating decode step for
//! mission documents; nothing downstream re-reads the raw JSON.

pub mod database;
pub mod group;
pub mod rallypoint;

pub use database::MissionDatabase;
pub use group::{GroupDescriptor, NetworkMode, RallypointEntry, TxAudio};
pub use rallypoint::{
    Endpoint, MulticastFailoverPolicy, RallypointSettings, RallypointUse, DEF_RP_ADDRESS,
    DEF_RP_PORT,
};

use crate::config::MulticastFailoverConfig;
use crate::errors::ConfigurationError;
use crate::types::{generate_braced_id, GroupId, GroupType, UiMode};
use serde_json::{Map, Value};
use tracing::debug;

/// Root keys decoded into typed fields; everything else is carried opaquely
const MODELED_ROOT_KEYS: &[&str] = &[
    "id",
    "name",
    "description",
    "modPin",
    "certStoreId",
    "multicastFailoverPolicy",
    "rallypoint",
    "groups",
];

pub fn generate_mission_id() -> String {
    generate_braced_id()
}

pub fn generate_group_id() -> String {
    generate_braced_id()
}

/// Result of offering a dynamically discovered group to the mission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// Already known as a dynamic group; nothing changed
    Rediscovered,
}

// ----------------------------------------------------------------------------
// Mission Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MissionConfiguration {
    pub id: String,
    pub name: String,
    pub description: String,
    pub mod_pin: String,
    pub cert_store_id: String,
    pub failover_policy: MulticastFailoverPolicy,
    pub rallypoint: RallypointSettings,
    groups: Vec<GroupDescriptor>,
    extra: Map<String, Value>,
}

impl MissionConfiguration {
    /// Create an empty mission
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            mod_pin: String::new(),
            cert_store_id: String::new(),
            failover_policy: MulticastFailoverPolicy::FollowAppSetting,
            rallypoint: RallypointSettings::default(),
            groups: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Decode a mission document
    pub fn parse(text: &str) -> Result<Self, ConfigurationError> {
        let value: Value = serde_json::from_str(text).map_err(|e| ConfigurationError::MalformedJson {
            reason: e.to_string(),
        })?;
        Self::from_json_value(&value)
    }

    /// Decode an already-parsed mission document
    pub fn from_json_value(value: &Value) -> Result<Self, ConfigurationError> {
        let root = value.as_object().ok_or_else(|| ConfigurationError::MalformedJson {
            reason: "mission document is not a JSON object".to_string(),
        })?;

        let id = match root.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                return Err(ConfigurationError::MissingField {
                    field: "id".to_string(),
                    context: "mission".to_string(),
                })
            }
        };

        let mut mission = MissionConfiguration::new(id, optional_string(root, "name")?);
        mission.description = optional_string(root, "description")?;
        mission.mod_pin = optional_string(root, "modPin")?;
        mission.cert_store_id = optional_string(root, "certStoreId")?;
        mission.failover_policy = MulticastFailoverPolicy::from_i64(
            root.get("multicastFailoverPolicy")
                .and_then(Value::as_i64)
                .unwrap_or(0),
        );

        let rallypoint_object = match root.get("rallypoint") {
            None | Some(Value::Null) => None,
            Some(Value::Object(object)) => Some(object),
            Some(_) => {
                return Err(ConfigurationError::InvalidField {
                    field: "rallypoint".to_string(),
                    reason: "expected an object".to_string(),
                })
            }
        };
        mission.rallypoint = RallypointSettings::from_json(rallypoint_object)?;
        mission.rallypoint.apply_defaults();

        match root.get("groups") {
            None | Some(Value::Null) => {}
            Some(Value::Array(groups)) => {
                for group in groups {
                    mission.push_group(GroupDescriptor::from_json(group)?)?;
                }
            }
            Some(_) => {
                return Err(ConfigurationError::InvalidField {
                    field: "groups".to_string(),
                    reason: "expected an array".to_string(),
                })
            }
        }

        if mission.rallypoint.address.is_empty() {
            let fallback = mission
                .groups
                .iter()
                .find_map(|g| g.first_usable_rallypoint().cloned());
            if let Some(host) = fallback {
                debug!(address = %host.address, port = host.port, "Mission relay taken from group rallypoint list");
                mission.rallypoint.address = host.address;
                mission.rallypoint.port = host.port;
            }
        }

        mission.extra = root
            .iter()
            .filter(|(key, _)| !MODELED_ROOT_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(mission)
    }

    /// Encode the mission as a JSON document
    pub fn serialize(&self) -> String {
        self.to_json_value().to_string()
    }

    /// Encode the mission as a JSON value; dynamic groups are not included
    pub fn to_json_value(&self) -> Value {
        let mut root = self.extra.clone();
        root.insert("id".into(), Value::String(self.id.clone()));
        for (key, value) in [
            ("name", &self.name),
            ("description", &self.description),
            ("modPin", &self.mod_pin),
            ("certStoreId", &self.cert_store_id),
        ] {
            if !value.is_empty() {
                root.insert(key.into(), Value::String(value.clone()));
            }
        }
        root.insert(
            "multicastFailoverPolicy".into(),
            Value::from(self.failover_policy.as_i64()),
        );
        if !self.rallypoint.is_default() {
            root.insert("rallypoint".into(), self.rallypoint.to_json());
        }
        root.insert(
            "groups".into(),
            Value::Array(self.static_groups().map(GroupDescriptor::to_json).collect()),
        );
        Value::Object(root)
    }

    /// Compare every modeled field, ignoring runtime selection flags
    pub fn same_definition(&self, other: &MissionConfiguration) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.description == other.description
            && self.mod_pin == other.mod_pin
            && self.cert_store_id == other.cert_store_id
            && self.failover_policy == other.failover_policy
            && self.rallypoint == other.rallypoint
            && self.extra == other.extra
            && self.groups.len() == other.groups.len()
            && self
                .groups
                .iter()
                .zip(other.groups.iter())
                .all(|(a, b)| a.same_definition(b))
    }

    // ---- Relay and Failover ----

    pub fn can_use_rp(&self) -> bool {
        self.rallypoint.can_use()
    }

    pub fn use_rp(&self) -> bool {
        self.rallypoint.should_use()
    }

    pub fn multicast_failover(&self, app_setting: MulticastFailoverConfig) -> MulticastFailoverConfig {
        self.failover_policy.resolve(app_setting)
    }

    pub fn could_all_groups_work_without_rallypoint(&self) -> bool {
        self.groups
            .iter()
            .all(GroupDescriptor::could_work_without_rallypoint)
    }

    // ---- Group Access ----

    pub fn groups(&self) -> &[GroupDescriptor] {
        &self.groups
    }

    pub fn static_groups(&self) -> impl Iterator<Item = &GroupDescriptor> {
        self.groups.iter().filter(|g| !g.dynamic)
    }

    pub fn group(&self, id: &str) -> Option<&GroupDescriptor> {
        self.groups.iter().find(|g| g.id.as_str() == id)
    }

    pub fn group_mut(&mut self, id: &str) -> Option<&mut GroupDescriptor> {
        self.groups.iter_mut().find(|g| g.id.as_str() == id)
    }

    pub fn groups_of_type(&self, group_type: GroupType) -> impl Iterator<Item = &GroupDescriptor> {
        self.groups.iter().filter(move |g| g.group_type == group_type)
    }

    pub fn presence_group(&self) -> Option<&GroupDescriptor> {
        self.groups_of_type(GroupType::Presence).next()
    }

    /// Append a statically configured group
    pub fn push_group(&mut self, group: GroupDescriptor) -> Result<(), ConfigurationError> {
        if self.group(group.id.as_str()).is_some() {
            return Err(ConfigurationError::DuplicateGroup {
                group_id: group.id.to_string(),
            });
        }
        self.groups.push(group);
        Ok(())
    }

    /// Offer a group discovered at runtime
    pub fn add_dynamic_group(&mut self, mut group: GroupDescriptor) -> Result<AddOutcome, ConfigurationError> {
        match self.group(group.id.as_str()) {
            Some(existing) if existing.dynamic => Ok(AddOutcome::Rediscovered),
            Some(_) => Err(ConfigurationError::StaticGroupCollision {
                group_id: group.id.to_string(),
            }),
            None => {
                group.dynamic = true;
                self.groups.push(group);
                Ok(AddOutcome::Added)
            }
        }
    }

    // ---- Selection ----

    /// Audio groups the user is looking at under the given UI mode
    pub fn selected_groups(&self, ui_mode: UiMode) -> Vec<&GroupDescriptor> {
        match ui_mode {
            UiMode::Single => self
                .groups
                .iter()
                .find(|g| g.selected_for_single_view)
                .into_iter()
                .collect(),
            UiMode::Multi => self
                .groups
                .iter()
                .filter(|g| g.selected_for_multi_view)
                .collect(),
        }
    }

    /// Groups that should be joined: presence and raw groups always, audio per selection
    pub fn ids_of_selected_groups(&self, ui_mode: UiMode) -> Vec<GroupId> {
        let selected_audio: Vec<&GroupId> = self
            .selected_groups(ui_mode)
            .into_iter()
            .filter(|g| g.group_type == GroupType::Audio)
            .map(|g| &g.id)
            .collect();

        self.groups
            .iter()
            .filter(|g| match g.group_type {
                GroupType::Presence | GroupType::Raw => true,
                GroupType::Audio => selected_audio.contains(&&g.id),
                GroupType::Unknown => false,
            })
            .map(|g| g.id.clone())
            .collect()
    }

    /// Make `id` the only group selected for single view
    pub fn select_for_single_view(&mut self, id: &str) -> bool {
        if self.group(id).is_none() {
            return false;
        }
        for group in &mut self.groups {
            group.selected_for_single_view = group.id.as_str() == id;
        }
        true
    }

    pub fn set_selected_for_multi_view(&mut self, id: &str, selected: bool) -> bool {
        match self.group_mut(id) {
            Some(group) => {
                group.selected_for_multi_view = selected;
                true
            }
            None => false,
        }
    }

    pub fn set_tx_selected(&mut self, id: &str, selected: bool) -> bool {
        match self.group_mut(id) {
            Some(group) => {
                group.tx_selected = selected;
                true
            }
            None => false,
        }
    }

    // ---- Templates ----

    /// A fresh mission with a presence group and two audio groups
    pub fn sample(name: impl Into<String>) -> Self {
        let mut mission = MissionConfiguration::new(generate_mission_id(), name);
        mission.description = "Generated mission".to_string();

        let password = || uuid::Uuid::new_v4().simple().to_string().to_uppercase();

        let mut groups = vec![GroupDescriptor::new(generate_group_id(), GroupType::Presence, "Presence")
            .with_multicast("239.42.43.1", 49_000)
            .with_crypto_password(password())];
        for (index, name) in ["Alpha", "Bravo"].iter().enumerate() {
            let port = 49_002 + (index as u16) * 2;
            groups.push(
                GroupDescriptor::new(generate_group_id(), GroupType::Audio, *name)
                    .with_multicast(format!("239.42.43.{}", index + 2), port)
                    .with_crypto_password(password())
                    .with_tx_audio(TxAudio::default()),
            );
        }

        for group in groups {
            // ids are freshly generated, so pushes cannot collide
            let _ = mission.push_group(group);
        }
        let first_audio = mission.groups_of_type(GroupType::Audio).next().map(|g| g.id.clone());
        if let Some(group_id) = first_audio {
            mission.select_for_single_view(group_id.as_str());
        }
        mission
    }
}

fn optional_string(root: &Map<String, Value>, key: &str) -> Result<String, ConfigurationError> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ConfigurationError::InvalidField {
            field: key.to_string(),
            reason: "expected a string".to_string(),
        }),
    }
}
