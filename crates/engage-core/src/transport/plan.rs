//! Transport planning and the final create-group configuration

use crate::config::MulticastFailoverConfig;
use crate::mission::{Endpoint, GroupDescriptor, MissionConfiguration};
use crate::types::GroupType;
use serde_json::{json, Map, Value};

/// Multicast time-to-live requested for plain multicast groups
pub const DEFAULT_NETWORK_TX_TTL: u32 = 64;
/// QoS priority requested for plain multicast groups
pub const DEFAULT_NETWORK_QOS_PRIORITY: u32 = 4;
/// Alias the engine announces for groups that transmit anonymously
pub const ANONYMOUS_ALIAS: &str = "anonymous";

/// How a group will reach the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportPlan {
    Multicast,
    /// Relay configured; the engine runs multicast with relay failover when enabled
    Rallypoint {
        host: Endpoint,
        multicast_failover: MulticastFailoverConfig,
    },
    Unusable,
}

impl TransportPlan {
    /// Decide the transport for `group` under `mission`
    pub fn for_group(
        mission: &MissionConfiguration,
        group: &GroupDescriptor,
        app_failover: MulticastFailoverConfig,
    ) -> Self {
        let mode = group.network_mode;
        let multicast_failover = mission.multicast_failover(app_failover);

        if mode.allows_rallypoint() && mission.use_rp() {
            TransportPlan::Rallypoint {
                host: mission.rallypoint.endpoint(),
                multicast_failover,
            }
        } else if mode.allows_multicast() && group.could_work_without_rallypoint() {
            TransportPlan::Multicast
        } else if let Some(host) = group.first_usable_rallypoint().filter(|_| mode.allows_rallypoint()) {
            TransportPlan::Rallypoint {
                host: host.clone(),
                multicast_failover,
            }
        } else {
            TransportPlan::Unusable
        }
    }

    pub fn is_usable(&self) -> bool {
        !matches!(self, TransportPlan::Unusable)
    }

    pub fn uses_relay(&self) -> bool {
        matches!(self, TransportPlan::Rallypoint { .. })
    }

    /// Build the JSON handed to the engine's create-group call
    ///
    /// Returns `None` when the plan is unusable.
    pub fn build_group_config(&self, group: &GroupDescriptor, user_alias: Option<&str>) -> Option<String> {
        if !self.is_usable() {
            return None;
        }

        let mut config = match group.to_json() {
            Value::Object(object) => object,
            _ => Map::new(),
        };

        if let Some(alias) = user_alias.filter(|a| !a.is_empty()) {
            config.insert("alias".into(), Value::String(alias.to_string()));
        }

        if group.group_type == GroupType::Audio {
            if group.anonymous_alias {
                config.insert("anonymousAlias".into(), Value::String(ANONYMOUS_ALIAS.to_string()));
            } else {
                config.remove("anonymousAlias");
            }
            if group.ept > 0 {
                if let Some(translation) = priority_translation(group) {
                    config.insert("priorityTranslation".into(), translation);
                }
            }
        } else {
            config.remove("anonymousAlias");
        }

        match self {
            TransportPlan::Rallypoint {
                host,
                multicast_failover,
            } => {
                config.insert(
                    "rallypoints".into(),
                    json!([{ "host": { "address": host.address, "port": host.port } }]),
                );
                config.insert(
                    "enableMulticastFailover".into(),
                    Value::Bool(multicast_failover.enabled),
                );
                config.insert(
                    "multicastFailoverSecs".into(),
                    Value::from(multicast_failover.threshold_secs),
                );
            }
            TransportPlan::Multicast => {
                config.insert(
                    "txOptions".into(),
                    json!({ "ttl": DEFAULT_NETWORK_TX_TTL, "priority": DEFAULT_NETWORK_QOS_PRIORITY }),
                );
            }
            TransportPlan::Unusable => {}
        }

        config.insert("timeline".into(), json!({ "enabled": true }));
        Some(Value::Object(config).to_string())
    }
}

/// Emergency priority traffic rides on the group's ports plus one
fn priority_translation(group: &GroupDescriptor) -> Option<Value> {
    let rx = group.rx.as_ref()?;
    let tx = group.tx.as_ref()?;
    Some(json!({
        "priority": group.ept,
        "rx": { "address": rx.address, "port": rx.port.checked_add(1)? },
        "tx": { "address": tx.address, "port": tx.port.checked_add(1)? },
    }))
}
