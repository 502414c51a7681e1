//! Mission-level rallypoint (relay) settings and multicast failover policy

use crate::config::MulticastFailoverConfig;
use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Compiled-in relay address used when a mission does not name one
pub const DEF_RP_ADDRESS: &str = "";
/// Compiled-in relay port used when a mission does not name one
pub const DEF_RP_PORT: u16 = 7443;

// ----------------------------------------------------------------------------
// Endpoint
// ----------------------------------------------------------------------------

/// Network endpoint as carried in rx/tx and rallypoint host objects
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub address: String,
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: u16,
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let port = i64::deserialize(deserializer)?;
    normalize_port(port, "port").map_err(serde::de::Error::custom)
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Non-empty address and a positive port
    pub fn is_usable(&self) -> bool {
        !self.address.is_empty() && self.port > 0
    }
}

// ----------------------------------------------------------------------------
// Rallypoint Usage
// ----------------------------------------------------------------------------

/// Tri-state `use` flag from the mission's rallypoint object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RallypointUse {
    /// Field absent: defer to whether the relay is usable
    #[default]
    Undefined,
    /// Explicit `use: true`
    Use,
    /// Explicit `use: false`
    DontUse,
}

/// Relay endpoint plus the mission's usage preference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RallypointSettings {
    pub address: String,
    pub port: u16,
    pub usage: RallypointUse,
}

impl Default for RallypointSettings {
    fn default() -> Self {
        Self {
            address: DEF_RP_ADDRESS.to_string(),
            port: DEF_RP_PORT,
            usage: RallypointUse::Undefined,
        }
    }
}

impl RallypointSettings {
    pub fn new(address: impl Into<String>, port: u16, usage: RallypointUse) -> Self {
        Self {
            address: address.into(),
            port,
            usage,
        }
    }

    /// Whether a relay could be used at all
    pub fn can_use(&self) -> bool {
        !self.address.is_empty() && self.port > 0
    }

    /// Whether the relay should be used for this mission
    pub fn should_use(&self) -> bool {
        match self.usage {
            RallypointUse::Undefined | RallypointUse::Use => self.can_use(),
            RallypointUse::DontUse => false,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.address.clone(), self.port)
    }

    /// Parse the mission-level `rallypoint` object
    ///
    /// The host fields are read from the object itself first; when either is
    /// missing or mistyped they are read from a nested `host` object. Missing
    /// values fall back to the compiled-in defaults.
    pub fn from_json(object: Option<&Map<String, Value>>) -> Result<Self, ConfigurationError> {
        let mut settings = RallypointSettings {
            address: String::new(),
            port: 0,
            usage: RallypointUse::Undefined,
        };

        if let Some(object) = object {
            let (address, port) = match read_host_fields(object)? {
                Some(found) => Some(found),
                None => match object.get("host").and_then(Value::as_object) {
                    Some(host) => read_host_fields(host)?,
                    None => None,
                },
            }
            .unwrap_or_default();
            settings.address = address;
            settings.port = port;

            if let Some(flag) = object.get("use") {
                settings.usage = match flag.as_bool() {
                    Some(true) => RallypointUse::Use,
                    Some(false) | None => RallypointUse::DontUse,
                };
            }
        }

        Ok(settings)
    }

    /// Apply compiled-in defaults to an empty address or unset port
    pub fn apply_defaults(&mut self) {
        if self.address.is_empty() {
            self.address = DEF_RP_ADDRESS.to_string();
        }
        if self.port == 0 {
            self.port = DEF_RP_PORT;
        }
    }

    /// Whether serialization needs to emit a rallypoint object
    pub fn is_default(&self) -> bool {
        *self == RallypointSettings::default()
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        match self.usage {
            RallypointUse::Use => {
                object.insert("use".into(), Value::Bool(true));
            }
            RallypointUse::DontUse => {
                object.insert("use".into(), Value::Bool(false));
            }
            RallypointUse::Undefined => {}
        }
        object.insert("address".into(), Value::String(self.address.clone()));
        object.insert("port".into(), Value::from(self.port));
        Value::Object(object)
    }
}

/// Read `address` and `port` from an object; `None` when either is absent or mistyped
fn read_host_fields(object: &Map<String, Value>) -> Result<Option<(String, u16)>, ConfigurationError> {
    let address = match object.get("address").and_then(Value::as_str) {
        Some(address) => address.to_string(),
        None => return Ok(None),
    };
    let port = match object.get("port").and_then(Value::as_i64) {
        Some(port) => port,
        None => return Ok(None),
    };
    Ok(Some((address, normalize_port(port, "rallypoint.port")?)))
}

/// Non-positive ports mean "unset"; ports above the IP range are malformed
pub(crate) fn normalize_port(port: i64, field: &str) -> Result<u16, ConfigurationError> {
    if port <= 0 {
        Ok(0)
    } else {
        u16::try_from(port).map_err(|_| ConfigurationError::InvalidField {
            field: field.to_string(),
            reason: format!("port {} is outside the IP port range", port),
        })
    }
}

// ----------------------------------------------------------------------------
// Multicast Failover Policy
// ----------------------------------------------------------------------------

/// Mission-level override of the application's multicast failover setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MulticastFailoverPolicy {
    #[default]
    FollowAppSetting,
    OverrideAndAllow,
    OverrideAndPrevent,
}

impl MulticastFailoverPolicy {
    /// Unknown values follow the application setting
    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => MulticastFailoverPolicy::OverrideAndAllow,
            2 => MulticastFailoverPolicy::OverrideAndPrevent,
            _ => MulticastFailoverPolicy::FollowAppSetting,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            MulticastFailoverPolicy::FollowAppSetting => 0,
            MulticastFailoverPolicy::OverrideAndAllow => 1,
            MulticastFailoverPolicy::OverrideAndPrevent => 2,
        }
    }

    /// Effective failover setting for a mission given the app setting
    pub fn resolve(self, app: MulticastFailoverConfig) -> MulticastFailoverConfig {
        match self {
            MulticastFailoverPolicy::FollowAppSetting => app,
            MulticastFailoverPolicy::OverrideAndAllow => MulticastFailoverConfig {
                enabled: true,
                ..app
            },
            MulticastFailoverPolicy::OverrideAndPrevent => MulticastFailoverConfig {
                enabled: false,
                ..app
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_host_fields_at_root() {
        let obj = object(json!({"address": "rp.example.com", "port": 7444}));
        let rp = RallypointSettings::from_json(Some(&obj)).unwrap();
        assert_eq!(rp.address, "rp.example.com");
        assert_eq!(rp.port, 7444);
        assert_eq!(rp.usage, RallypointUse::Undefined);
        assert!(rp.should_use());
    }

    #[test]
    fn test_host_fields_nested_fallback() {
        let obj = object(json!({"use": false, "host": {"address": "10.0.0.1", "port": 8443}}));
        let rp = RallypointSettings::from_json(Some(&obj)).unwrap();
        assert_eq!(rp.address, "10.0.0.1");
        assert_eq!(rp.port, 8443);
        assert!(rp.can_use());
        assert!(!rp.should_use());
    }

    #[test]
    fn test_mistyped_root_port_falls_back_to_host() {
        let obj = object(json!({"address": "a", "port": "x", "host": {"address": "b", "port": 1}}));
        let rp = RallypointSettings::from_json(Some(&obj)).unwrap();
        assert_eq!(rp.address, "b");
        assert_eq!(rp.port, 1);
    }

    #[test]
    fn test_endpoint_ports_follow_rallypoint_policy() {
        let unset: Endpoint = serde_json::from_value(json!({"address": "239.1.1.1", "port": -5})).unwrap();
        assert_eq!(unset.port, 0);
        assert!(!unset.is_usable());

        let zero: Endpoint = serde_json::from_value(json!({"address": "239.1.1.1", "port": 0})).unwrap();
        assert_eq!(zero, unset);

        let err = serde_json::from_value::<Endpoint>(json!({"address": "239.1.1.1", "port": 70000})).unwrap_err();
        assert!(err.to_string().contains("outside the IP port range"));

        let obj = object(json!({"address": "a", "port": -5}));
        let mut rp = RallypointSettings::from_json(Some(&obj)).unwrap();
        assert_eq!(rp.port, 0);
        rp.apply_defaults();
        assert_eq!(rp.port, DEF_RP_PORT);
    }

    #[test]
    fn test_out_of_range_port_is_error() {
        let obj = object(json!({"address": "a", "port": 70000}));
        assert!(matches!(
            RallypointSettings::from_json(Some(&obj)),
            Err(ConfigurationError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_empty_address_not_usable_even_with_use_flag() {
        let obj = object(json!({"use": true, "address": "", "port": 7443}));
        let mut rp = RallypointSettings::from_json(Some(&obj)).unwrap();
        rp.apply_defaults();
        assert!(!rp.can_use());
        assert!(!rp.should_use());
    }

    #[test]
    fn test_failover_policy_resolution() {
        let app = MulticastFailoverConfig {
            enabled: false,
            threshold_secs: 7,
        };
        assert_eq!(MulticastFailoverPolicy::from_i64(0).resolve(app), app);
        assert!(MulticastFailoverPolicy::from_i64(1).resolve(app).enabled);
        assert!(!MulticastFailoverPolicy::from_i64(2).resolve(app).enabled);
        assert_eq!(MulticastFailoverPolicy::from_i64(9), MulticastFailoverPolicy::FollowAppSetting);
        assert_eq!(MulticastFailoverPolicy::from_i64(1).resolve(app).threshold_secs, 7);
    }
}
