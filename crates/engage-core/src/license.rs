//! Engine license model
//!
//! Credentials are pushed to the engine with an update-license effect. The
//! engine answers with a license descriptor JSON whenever the active license
//! changes, plus expiring/expired notifications.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Credentials handed to the engine
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseCredentials {
    pub entitlement: String,
    pub key: String,
    #[serde(default)]
    pub activation_code: String,
    #[serde(default)]
    pub manufacturer_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LicenseType {
    #[default]
    Unknown,
    Perpetual,
    Expires,
}

impl LicenseType {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => LicenseType::Perpetual,
            2 => LicenseType::Expires,
            _ => LicenseType::Unknown,
        }
    }
}

/// Engine verdict on a license key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LicensingStatusCode {
    Ok,
    NullEntitlementKey,
    NullLicenseKey,
    InvalidLicenseKeyLen,
    LicenseKeyVerificationFailure,
    ActivationCodeVerificationFailure,
    InvalidExpirationDate,
    #[default]
    GeneralFailure,
    NotInitialized,
    RequiresActivation,
}

impl LicensingStatusCode {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Ok,
            -1 => Self::NullEntitlementKey,
            -2 => Self::NullLicenseKey,
            -3 => Self::InvalidLicenseKeyLen,
            -4 => Self::LicenseKeyVerificationFailure,
            -5 => Self::ActivationCodeVerificationFailure,
            -6 => Self::InvalidExpirationDate,
            -8 => Self::NotInitialized,
            -9 => Self::RequiresActivation,
            _ => Self::GeneralFailure,
        }
    }

    /// Usable as-is or pending activation
    pub fn is_acceptable(self) -> bool {
        matches!(self, Self::Ok | Self::RequiresActivation)
    }
}

/// Active license as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LicenseDescriptor {
    pub license_type: LicenseType,
    pub device_id: String,
    pub key: String,
    pub activation_code: String,
    /// Unix seconds; `None` for licenses without an expiry
    pub expires: Option<u64>,
    pub manufacturer_id: Option<String>,
    pub status: LicensingStatusCode,
}

impl LicenseDescriptor {
    /// `type`, `status` and `deviceId` are required
    pub fn parse(text: &str) -> Result<Self, ConfigurationError> {
        let value: Value = serde_json::from_str(text).map_err(|e| ConfigurationError::MalformedJson {
            reason: e.to_string(),
        })?;
        let missing = |field: &str| ConfigurationError::MissingField {
            field: field.to_string(),
            context: "license descriptor".to_string(),
        };

        let license_type = value.get("type").and_then(Value::as_i64).ok_or_else(|| missing("type"))?;
        let status = value.get("status").and_then(Value::as_i64).ok_or_else(|| missing("status"))?;
        let device_id = value
            .get("deviceId")
            .and_then(Value::as_str)
            .ok_or_else(|| missing("deviceId"))?;
        let text_field = |field: &str| value.get(field).and_then(Value::as_str).unwrap_or_default().to_string();

        Ok(Self {
            license_type: LicenseType::from_code(license_type),
            device_id: device_id.to_string(),
            key: text_field("key"),
            activation_code: text_field("activationCode"),
            expires: value
                .get("expires")
                .and_then(Value::as_u64)
                .filter(|secs| *secs > 0),
            manufacturer_id: value
                .get("manufacturerId")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            status: LicensingStatusCode::from_code(status),
        })
    }

    pub fn is_valid(&self) -> bool {
        self.license_type != LicenseType::Unknown
    }

    /// Same device, key and activation code
    pub fn same_credentials(&self, other: &LicenseDescriptor) -> bool {
        self.device_id == other.device_id && self.key == other.key && self.activation_code == other.activation_code
    }
}

/// Session view of the license
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LicenseState {
    pub credentials: Option<LicenseCredentials>,
    pub descriptor: Option<LicenseDescriptor>,
    pub expired: bool,
    pub seconds_left: Option<u64>,
}

impl LicenseState {
    pub fn on_changed(&mut self, descriptor: Option<LicenseDescriptor>) {
        self.descriptor = descriptor;
        self.expired = false;
        self.seconds_left = None;
    }

    pub fn on_expiring(&mut self, seconds_left: u64) {
        self.seconds_left = Some(seconds_left);
    }

    pub fn on_expired(&mut self) {
        self.expired = true;
        self.seconds_left = Some(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_descriptor() {
        let text = r#"{"type": 2, "status": -9, "deviceId": "DEV1", "key": "K", "expires": 1700000000, "manufacturerId": ""}"#;
        let ld = LicenseDescriptor::parse(text).unwrap();
        assert_eq!(ld.license_type, LicenseType::Expires);
        assert_eq!(ld.status, LicensingStatusCode::RequiresActivation);
        assert!(ld.status.is_acceptable());
        assert_eq!(ld.expires, Some(1_700_000_000));
        assert!(ld.manufacturer_id.is_none());
        assert_eq!(ld.activation_code, "");
    }

    #[test]
    fn test_parse_requires_core_fields() {
        assert!(matches!(
            LicenseDescriptor::parse(r#"{"type": 1, "status": 0}"#),
            Err(ConfigurationError::MissingField { .. })
        ));
        assert!(LicenseDescriptor::parse("[").is_err());
    }

    #[test]
    fn test_unknown_status_is_general_failure() {
        assert_eq!(LicensingStatusCode::from_code(-7), LicensingStatusCode::GeneralFailure);
        assert_eq!(LicensingStatusCode::from_code(99), LicensingStatusCode::GeneralFailure);
        assert!(!LicensingStatusCode::GeneralFailure.is_acceptable());
    }

    #[test]
    fn test_license_state_transitions() {
        let mut state = LicenseState::default();
        state.on_expiring(3600);
        assert_eq!(state.seconds_left, Some(3600));
        state.on_expired();
        assert!(state.expired);
        state.on_changed(None);
        assert!(!state.expired);
        assert!(state.seconds_left.is_none());
    }
}
