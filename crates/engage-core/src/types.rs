//! Core types for the Engage core
//!
//! This module defines the fundamental identifiers and time types used
//! throughout the crate, using newtype patterns for type safety.

use core::fmt;
use core::ops::{Add, Sub};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

// ----------------------------------------------------------------------------
// Identifiers
// ----------------------------------------------------------------------------

/// Identifier of a communication group, unique across static and dynamic groups
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for GroupId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for GroupId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Identifier of a network node as announced by its presence descriptor
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Generate an identifier in the braced UUID form used for missions, groups and nodes
pub fn generate_braced_id() -> String {
    format!("{{{}}}", uuid::Uuid::new_v4())
}

// ----------------------------------------------------------------------------
// Group Type and UI Mode
// ----------------------------------------------------------------------------

/// Kind of traffic a group carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GroupType {
    #[default]
    Unknown,
    Audio,
    Presence,
    Raw,
}

impl GroupType {
    /// Map a wire ordinal to a group type
    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        match ordinal {
            0 => Some(GroupType::Unknown),
            1 => Some(GroupType::Audio),
            2 => Some(GroupType::Presence),
            3 => Some(GroupType::Raw),
            _ => None,
        }
    }

    pub fn ordinal(self) -> i64 {
        match self {
            GroupType::Unknown => 0,
            GroupType::Audio => 1,
            GroupType::Presence => 2,
            GroupType::Raw => 3,
        }
    }
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupType::Unknown => write!(f, "Unknown"),
            GroupType::Audio => write!(f, "Audio"),
            GroupType::Presence => write!(f, "Presence"),
            GroupType::Raw => write!(f, "Raw"),
        }
    }
}

/// How the client presents audio groups, which drives group selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiMode {
    /// One audio group visible and transmitted on at a time
    #[default]
    Single,
    /// Several audio groups visible, each individually tx-selectable
    Multi,
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Self = Self(0);

    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        SystemTimeSource.now()
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`, saturating at zero
    pub fn duration_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<u64> for Timestamp {
    type Output = Timestamp;

    fn add(self, millis: u64) -> Self::Output {
        Timestamp(self.0.saturating_add(millis))
    }
}

impl Sub for Timestamp {
    type Output = u64;

    fn sub(self, other: Timestamp) -> Self::Output {
        self.0.saturating_sub(other.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// ----------------------------------------------------------------------------
// Time Sources
// ----------------------------------------------------------------------------

/// Source of the current time, injectable for deterministic tests
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time source
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        )
    }
}

/// Manually advanced time source; clones share the same clock
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    millis: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(start.as_millis())),
        }
    }

    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, at: Timestamp) {
        self.millis.store(at.as_millis(), Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.millis.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_type_ordinals() {
        for ordinal in 0..=3 {
            let ty = GroupType::from_ordinal(ordinal).unwrap();
            assert_eq!(ty.ordinal(), ordinal);
        }
        assert_eq!(GroupType::from_ordinal(4), None);
        assert_eq!(GroupType::from_ordinal(-1), None);
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let t = Timestamp::new(1_000);
        assert_eq!((t + 500).as_millis(), 1_500);
        assert_eq!(Timestamp::new(1_500) - t, 500);
        assert_eq!(t - Timestamp::new(1_500), 0);
        assert_eq!(Timestamp::new(3_000).duration_since(t), 2_000);
    }

    #[test]
    fn test_manual_time_source_shared_clock() {
        let clock = ManualTimeSource::new(Timestamp::new(10));
        let other = clock.clone();
        clock.advance(90);
        assert_eq!(other.now(), Timestamp::new(100));
        other.set(Timestamp::new(5));
        assert_eq!(clock.now(), Timestamp::new(5));
    }

    #[test]
    fn test_braced_id_shape() {
        let id = generate_braced_id();
        assert!(id.starts_with('{') && id.ends_with('}'));
        assert_eq!(id.len(), 38);
    }
}
