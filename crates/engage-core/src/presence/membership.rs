//! Per-group membership of a presence node

use crate::types::{GroupId, NodeId, Timestamp};
use core::fmt;
use core::ops::{BitOr, BitOrAssign};
use serde::{Deserialize, Serialize};

/// Membership status bits announced in a node's group alias list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberStatus(u32);

impl MemberStatus {
    pub const NONE: Self = Self(0);
    pub const JOINED: Self = Self(0x1);
    pub const CONNECTED: Self = Self(0x2);
    pub const RX_MUTED: Self = Self(0x4);
    pub const TX_MUTED: Self = Self(0x8);

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: MemberStatus) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_joined(self) -> bool {
        self.contains(Self::JOINED)
    }

    pub fn is_connected(self) -> bool {
        self.contains(Self::CONNECTED)
    }
}

impl BitOr for MemberStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MemberStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        for (flag, name) in [
            (Self::JOINED, "joined"),
            (Self::CONNECTED, "connected"),
            (Self::RX_MUTED, "rx-muted"),
            (Self::TX_MUTED, "tx-muted"),
        ] {
            if self.contains(flag) {
                names.push(name);
            }
        }
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// One node's membership in one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembershipTracker {
    pub node_id: NodeId,
    pub group_id: GroupId,
    pub status: MemberStatus,
    pub last_seen: Timestamp,
}

impl GroupMembershipTracker {
    pub fn new(node_id: NodeId, group_id: GroupId, status: MemberStatus, last_seen: Timestamp) -> Self {
        Self {
            node_id,
            group_id,
            status,
            last_seen,
        }
    }
}
