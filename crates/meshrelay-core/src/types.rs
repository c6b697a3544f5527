use std::fmt;

use serde::{Deserialize, Serialize};

/// Sender-scoped message identifier. `0` marks a non-floodable, one-hop packet.
pub type PacketId = u32;

/// Hop limit used when the caller has no preference.
pub const HOP_LIMIT_DEFAULT: u8 = 3;
/// Largest hop limit a packet may carry.
pub const HOP_LIMIT_MAX: u8 = 7;

/// 32-bit identifier of a mesh participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeNum(pub u32);

impl NodeNum {
    /// Destination sentinel for packets addressed to every node.
    pub const BROADCAST: NodeNum = NodeNum(u32::MAX);

    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }

    /// Truncated identity carried in the `relay_node`/`next_hop` header fields.
    pub fn last_byte(self) -> RelayId {
        RelayId((self.0 & 0xFF) as u8)
    }
}

impl fmt::Display for NodeNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "!{:08x}", self.0)
    }
}

impl From<u32> for NodeNum {
    fn from(value: u32) -> Self {
        NodeNum(value)
    }
}

/// Last byte of a node number, as carried in relay/next-hop header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RelayId(pub u8);

impl RelayId {
    /// "No next hop preference": fall back to flooding for this hop.
    pub const NO_PREFERENCE: RelayId = RelayId(0);

    pub fn is_set(self) -> bool {
        self != Self::NO_PREFERENCE
    }
}

impl fmt::Display for RelayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// Network-wide identity of one logical message: `(origin, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalPacketId {
    pub origin: NodeNum,
    pub id: PacketId,
}

impl GlobalPacketId {
    pub fn new(origin: NodeNum, id: PacketId) -> Self {
        Self { origin, id }
    }
}

impl fmt::Display for GlobalPacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/0x{:08x}", self.origin, self.id)
    }
}
