use meshrelay_core::{HOP_LIMIT_DEFAULT, HOP_LIMIT_MAX};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transmissions (initial send included) for packets we originate with `want_ack`.
pub const RELIABLE_RETRIES: u8 = 3;
/// Transmissions (initial send included) for next-hop forwarding by relays.
pub const INTERMEDIATE_RETRIES: u8 = 2;
/// Window after which a broadcast may be flooded again, in milliseconds.
pub const FLOOD_EXPIRE_MS: u32 = 5 * 60 * 1000;
/// Number of broadcast records kept by the seen cache.
pub const SEEN_CAPACITY: usize = 100;

/// Relay behaviour of this node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    #[default]
    Client,
    /// Receives and originates but never relays.
    ClientMute,
    Router,
    Repeater,
}

impl DeviceRole {
    pub fn can_relay(self) -> bool {
        !matches!(self, DeviceRole::ClientMute)
    }
}

/// Which packets the seen cache tracks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupScope {
    /// Only floodable broadcasts.
    #[default]
    BroadcastOnly,
    /// Every packet with a non-zero id, unicast included.
    AllPackets,
}

/// When an ACK or reply may teach us a next hop towards its sender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextHopLearningPolicy {
    /// `known_sender && (relayer_match || direct_reply)`.
    #[default]
    GuardedByRecord,
    /// `(known_sender && relayer_match) || direct_reply`.
    DirectReplyBypassesRecord,
}

impl NextHopLearningPolicy {
    pub fn allows(self, known_sender: bool, relayer_match: bool, direct_reply: bool) -> bool {
        match self {
            NextHopLearningPolicy::GuardedByRecord => {
                known_sender && (relayer_match || direct_reply)
            }
            NextHopLearningPolicy::DirectReplyBypassesRecord => {
                (known_sender && relayer_match) || direct_reply
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("hop limit {0} outside 1..=7")]
    HopLimit(u8),
    #[error("{0} must allow at least one transmission")]
    Retries(&'static str),
    #[error("seen capacity must be non-zero")]
    SeenCapacity,
    #[error("flood expire window must be non-zero")]
    FloodExpire,
}

/// Routing stack configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Hop limit given to ack-requested broadcasts sent with hop limit 0.
    pub hop_limit: u8,
    /// Broadcast record lifetime in milliseconds, measured from last sighting.
    pub flood_expire_ms: u32,
    /// Maximum number of broadcast records.
    pub seen_capacity: usize,
    pub reliable_retries: u8,
    pub intermediate_retries: u8,
    pub role: DeviceRole,
    pub dedup_scope: DedupScope,
    pub learning_policy: NextHopLearningPolicy,
    /// Push back pending retransmissions by the airtime of every packet sent
    /// or heard.
    pub airtime_compensation: bool,
    /// ACKs for ack-requested data addressed to us ask for an ACK in turn.
    pub ack_with_want_ack: bool,
    /// Node numbers whose packets are dropped before routing.
    pub ignore_incoming: Vec<u32>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            hop_limit: HOP_LIMIT_DEFAULT,
            flood_expire_ms: FLOOD_EXPIRE_MS,
            seen_capacity: SEEN_CAPACITY,
            reliable_retries: RELIABLE_RETRIES,
            intermediate_retries: INTERMEDIATE_RETRIES,
            role: DeviceRole::default(),
            dedup_scope: DedupScope::default(),
            learning_policy: NextHopLearningPolicy::default(),
            airtime_compensation: true,
            ack_with_want_ack: false,
            ignore_incoming: Vec::new(),
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=HOP_LIMIT_MAX).contains(&self.hop_limit) {
            return Err(ConfigError::HopLimit(self.hop_limit));
        }
        if self.reliable_retries == 0 {
            return Err(ConfigError::Retries("reliable_retries"));
        }
        if self.intermediate_retries == 0 {
            return Err(ConfigError::Retries("intermediate_retries"));
        }
        if self.seen_capacity == 0 {
            return Err(ConfigError::SeenCapacity);
        }
        if self.flood_expire_ms == 0 {
            return Err(ConfigError::FloodExpire);
        }
        Ok(())
    }

    /// Whether packets from `node` are dropped on arrival.
    pub fn ignores(&self, node: u32) -> bool {
        self.ignore_incoming.contains(&node)
    }
}
