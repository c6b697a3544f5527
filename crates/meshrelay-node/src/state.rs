use std::collections::HashMap;

use meshrelay_core::ids::PacketIdGenerator;
use meshrelay_core::{GlobalPacketId, MeshPacket, PacketId, RoutingError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::config::RouterConfig;
use crate::pending::PendingPacket;
use crate::seen::SeenCache;

/// Outcome reported to the application layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RouterEvent {
    /// An ack-requested packet we originated was acknowledged.
    Delivered { id: PacketId },
    /// An ack-requested packet we originated failed.
    Failed { id: PacketId, reason: RoutingError },
    /// A packet addressed to us, or a broadcast, was accepted.
    Received(MeshPacket),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    /// Packets handed to `handle_received`.
    pub rx_packets: u64,
    /// Inbound packets dropped as duplicates.
    pub rx_duplicates: u64,
    /// Packets handed to the radio, retransmissions and relays included.
    pub tx_packets: u64,
    /// Packets relayed on behalf of other nodes.
    pub relayed: u64,
    /// Scheduled retransmissions sent.
    pub retransmissions: u64,
    /// Pending packets resolved by overhearing a rebroadcast.
    pub implicit_acks: u64,
    /// ACKs and NAKs generated by this node.
    pub acks_sent: u64,
    pub delivered: u64,
    pub failed: u64,
    /// Radio enqueue failures, reported or not.
    pub send_errors: u64,
    /// Internal bookkeeping inconsistencies recovered from.
    pub invariant_violations: u64,
}

/// Mutable routing state owned by a single router.
#[derive(Debug)]
pub struct RoutingState {
    /// Recently seen packets used for duplicate suppression.
    pub seen: SeenCache,
    /// Packets awaiting acknowledgement, at most one per id.
    pub pending: HashMap<GlobalPacketId, PendingPacket>,
    /// Events not yet drained by the application.
    pub events: Vec<RouterEvent>,
    pub stats: RouterStats,
    ids: PacketIdGenerator,
    rng: StdRng,
}

impl RoutingState {
    pub fn new(config: &RouterConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Builds state drawing packet ids from `rng`.
    pub fn with_rng(config: &RouterConfig, mut rng: StdRng) -> Self {
        Self {
            seen: SeenCache::new(
                config.seen_capacity,
                config.flood_expire_ms,
                config.dedup_scope,
            ),
            pending: HashMap::new(),
            events: Vec::new(),
            stats: RouterStats::default(),
            ids: PacketIdGenerator::new(&mut rng),
            rng,
        }
    }

    pub fn next_packet_id(&mut self) -> PacketId {
        self.ids.next_id(&mut self.rng)
    }

    pub(crate) fn emit(&mut self, event: RouterEvent) {
        match &event {
            RouterEvent::Delivered { .. } => self.stats.delivered += 1,
            RouterEvent::Failed { .. } => self.stats.failed += 1,
            RouterEvent::Received(_) => {}
        }
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use meshrelay_core::RoutingError;

    use super::{RouterEvent, RoutingState};
    use crate::config::RouterConfig;

    #[test]
    fn routing_state_starts_empty() {
        let state = RoutingState::new(&RouterConfig::default());
        assert!(state.seen.is_empty());
        assert!(state.pending.is_empty());
        assert!(state.events.is_empty());
        assert_eq!(state.stats.tx_packets, 0);
    }

    #[test]
    fn emit_counts_outcomes() {
        let mut state = RoutingState::new(&RouterConfig::default());
        state.emit(RouterEvent::Delivered { id: 1 });
        state.emit(RouterEvent::Failed {
            id: 2,
            reason: RoutingError::MaxRetransmit,
        });
        assert_eq!(state.stats.delivered, 1);
        assert_eq!(state.stats.failed, 1);
        assert_eq!(state.events.len(), 2);
    }
}
