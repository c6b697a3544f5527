//! Inbound stage pipeline.
//!
//! Every inbound packet is offered to each stage's `filter` in order
//! (reliable, next hop, flooding); the first veto drops it. Accepted packets
//! are then shown to every stage's `observe`.

use meshrelay_core::{MeshPacket, NodeNum, PacketId, RelayId, SendError};
use meshrelay_transport::{NodeDatabase, PacketHistory, RadioTransport};
use serde::Serialize;
use tracing::debug;

use crate::config::RouterConfig;
use crate::flooding::FloodingStage;
use crate::next_hop::NextHopStage;
use crate::reliable::ReliableStage;
use crate::state::RoutingState;

/// Why an inbound packet was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DropReason {
    /// Seen within the flood-expire window.
    Duplicate,
    /// Duplicate of a packet for which we are the designated next hop.
    DuplicateAsNextHop,
    /// Claims to originate from the broadcast address.
    FromBroadcast,
    /// Sender is on the ignore list.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Pass,
    Drop(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InboundOutcome {
    Accepted,
    Filtered(DropReason),
}

/// Borrowed view of a router used by every layer for one operation.
pub struct RouterContext<'a> {
    pub state: &'a mut RoutingState,
    pub config: &'a RouterConfig,
    pub radio: &'a mut dyn RadioTransport,
    pub node_db: &'a mut dyn NodeDatabase,
    pub history: &'a mut dyn PacketHistory,
    pub now_ms: u32,
    duplicate: Option<bool>,
}

impl<'a> RouterContext<'a> {
    pub fn new(
        state: &'a mut RoutingState,
        config: &'a RouterConfig,
        radio: &'a mut dyn RadioTransport,
        node_db: &'a mut dyn NodeDatabase,
        history: &'a mut dyn PacketHistory,
        now_ms: u32,
    ) -> Self {
        Self {
            state,
            config,
            radio,
            node_db,
            history,
            now_ms,
            duplicate: None,
        }
    }

    pub fn self_node(&self) -> NodeNum {
        self.node_db.self_node()
    }

    pub fn self_relay(&self) -> RelayId {
        self.node_db.self_last_byte()
    }

    pub fn next_packet_id(&mut self) -> PacketId {
        self.state.next_packet_id()
    }

    /// Seen-cache verdict for the inbound packet being processed.
    ///
    /// The cache is consulted once per context; later calls return the same
    /// verdict without touching it again.
    pub fn is_duplicate(&mut self, packet: &MeshPacket) -> bool {
        match self.duplicate {
            Some(verdict) => verdict,
            None => {
                let verdict = self.state.seen.was_seen_recently(packet, self.now_ms);
                self.duplicate = Some(verdict);
                verdict
            }
        }
    }

    /// Hands `packet` to the radio and keeps the transmit counters.
    pub fn transmit(&mut self, packet: MeshPacket) -> Result<(), SendError> {
        let from = packet.from;
        let id = packet.id;
        match self.radio.send(packet) {
            Ok(()) => {
                self.state.stats.tx_packets += 1;
                Ok(())
            }
            Err(err) => {
                self.state.stats.send_errors += 1;
                debug!(from = %from, id, error = %err, "radio rejected packet");
                Err(err)
            }
        }
    }
}

/// One layer of the inbound pipeline.
pub trait Stage {
    fn name(&self) -> &'static str;

    /// Decides whether `packet` continues through the pipeline.
    fn filter(&self, ctx: &mut RouterContext<'_>, packet: &MeshPacket) -> FilterDecision;

    /// Reacts to an accepted packet.
    fn observe(&self, ctx: &mut RouterContext<'_>, packet: &MeshPacket);
}

const PIPELINE: [&dyn Stage; 3] = [&ReliableStage, &NextHopStage, &FloodingStage];

/// Runs `packet` through every stage.
pub fn run_pipeline(ctx: &mut RouterContext<'_>, packet: &MeshPacket) -> InboundOutcome {
    for stage in PIPELINE {
        if let FilterDecision::Drop(reason) = stage.filter(ctx, packet) {
            debug!(
                stage = stage.name(),
                from = %packet.from,
                id = packet.id,
                ?reason,
                "inbound packet filtered"
            );
            return InboundOutcome::Filtered(reason);
        }
    }
    for stage in PIPELINE {
        stage.observe(ctx, packet);
    }
    InboundOutcome::Accepted
}

#[cfg(test)]
mod tests {
    use super::{run_pipeline, DropReason, InboundOutcome};
    use crate::test_support::{broadcast, Harness};

    #[test]
    fn dedup_verdict_is_memoized_per_context() {
        let mut h = Harness::default();
        let packet = broadcast(100, 5, 3);
        let mut ctx = h.ctx(0);
        assert!(!ctx.is_duplicate(&packet));
        // The first call recorded the packet; the verdict must not flip.
        assert!(!ctx.is_duplicate(&packet));
        drop(ctx);
        assert!(h.ctx(10).is_duplicate(&packet));
    }

    #[test]
    fn pipeline_accepts_then_filters_repeat() {
        let mut h = Harness::default();
        let packet = broadcast(100, 5, 3);
        assert_eq!(run_pipeline(&mut h.ctx(0), &packet), InboundOutcome::Accepted);
        assert_eq!(
            run_pipeline(&mut h.ctx(5), &packet),
            InboundOutcome::Filtered(DropReason::Duplicate)
        );
        assert_eq!(h.radio.queued_len(), 1);
    }
}
