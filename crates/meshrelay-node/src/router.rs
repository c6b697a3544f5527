use meshrelay_core::{MeshPacket, NodeNum, SendError};
use meshrelay_transport::{NodeDatabase, PacketHistory, RadioTransport};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::config::{ConfigError, RouterConfig};
use crate::reliable;
use crate::retransmit;
use crate::stage::{self, DropReason, InboundOutcome, RouterContext};
use crate::state::{RouterEvent, RouterStats, RoutingState};

/// Routing stack of one node.
///
/// Owns the routing state and its collaborators. Driven by the caller
/// through [`Router::send`], [`Router::handle_received`] and
/// [`Router::tick`]; outcomes are collected with [`Router::drain_events`].
pub struct Router<R, N, H> {
    config: RouterConfig,
    state: RoutingState,
    radio: R,
    node_db: N,
    history: H,
}

impl<R, N, H> Router<R, N, H>
where
    R: RadioTransport,
    N: NodeDatabase,
    H: PacketHistory,
{
    pub fn new(config: RouterConfig, radio: R, node_db: N, history: H) -> Result<Self, ConfigError> {
        Self::with_rng(config, radio, node_db, history, StdRng::from_entropy())
    }

    /// Builds a router with a deterministic packet id sequence.
    pub fn with_seed(
        config: RouterConfig,
        radio: R,
        node_db: N,
        history: H,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        Self::with_rng(config, radio, node_db, history, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        config: RouterConfig,
        radio: R,
        node_db: N,
        history: H,
        rng: StdRng,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        debug!(node = %node_db.self_node(), role = ?config.role, "router ready");
        Ok(Self {
            state: RoutingState::with_rng(&config, rng),
            config,
            radio,
            node_db,
            history,
        })
    }

    fn ctx(&mut self, now_ms: u32) -> RouterContext<'_> {
        RouterContext::new(
            &mut self.state,
            &self.config,
            &mut self.radio,
            &mut self.node_db,
            &mut self.history,
            now_ms,
        )
    }

    pub fn self_node(&self) -> NodeNum {
        self.node_db.self_node()
    }

    /// Allocates a packet from us with a fresh id and the configured hop limit.
    pub fn alloc_for_sending(&mut self, to: NodeNum, payload: impl Into<Vec<u8>>) -> MeshPacket {
        let id = self.state.next_packet_id();
        MeshPacket::new(self.self_node(), to, id, self.config.hop_limit).with_payload(payload)
    }

    /// Sends `packet`, stamping us as originator when `from` is unset.
    ///
    /// Packets addressed to ourselves are delivered locally.
    pub fn send(&mut self, mut packet: MeshPacket, now_ms: u32) -> Result<(), SendError> {
        let self_node = self.self_node();
        if packet.from.0 == 0 {
            packet.from = self_node;
        }
        if packet.to == self_node {
            debug!(id = packet.id, "delivering to self");
            self.state.emit(RouterEvent::Received(packet));
            return Ok(());
        }
        reliable::send(&mut self.ctx(now_ms), packet)
    }

    /// Runs a packet heard on the radio through the routing stack.
    pub fn handle_received(&mut self, packet: MeshPacket, now_ms: u32) -> InboundOutcome {
        self.state.stats.rx_packets += 1;
        let self_node = self.self_node();

        let rejected = if packet.from.is_broadcast() {
            Some(DropReason::FromBroadcast)
        } else if self.config.ignores(packet.from.0) {
            Some(DropReason::Ignored)
        } else {
            None
        };
        if let Some(reason) = rejected {
            debug!(from = %packet.from, id = packet.id, ?reason, "inbound packet rejected");
            return InboundOutcome::Filtered(reason);
        }

        let outcome = stage::run_pipeline(&mut self.ctx(now_ms), &packet);
        match outcome {
            InboundOutcome::Filtered(DropReason::Duplicate | DropReason::DuplicateAsNextHop) => {
                self.state.stats.rx_duplicates += 1;
            }
            InboundOutcome::Accepted
                if packet.from != self_node && (packet.to == self_node || packet.is_broadcast()) =>
            {
                self.state.emit(RouterEvent::Received(packet));
            }
            _ => {}
        }
        outcome
    }

    /// Fires due retransmissions. Returns the delay until the next tick is needed.
    pub fn tick(&mut self, now_ms: u32) -> Option<u32> {
        retransmit::tick(&mut self.ctx(now_ms))
    }

    pub fn drain_events(&mut self) -> Vec<RouterEvent> {
        std::mem::take(&mut self.state.events)
    }

    pub fn stats(&self) -> RouterStats {
        self.state.stats
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn pending_count(&self) -> usize {
        self.state.pending.len()
    }

    pub fn state(&self) -> &RoutingState {
        &self.state
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn node_db(&self) -> &N {
        &self.node_db
    }

    pub fn node_db_mut(&mut self) -> &mut N {
        &mut self.node_db
    }

    pub fn history(&self) -> &H {
        &self.history
    }
}
