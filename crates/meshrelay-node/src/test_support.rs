use meshrelay_core::{MeshPacket, NodeNum};
use meshrelay_transport::{InMemoryNodeDb, InMemoryPacketHistory, InMemoryRadio};

use crate::config::RouterConfig;
use crate::stage::RouterContext;
use crate::state::RoutingState;

pub(crate) const SELF_NODE: NodeNum = NodeNum(0x0000_0B0B);

/// Router parts owned separately so tests can build contexts directly.
pub(crate) struct Harness {
    pub state: RoutingState,
    pub config: RouterConfig,
    pub radio: InMemoryRadio,
    pub node_db: InMemoryNodeDb,
    pub history: InMemoryPacketHistory,
}

impl Harness {
    pub fn new(config: RouterConfig) -> Self {
        let node_db = InMemoryNodeDb::new(SELF_NODE);
        Self {
            state: RoutingState::new(&config),
            history: InMemoryPacketHistory::new(SELF_NODE, 32),
            radio: InMemoryRadio::with_backoff(1_000),
            node_db,
            config,
        }
    }

    pub fn ctx(&mut self, now_ms: u32) -> RouterContext<'_> {
        RouterContext::new(
            &mut self.state,
            &self.config,
            &mut self.radio,
            &mut self.node_db,
            &mut self.history,
            now_ms,
        )
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

pub(crate) fn broadcast(from: u32, id: u32, hop_limit: u8) -> MeshPacket {
    MeshPacket::new(NodeNum(from), NodeNum::BROADCAST, id, hop_limit)
}
