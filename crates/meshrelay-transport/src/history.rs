use std::num::NonZeroUsize;

use lru::LruCache;
use meshrelay_core::{MeshPacket, NodeNum, PacketId, RelayId};

/// Entries kept by [`InMemoryPacketHistory`] when no capacity is given.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Per-message relay history used to confirm two-way next-hop learning.
pub trait PacketHistory {
    /// Notes who relayed `packet` to us.
    fn record_relay(&mut self, packet: &MeshPacket);

    /// First node other than us that relayed message `request_id` from us
    /// towards `destination`.
    fn original_relayer(&self, request_id: PacketId, destination: NodeNum) -> Option<RelayId>;
}

/// Bounded history of messages we originated, keyed by
/// `(message id, destination)`.
///
/// Relays of other nodes' packets are not kept. Only the first foreign
/// relayer of a message is stored; later relayers and our own relays never
/// overwrite it.
#[derive(Debug)]
pub struct InMemoryPacketHistory {
    self_node: NodeNum,
    entries: LruCache<(PacketId, NodeNum), RelayId>,
}

impl InMemoryPacketHistory {
    pub fn new(self_node: NodeNum, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            self_node,
            entries: LruCache::new(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PacketHistory for InMemoryPacketHistory {
    fn record_relay(&mut self, packet: &MeshPacket) {
        if packet.from != self.self_node
            || packet.id == 0
            || !packet.relay_node.is_set()
            || packet.relay_node == self.self_node.last_byte()
        {
            return;
        }
        let key = (packet.id, packet.to);
        if self.entries.contains(&key) {
            return;
        }
        self.entries.put(key, packet.relay_node);
    }

    fn original_relayer(&self, request_id: PacketId, destination: NodeNum) -> Option<RelayId> {
        self.entries.peek(&(request_id, destination)).copied()
    }
}
