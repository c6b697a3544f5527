use std::collections::HashMap;

use meshrelay_core::{NodeNum, RelayId};
use tracing::debug;

/// Node database view used by the routing stack.
pub trait NodeDatabase {
    /// Our own node number.
    fn self_node(&self) -> NodeNum;

    /// Last byte of our node number, as stamped into relay fields.
    fn self_last_byte(&self) -> RelayId {
        self.self_node().last_byte()
    }

    /// Whether we have ever heard from `node`.
    fn knows(&self, node: NodeNum) -> bool;

    /// Learned next hop towards `node`; `None` when there is no preference.
    fn learned_next_hop(&self, node: NodeNum) -> Option<RelayId>;

    /// Stores (or with [`RelayId::NO_PREFERENCE`], clears) the next hop
    /// towards `node`.
    fn set_learned_next_hop(&mut self, node: NodeNum, relay: RelayId);
}

#[derive(Debug, Clone, Default)]
struct NodeEntry {
    next_hop: RelayId,
}

/// Map-backed node database.
#[derive(Debug, Clone)]
pub struct InMemoryNodeDb {
    self_node: NodeNum,
    nodes: HashMap<NodeNum, NodeEntry>,
}

impl InMemoryNodeDb {
    pub fn new(self_node: NodeNum) -> Self {
        Self {
            self_node,
            nodes: HashMap::new(),
        }
    }

    /// Marks `node` as known without a next-hop preference.
    pub fn insert_node(&mut self, node: NodeNum) {
        self.nodes.entry(node).or_default();
    }

    /// Learned next hops, ordered by destination.
    pub fn learned_routes(&self) -> Vec<(NodeNum, RelayId)> {
        let mut routes: Vec<_> = self
            .nodes
            .iter()
            .filter(|(_, entry)| entry.next_hop.is_set())
            .map(|(node, entry)| (*node, entry.next_hop))
            .collect();
        routes.sort_by_key(|(node, _)| *node);
        routes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl NodeDatabase for InMemoryNodeDb {
    fn self_node(&self) -> NodeNum {
        self.self_node
    }

    fn knows(&self, node: NodeNum) -> bool {
        self.nodes.contains_key(&node)
    }

    fn learned_next_hop(&self, node: NodeNum) -> Option<RelayId> {
        self.nodes
            .get(&node)
            .map(|entry| entry.next_hop)
            .filter(|relay| relay.is_set())
    }

    fn set_learned_next_hop(&mut self, node: NodeNum, relay: RelayId) {
        match self.nodes.get_mut(&node) {
            Some(entry) => entry.next_hop = relay,
            None if relay.is_set() => {
                self.nodes.insert(node, NodeEntry { next_hop: relay });
            }
            None => {}
        }
        debug!(node = %node, relay = %relay, "next hop updated");
    }
}
