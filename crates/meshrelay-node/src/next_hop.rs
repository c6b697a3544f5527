use meshrelay_core::{GlobalPacketId, MeshPacket, NodeNum, RelayId, SendError};
use meshrelay_transport::NodeDatabase;
use tracing::{debug, info, warn};

use crate::flooding;
use crate::pending::{self, PendingOwner};
use crate::stage::{DropReason, FilterDecision, RouterContext, Stage};

/// Learned next hop towards `to`, unless it is `relay` itself.
pub fn get_next_hop(node_db: &dyn NodeDatabase, to: NodeNum, relay: RelayId) -> RelayId {
    if to.is_broadcast() {
        return RelayId::NO_PREFERENCE;
    }
    match node_db.learned_next_hop(to) {
        Some(next_hop) if next_hop != relay => next_hop,
        _ => RelayId::NO_PREFERENCE,
    }
}

/// Stamps us as relay and picks the next hop, never routing back through
/// whoever handed the packet to us.
pub fn annotate(ctx: &RouterContext<'_>, packet: &mut MeshPacket) {
    let incoming_relay = packet.relay_node;
    packet.next_hop = get_next_hop(&*ctx.node_db, packet.to, incoming_relay);
    packet.relay_node = ctx.self_relay();
}

/// Whether an annotated packet needs hop-by-hop retransmission from us.
fn needs_hop_tracking(ctx: &RouterContext<'_>, packet: &MeshPacket) -> bool {
    if !packet.next_hop.is_set() {
        return false;
    }
    // The reliable layer already owns our own ack-requested packets.
    if packet.from == ctx.self_node() && packet.want_ack {
        return false;
    }
    packet.want_ack || (packet.to.last_byte() != packet.next_hop && packet.hop_limit > 0)
}

/// Sends a packet already passed through [`annotate`].
pub fn send_annotated(ctx: &mut RouterContext<'_>, packet: MeshPacket) -> Result<(), SendError> {
    let tracked = needs_hop_tracking(ctx, &packet);
    let key = packet.global_id();
    if tracked {
        let transmissions = ctx.config.intermediate_retries;
        pending::start_retransmission(ctx, packet.clone(), transmissions, PendingOwner::NextHop);
    }
    let result = flooding::send(ctx, packet);
    if result.is_err() && tracked {
        pending::stop_retransmission(ctx.state, key);
    }
    result
}

pub fn send(ctx: &mut RouterContext<'_>, mut packet: MeshPacket) -> Result<(), SendError> {
    annotate(ctx, &mut packet);
    send_annotated(ctx, packet)
}

/// Forgets the next hop towards `packet.to` and floods `packet` instead.
pub fn degrade_to_flooding(
    ctx: &mut RouterContext<'_>,
    mut packet: MeshPacket,
) -> Result<(), SendError> {
    info!(
        to = %packet.to,
        id = packet.id,
        next_hop = %packet.next_hop,
        "last retry, falling back to flooding"
    );
    packet.next_hop = RelayId::NO_PREFERENCE;
    ctx.node_db
        .set_learned_next_hop(packet.to, RelayId::NO_PREFERENCE);
    flooding::send(ctx, packet)
}

fn cancel_relay(ctx: &mut RouterContext<'_>, key: GlobalPacketId) {
    let ours = ctx
        .state
        .pending
        .get(&key)
        .is_some_and(|p| p.owner == PendingOwner::NextHop);
    if ours {
        pending::stop_retransmission(ctx.state, key);
    }
    if ctx.radio.cancel_outgoing(key.origin, key.id) {
        debug!(packet = %key, "cancelled queued relay");
    }
}

/// Updates the node database from an ACK or reply relayed back to us.
fn learn_from_reply(ctx: &mut RouterContext<'_>, packet: &MeshPacket) {
    let known_sender = ctx.node_db.knows(packet.from);
    let relayer_match =
        ctx.history.original_relayer(packet.request_id, packet.from) == Some(packet.relay_node);
    let direct_reply = packet.came_direct();
    if !ctx
        .config
        .learning_policy
        .allows(known_sender, relayer_match, direct_reply)
    {
        return;
    }
    if ctx.node_db.learned_next_hop(packet.from) != Some(packet.relay_node) {
        info!(
            node = %packet.from,
            next_hop = %packet.relay_node,
            direct_reply,
            "learned next hop"
        );
        ctx.node_db
            .set_learned_next_hop(packet.from, packet.relay_node);
    }
}

/// Opportunistic unicast forwarding over learned next hops.
pub struct NextHopStage;

impl Stage for NextHopStage {
    fn name(&self) -> &'static str {
        "next_hop"
    }

    fn filter(&self, ctx: &mut RouterContext<'_>, packet: &MeshPacket) -> FilterDecision {
        ctx.history.record_relay(packet);
        if packet.is_broadcast() {
            return FilterDecision::Pass;
        }

        let key = packet.global_id();
        let self_relay = ctx.self_relay();
        // Confirmed only by our designated hop or the destination relaying it.
        let relay = packet.relay_node;
        let overheard_forward = relay.is_set()
            && relay != self_relay
            && ctx.state.pending.get(&key).is_some_and(|p| {
                p.owner == PendingOwner::NextHop
                    && (relay == p.packet.next_hop || relay == p.packet.to.last_byte())
            });
        if overheard_forward {
            debug!(packet = %key, relay = %packet.relay_node, "next hop forwarded our packet");
            pending::stop_retransmission(ctx.state, key);
        }

        if !ctx.is_duplicate(packet) {
            return FilterDecision::Pass;
        }
        if packet.next_hop == self_relay {
            debug!(packet = %key, "duplicate for which we are next hop");
            return FilterDecision::Drop(DropReason::DuplicateAsNextHop);
        }
        cancel_relay(ctx, key);
        FilterDecision::Drop(DropReason::Duplicate)
    }

    fn observe(&self, ctx: &mut RouterContext<'_>, packet: &MeshPacket) {
        if packet.is_broadcast() {
            return;
        }
        let self_node = ctx.self_node();
        let self_relay = ctx.self_relay();

        if packet.to == self_node {
            if packet.relay_node.is_set() && packet.request_id != 0 {
                learn_from_reply(ctx, packet);
            }
            return;
        }

        if packet.is_ack_or_reply() {
            cancel_relay(ctx, GlobalPacketId::new(packet.to, packet.request_id));
        }

        let for_us_to_relay = !packet.next_hop.is_set() || packet.next_hop == self_relay;
        if packet.from == self_node
            || packet.hop_limit == 0
            || !for_us_to_relay
            || !ctx.config.role.can_relay()
        {
            return;
        }

        let mut copy = packet.clone();
        copy.hop_limit -= 1;
        debug!(from = %copy.from, to = %copy.to, id = copy.id, hop_limit = copy.hop_limit, "relaying unicast");
        match send(ctx, copy) {
            Ok(()) => ctx.state.stats.relayed += 1,
            Err(err) => warn!(from = %packet.from, id = packet.id, error = %err, "relay failed"),
        }
    }
}
