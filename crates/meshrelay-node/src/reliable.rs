use meshrelay_core::{
    GlobalPacketId, MeshPacket, NodeNum, PacketId, Payload, RoutingError, SendError,
};
use tracing::{debug, info, warn};

use crate::next_hop;
use crate::pending::{self, PendingOwner, PendingPacket};
use crate::stage::{FilterDecision, RouterContext, Stage};
use crate::state::RouterEvent;

/// Hop limit for a response to a packet that arrived with `hop_start` and
/// `hop_limit`: enough to retrace the observed path plus some slack, never
/// below the configured limit for long paths.
pub fn response_hop_limit(hop_start: u8, hop_limit: u8, configured: u8) -> u8 {
    if hop_start == 0 {
        return configured;
    }
    let hops_used = if hop_start < hop_limit {
        configured
    } else {
        hop_start - hop_limit
    };
    if hops_used > configured {
        hops_used
    } else if hops_used + 2 < configured {
        hops_used + 2
    } else {
        configured
    }
}

/// Sends a packet we originate, tracking it end to end when it asks for an ACK.
///
/// An ack-requested broadcast with no hop budget gets the configured hop
/// limit so its first relay can acknowledge it implicitly. If the radio
/// rejects the initial enqueue the retransmission is dropped and the error
/// returned as is.
pub fn send(ctx: &mut RouterContext<'_>, mut packet: MeshPacket) -> Result<(), SendError> {
    if packet.want_ack && packet.is_broadcast() && packet.hop_limit == 0 {
        packet.hop_limit = ctx.config.hop_limit;
    }
    if packet.from == ctx.self_node() {
        packet.hop_start = packet.hop_limit;
    }
    next_hop::annotate(ctx, &mut packet);

    let key = packet.global_id();
    if packet.want_ack {
        let transmissions = ctx.config.reliable_retries;
        pending::start_retransmission(ctx, packet.clone(), transmissions, PendingOwner::Reliable);
    }
    if ctx.config.airtime_compensation {
        let airtime = ctx.radio.packet_airtime(&packet, false);
        pending::delay_pending(ctx.state, Some(key), airtime);
    }

    let want_ack = packet.want_ack;
    let result = next_hop::send_annotated(ctx, packet);
    if let Err(err) = &result {
        if want_ack {
            pending::stop_retransmission(ctx.state, key);
        }
        warn!(packet = %key, error = %err, "send failed");
    }
    result
}

/// Sends an ACK (`reason == None`) or NAK for `request_id` back to `to`.
pub fn send_ack_nak(
    ctx: &mut RouterContext<'_>,
    reason: RoutingError,
    to: NodeNum,
    request_id: PacketId,
    channel: u8,
    hop_limit: u8,
    want_ack: bool,
) {
    let id = ctx.next_packet_id();
    let ack = MeshPacket::ack_nak(ctx.self_node(), to, id, request_id, reason, hop_limit, channel)
        .with_want_ack(want_ack);
    debug!(to = %to, request_id, %reason, hop_limit, want_ack, "sending ack/nak");
    match send(ctx, ack) {
        Ok(()) => ctx.state.stats.acks_sent += 1,
        Err(err) => warn!(to = %to, request_id, error = %err, "ack/nak not sent"),
    }
}

/// Removes the pending entry for `key` and reports `event` if we were
/// tracking it end to end.
fn resolve(ctx: &mut RouterContext<'_>, key: GlobalPacketId, event: RouterEvent) -> bool {
    match pending::stop_retransmission(ctx.state, key) {
        Some(pending) if pending.owner == PendingOwner::Reliable => {
            ctx.state.emit(event);
            true
        }
        Some(_) => true,
        None => false,
    }
}

/// Final bookkeeping for a pending packet out of retries.
pub fn on_exhausted(ctx: &mut RouterContext<'_>, pending: PendingPacket) {
    let packet = &pending.packet;
    if packet.from == ctx.self_node() && packet.want_ack {
        info!(packet = %packet.global_id(), "giving up on delivery");
        ctx.state.emit(RouterEvent::Failed {
            id: packet.id,
            reason: RoutingError::MaxRetransmit,
        });
    } else {
        debug!(packet = %packet.global_id(), "hop retransmissions exhausted");
    }
}

/// Whether the ACK for application data sent to us should itself ask for an ACK.
fn acks_reliably(ctx: &RouterContext<'_>, packet: &MeshPacket) -> bool {
    ctx.config.ack_with_want_ack
        && packet.want_ack
        && packet.from != ctx.self_node()
        && matches!(packet.payload, Payload::Data(_))
}

fn ack_if_needed(ctx: &mut RouterContext<'_>, packet: &MeshPacket) {
    let self_relay = ctx.self_relay();
    let reliable_ack = acks_reliably(ctx, packet);
    let hop_limit = if packet.want_ack {
        if reliable_ack || !packet.is_ack_or_reply() {
            response_hop_limit(packet.hop_start, packet.hop_limit, ctx.config.hop_limit)
        } else if packet.came_direct() || packet.next_hop.is_set() {
            // Stops the sender or last relay from retransmitting a reply.
            0
        } else {
            return;
        }
    } else if packet.next_hop == self_relay && packet.hop_limit > 0 {
        0
    } else {
        return;
    };
    send_ack_nak(
        ctx,
        RoutingError::None,
        packet.from,
        packet.id,
        packet.channel,
        hop_limit,
        reliable_ack,
    );
}

/// End-to-end ACK/NAK handling.
pub struct ReliableStage;

impl Stage for ReliableStage {
    fn name(&self) -> &'static str {
        "reliable"
    }

    fn filter(&self, ctx: &mut RouterContext<'_>, packet: &MeshPacket) -> FilterDecision {
        let self_node = ctx.self_node();
        if packet.from == self_node
            && packet.is_broadcast()
            && packet.relay_node != ctx.self_relay()
        {
            let key = packet.global_id();
            if resolve(ctx, key, RouterEvent::Delivered { id: packet.id }) {
                debug!(packet = %key, relay = %packet.relay_node, "implicit ack");
                ctx.state.stats.implicit_acks += 1;
            }
        }

        if ctx.config.airtime_compensation {
            let airtime = ctx.radio.packet_airtime(packet, true);
            pending::delay_pending(ctx.state, None, airtime);
        }

        // Our first ACK may have been lost; the sender is retrying.
        if packet.to == self_node
            && packet.want_ack
            && !packet.is_ack_or_reply()
            && ctx.is_duplicate(packet)
        {
            let hop_limit =
                response_hop_limit(packet.hop_start, packet.hop_limit, ctx.config.hop_limit);
            let reliable_ack = acks_reliably(ctx, packet);
            send_ack_nak(
                ctx,
                RoutingError::None,
                packet.from,
                packet.id,
                packet.channel,
                hop_limit,
                reliable_ack,
            );
        }
        FilterDecision::Pass
    }

    fn observe(&self, ctx: &mut RouterContext<'_>, packet: &MeshPacket) {
        let self_node = ctx.self_node();
        if packet.to != self_node {
            return;
        }
        ack_if_needed(ctx, packet);

        let key = |id| GlobalPacketId::new(self_node, id);
        if let Some(ack_id) = packet.ack_id() {
            if resolve(ctx, key(ack_id), RouterEvent::Delivered { id: ack_id }) {
                debug!(id = ack_id, from = %packet.from, "ack received");
            }
        } else if let Some((nak_id, reason)) = packet.nak() {
            if resolve(ctx, key(nak_id), RouterEvent::Failed { id: nak_id, reason }) {
                info!(id = nak_id, from = %packet.from, %reason, "nak received");
            }
        }
    }
}
