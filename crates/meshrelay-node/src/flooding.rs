use meshrelay_core::{MeshPacket, RelayId, SendError};
use tracing::{debug, warn};

use crate::stage::{DropReason, FilterDecision, RouterContext, Stage};

/// Marks `packet` as seen and hands it to the radio.
pub fn send(ctx: &mut RouterContext<'_>, packet: MeshPacket) -> Result<(), SendError> {
    ctx.state.seen.was_seen_recently(&packet, ctx.now_ms);
    ctx.transmit(packet)
}

/// Whether we should rebroadcast `packet` on behalf of its sender.
pub fn should_rebroadcast(ctx: &RouterContext<'_>, packet: &MeshPacket) -> bool {
    packet.is_broadcast()
        && packet.hop_limit > 0
        && packet.id != 0
        && packet.from != ctx.self_node()
        && ctx.config.role.can_relay()
}

/// Broadcast flooding with seen-cache suppression.
pub struct FloodingStage;

impl Stage for FloodingStage {
    fn name(&self) -> &'static str {
        "flooding"
    }

    fn filter(&self, ctx: &mut RouterContext<'_>, packet: &MeshPacket) -> FilterDecision {
        if ctx.is_duplicate(packet) {
            FilterDecision::Drop(DropReason::Duplicate)
        } else {
            FilterDecision::Pass
        }
    }

    fn observe(&self, ctx: &mut RouterContext<'_>, packet: &MeshPacket) {
        if !should_rebroadcast(ctx, packet) {
            return;
        }
        let mut copy = packet.clone();
        copy.hop_limit -= 1;
        copy.relay_node = ctx.self_relay();
        copy.next_hop = RelayId::NO_PREFERENCE;
        debug!(from = %copy.from, id = copy.id, hop_limit = copy.hop_limit, "rebroadcasting");
        match ctx.transmit(copy) {
            Ok(()) => ctx.state.stats.relayed += 1,
            Err(err) => warn!(from = %packet.from, id = packet.id, error = %err, "rebroadcast failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use meshrelay_core::{MeshPacket, NodeNum, RelayId};

    use super::{send, FloodingStage};
    use crate::config::{DeviceRole, RouterConfig};
    use crate::stage::{DropReason, FilterDecision, Stage};
    use crate::test_support::{broadcast, Harness, SELF_NODE};

    #[test]
    fn send_records_packet_as_seen() {
        let mut h = Harness::default();
        let packet = broadcast(SELF_NODE.0, 9, 3);
        send(&mut h.ctx(0), packet.clone()).expect("send should succeed");

        assert_eq!(h.radio.queued_len(), 1);
        let mut ctx = h.ctx(10);
        assert_eq!(
            FloodingStage.filter(&mut ctx, &packet),
            FilterDecision::Drop(DropReason::Duplicate)
        );
    }

    #[test]
    fn rebroadcast_decrements_hop_and_stamps_relay() {
        let mut h = Harness::default();
        let mut packet = broadcast(100, 5, 3);
        packet.next_hop = RelayId(0x33);
        {
            let mut ctx = h.ctx(0);
            assert_eq!(FloodingStage.filter(&mut ctx, &packet), FilterDecision::Pass);
            FloodingStage.observe(&mut ctx, &packet);
        }

        let out = h.radio.take_outbound();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].from, NodeNum(100));
        assert_eq!(out[0].hop_limit, 2);
        assert_eq!(out[0].relay_node, SELF_NODE.last_byte());
        assert_eq!(out[0].next_hop, RelayId::NO_PREFERENCE);
        assert_eq!(h.state.stats.relayed, 1);
    }

    #[test]
    fn no_rebroadcast_for_exhausted_ephemeral_or_own_packets() {
        let mut h = Harness::default();
        let mut ctx = h.ctx(0);
        FloodingStage.observe(&mut ctx, &broadcast(100, 5, 0));
        FloodingStage.observe(&mut ctx, &broadcast(100, 0, 3));
        FloodingStage.observe(&mut ctx, &broadcast(SELF_NODE.0, 6, 3));
        FloodingStage.observe(&mut ctx, &MeshPacket::new(NodeNum(100), NodeNum(7), 8, 3));
        drop(ctx);
        assert_eq!(h.radio.queued_len(), 0);
    }

    #[test]
    fn mute_role_never_rebroadcasts() {
        let mut h = Harness::new(RouterConfig {
            role: DeviceRole::ClientMute,
            ..RouterConfig::default()
        });
        FloodingStage.observe(&mut h.ctx(0), &broadcast(100, 5, 3));
        assert_eq!(h.radio.queued_len(), 0);
    }
}
