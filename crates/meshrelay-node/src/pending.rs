use meshrelay_core::{GlobalPacketId, MeshPacket};
use serde::Serialize;
use tracing::debug;

use crate::stage::RouterContext;
use crate::state::RoutingState;

/// Layer responsible for a pending retransmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PendingOwner {
    /// End-to-end delivery of a packet we originated with `want_ack`.
    Reliable,
    /// Hop-by-hop delivery towards a learned next hop.
    NextHop,
}

/// A packet copy awaiting acknowledgement.
#[derive(Debug, Clone)]
pub struct PendingPacket {
    pub packet: MeshPacket,
    /// Radio clock time of the next retransmission.
    pub next_tx_ms: u32,
    /// Retransmissions still allowed after the initial send.
    pub remaining_retries: u8,
    pub owner: PendingOwner,
}

impl PendingPacket {
    pub fn is_due(&self, now_ms: u32) -> bool {
        now_ms.wrapping_sub(self.next_tx_ms) as i32 >= 0
    }

    /// Whether the next retransmission is the final one.
    pub fn is_last_retry(&self) -> bool {
        self.remaining_retries == 1
    }
}

/// Registers `packet` for up to `transmissions - 1` retransmissions, replacing
/// any existing entry with the same id.
pub fn start_retransmission(
    ctx: &mut RouterContext<'_>,
    packet: MeshPacket,
    transmissions: u8,
    owner: PendingOwner,
) {
    let key = packet.global_id();
    let next_tx_ms = ctx
        .now_ms
        .wrapping_add(ctx.radio.retransmission_backoff(&packet));
    let pending = PendingPacket {
        packet,
        next_tx_ms,
        remaining_retries: transmissions.saturating_sub(1),
        owner,
    };
    if ctx.state.pending.insert(key, pending).is_some() {
        debug!(packet = %key, ?owner, "replaced pending retransmission");
    }
}

/// Removes the pending entry for `key`. Absent ids are a no-op.
pub fn stop_retransmission(state: &mut RoutingState, key: GlobalPacketId) -> Option<PendingPacket> {
    let removed = state.pending.remove(&key);
    if removed.is_some() {
        debug!(packet = %key, "stopped retransmission");
    }
    removed
}

/// Pushes every pending entry except `except` back by `delay_ms`.
pub fn delay_pending(state: &mut RoutingState, except: Option<GlobalPacketId>, delay_ms: u32) {
    if delay_ms == 0 {
        return;
    }
    for (key, pending) in state.pending.iter_mut() {
        if Some(*key) != except {
            pending.next_tx_ms = pending.next_tx_ms.wrapping_add(delay_ms);
        }
    }
}

/// Delay until the earliest pending entry is due, `None` when idle.
pub fn next_wake(state: &RoutingState, now_ms: u32) -> Option<u32> {
    state
        .pending
        .values()
        .map(|pending| (pending.next_tx_ms.wrapping_sub(now_ms) as i32).max(0) as u32)
        .min()
}
