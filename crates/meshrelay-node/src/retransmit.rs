use meshrelay_core::{GlobalPacketId, RelayId};
use tracing::{debug, error, warn};

use crate::next_hop;
use crate::pending;
use crate::reliable;
use crate::stage::RouterContext;

/// Fires every due retransmission and returns the delay until the next one.
///
/// Exhausted entries are removed. The final retry of a unicast packet with a
/// next-hop preference is flooded and the learned next hop forgotten.
pub fn tick(ctx: &mut RouterContext<'_>) -> Option<u32> {
    let now = ctx.now_ms;
    let purged = ctx.state.seen.purge_expired(now);
    if purged > 0 {
        debug!(purged, "expired seen records");
    }

    let mut due: Vec<GlobalPacketId> = ctx
        .state
        .pending
        .iter()
        .filter(|(_, pending)| pending.is_due(now))
        .map(|(key, _)| *key)
        .collect();
    due.sort_unstable();

    for key in due {
        let exhausted = match ctx.state.pending.get(&key) {
            Some(pending) => pending.remaining_retries == 0,
            None => {
                debug_assert!(false, "due pending {key} vanished");
                error!(packet = %key, "due pending packet missing");
                ctx.state.stats.invariant_violations += 1;
                continue;
            }
        };
        if exhausted {
            if let Some(pending) = pending::stop_retransmission(ctx.state, key) {
                reliable::on_exhausted(ctx, pending);
            }
        } else {
            retransmit(ctx, key);
        }
    }

    pending::next_wake(ctx.state, now)
}

fn retransmit(ctx: &mut RouterContext<'_>, key: GlobalPacketId) {
    let Some(entry) = ctx.state.pending.get_mut(&key) else {
        return;
    };
    let degrade =
        entry.is_last_retry() && !entry.packet.is_broadcast() && entry.packet.next_hop.is_set();
    entry.remaining_retries -= 1;
    let remaining = entry.remaining_retries;
    let copy = entry.packet.clone();
    if degrade {
        entry.packet.next_hop = RelayId::NO_PREFERENCE;
    }
    let backoff = ctx.radio.retransmission_backoff(&copy);

    debug!(packet = %key, remaining, "retransmitting");
    let result = if degrade {
        next_hop::degrade_to_flooding(ctx, copy)
    } else {
        ctx.transmit(copy)
    };
    ctx.state.stats.retransmissions += 1;
    if let Err(err) = result {
        warn!(packet = %key, error = %err, "retransmission not queued");
    }

    if let Some(entry) = ctx.state.pending.get_mut(&key) {
        entry.next_tx_ms = ctx.now_ms.wrapping_add(backoff);
    }
}
