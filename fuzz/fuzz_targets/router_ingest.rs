#![no_main]

use libfuzzer_sys::fuzz_target;
use meshrelay_core::NodeNum;
use meshrelay_node::{Router, RouterConfig};
use meshrelay_sim::air::decode_frame;
use meshrelay_transport::{InMemoryNodeDb, InMemoryPacketHistory, InMemoryRadio};

const SELF_NODE: NodeNum = NodeNum(0x0000_0B0B);

// Each input is a sequence of length-prefixed frames heard 250 ms apart.
fuzz_target!(|data: &[u8]| {
    let Ok(mut router) = Router::with_seed(
        RouterConfig::default(),
        InMemoryRadio::with_backoff(1_000),
        InMemoryNodeDb::new(SELF_NODE),
        InMemoryPacketHistory::new(SELF_NODE, 32),
        0,
    ) else {
        return;
    };

    let mut now = 0_u32;
    let mut rest = data;
    while let Some((&len, tail)) = rest.split_first() {
        let len = usize::from(len).min(tail.len());
        let (frame, tail) = tail.split_at(len);
        rest = tail;
        if let Ok(packet) = decode_frame(frame) {
            router.handle_received(packet, now);
        }
        router.tick(now);
        router.radio_mut().take_outbound();
        now = now.wrapping_add(250);
    }

    assert_eq!(router.stats().invariant_violations, 0);
});
