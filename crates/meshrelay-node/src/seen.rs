use std::num::NonZeroUsize;

use lru::LruCache;
use meshrelay_core::{GlobalPacketId, MeshPacket};
use tracing::trace;

use crate::config::DedupScope;

/// Bounded, time-expiring record of recently seen packets.
///
/// Records are keyed by `(sender, id)` and hold the time of the last
/// sighting. When full, the least recently seen record is evicted.
#[derive(Debug)]
pub struct SeenCache {
    records: LruCache<GlobalPacketId, u32>,
    expire_ms: u32,
    scope: DedupScope,
}

impl SeenCache {
    pub fn new(capacity: usize, expire_ms: u32, scope: DedupScope) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            records: LruCache::new(capacity),
            expire_ms,
            scope,
        }
    }

    fn tracks(&self, packet: &MeshPacket) -> bool {
        if packet.id == 0 {
            return false;
        }
        match self.scope {
            DedupScope::BroadcastOnly => packet.is_broadcast(),
            DedupScope::AllPackets => true,
        }
    }

    /// Returns whether `packet` was seen within the expire window, and
    /// records this sighting either way.
    pub fn was_seen_recently(&mut self, packet: &MeshPacket, now_ms: u32) -> bool {
        if !self.tracks(packet) {
            return false;
        }
        self.purge_expired(now_ms);

        let key = packet.global_id();
        if let Some(rx_time) = self.records.get_mut(&key) {
            *rx_time = now_ms;
            trace!(packet = %key, "seen recently");
            return true;
        }
        self.records.put(key, now_ms);
        false
    }

    /// Drops records older than the expire window. Returns how many were removed.
    pub fn purge_expired(&mut self, now_ms: u32) -> usize {
        let expire_ms = self.expire_ms;
        let expired: Vec<_> = self
            .records
            .iter()
            .filter(|(_, rx_time)| now_ms.wrapping_sub(**rx_time) > expire_ms)
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            self.records.pop(key);
        }
        expired.len()
    }

    pub fn contains(&self, key: &GlobalPacketId) -> bool {
        self.records.contains(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
