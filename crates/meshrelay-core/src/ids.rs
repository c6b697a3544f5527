use rand::Rng;
use tracing::debug;

use crate::types::PacketId;

/// Bits of the id taken by the rolling counter; the rest are random.
pub const ID_COUNTER_BITS: u32 = 10;
const ID_COUNTER_MASK: u32 = (1 << ID_COUNTER_BITS) - 1;

/// Partially randomized packet id source.
///
/// The low bits roll from a random boot value so consecutive ids never
/// collide; the high bits are fresh randomness on every call. Never yields 0.
#[derive(Debug, Clone)]
pub struct PacketIdGenerator {
    rolling: u32,
}

impl PacketIdGenerator {
    /// Seeds the rolling counter from `rng`.
    pub fn new(rng: &mut impl Rng) -> Self {
        let rolling = rng.gen_range(0..0x7FFF_FFFF);
        debug!(rolling, "initial packet id counter");
        Self { rolling }
    }

    pub fn next_id(&mut self, rng: &mut impl Rng) -> PacketId {
        loop {
            self.rolling = self.rolling.wrapping_add(1) & ID_COUNTER_MASK;
            let high: u32 = rng.gen_range(0..(1 << (32 - ID_COUNTER_BITS)));
            let id = self.rolling | (high << ID_COUNTER_BITS);
            if id != 0 {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::{PacketIdGenerator, ID_COUNTER_BITS};

    #[test]
    fn ids_are_never_zero_and_counter_rolls() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut ids = PacketIdGenerator::new(&mut rng);
        let mask = (1 << ID_COUNTER_BITS) - 1;

        let first = ids.next_id(&mut rng);
        let second = ids.next_id(&mut rng);
        assert_ne!(first, 0);
        assert_ne!(second, 0);
        assert_eq!(first.wrapping_add(1) & mask, second & mask);
    }

    #[test]
    fn consecutive_ids_are_unique() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut ids = PacketIdGenerator::new(&mut rng);
        let seen: HashSet<_> = (0..1000).map(|_| ids.next_id(&mut rng)).collect();
        assert_eq!(seen.len(), 1000);
    }
}
