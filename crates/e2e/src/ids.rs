//! Seedable random identifiers
//!
//! Resource ids in API flows are random so parallel runs don't collide, but
//! the seed is always logged so a failing run can be replayed exactly.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug)]
pub struct IdGenerator {
    seed: u64,
    rng: StdRng,
}

impl IdGenerator {
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// First of `preferred` that is set, otherwise a fresh random seed.
    pub fn from_seeds(preferred: &[Option<u64>]) -> Self {
        let seed = preferred
            .iter()
            .flatten()
            .copied()
            .next()
            .unwrap_or_else(|| rand::thread_rng().gen());
        Self::seeded(seed)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Integer in `[0, max)`; `max` of 0 is treated as 1.
    pub fn next_id(&mut self, max: u64) -> u64 {
        self.rng.gen_range(0..max.max(1))
    }
}
