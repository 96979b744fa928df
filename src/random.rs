//! Source of every random choice made by the crate.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seedable random source. The same seed replays the same choices.
#[derive(Debug, Clone)]
pub struct Randomizer {
    rng: ChaCha8Rng,
    seed: u64,
}

impl Randomizer {
    pub fn new(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(rand::random);
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(Some(seed))
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform choice; `None` for an empty slice.
    pub fn choose_one<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        items.get(self.rng.random_range(0..items.len()))
    }

    /// Uniform integer in `0..bound`. A zero bound yields zero.
    pub fn next_int(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        self.rng.random_range(0..bound)
    }

    pub fn next_f64(&mut self) -> f64 {
        self.rng.random()
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }
}

impl Default for Randomizer {
    fn default() -> Self {
        Self::new(None)
    }
}
