//! Environment abstraction for time and randomness.
//!
//! Registration logic never reads a clock or an RNG directly. Production code
//! backs this trait with the platform timer and entropy source; the
//! simulation harness uses a virtual clock and a seeded generator so every
//! run is reproducible.

use std::time::Instant;

use rand::{Rng, RngCore};

/// Source of time and randomness.
pub trait Environment {
    /// Current time.
    fn now(&self) -> Instant;

    /// Run `f` with the environment's random number generator.
    ///
    /// Used for backoff jitter and secret generation, so a non-cryptographic
    /// generator is only acceptable in simulation.
    fn with_rng<T>(&self, f: impl FnOnce(&mut dyn RngCore) -> T) -> T;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]) {
        self.with_rng(|rng| rng.fill_bytes(buffer));
    }

    /// Random `u16` in `[min, max)`. Returns `min` when the range is empty.
    fn random_u16_in_range(&self, min: u16, max: u16) -> u16 {
        if max <= min {
            return min;
        }
        self.with_rng(|rng| rng.gen_range(min..max))
    }

    /// Random `u8` in `[min, max)`. Returns `min` when the range is empty.
    fn random_u8_in_range(&self, min: u8, max: u8) -> u8 {
        if max <= min {
            return min;
        }
        self.with_rng(|rng| rng.gen_range(min..max))
    }
}
