//! Simulated environment: virtual clock and seeded randomness.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::{Duration, Instant},
};

use meshreg_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Virtual clock plus a seeded RNG.
///
/// Clones share the clock and the RNG stream, so a test can keep a handle to
/// advance time while the host owns another.
#[derive(Clone)]
pub struct SimEnv {
    epoch: Instant,
    elapsed: Rc<Cell<Duration>>,
    rng: Rc<RefCell<ChaCha8Rng>>,
}

impl SimEnv {
    /// Environment whose random stream is fully determined by `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            epoch: Instant::now(),
            elapsed: Rc::new(Cell::new(Duration::ZERO)),
            rng: Rc::new(RefCell::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.elapsed.set(self.elapsed.get() + by);
    }

    /// Virtual time since creation.
    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }
}

impl std::fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEnv").field("elapsed", &self.elapsed.get()).finish_non_exhaustive()
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        self.epoch + self.elapsed.get()
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut dyn RngCore) -> T) -> T {
        f(&mut *self.rng.borrow_mut())
    }
}
