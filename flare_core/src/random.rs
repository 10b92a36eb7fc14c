//! Random source for sampling draws.
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait RandomSource: Send + Sync {
    /// Uniform draw in `[0.0, 1.0)`.
    fn next_f64(&self) -> f64;
}

/// `StdRng` seeded from the thread RNG, behind a mutex.
pub struct MutexRng {
    inner: Mutex<StdRng>,
}

impl MutexRng {
    pub fn new() -> Self {
        let seed = rand::thread_rng().gen::<[u8; 32]>();
        Self { inner: Mutex::new(StdRng::from_seed(seed)) }
    }

    pub fn seeded(seed: u64) -> Self {
        Self { inner: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

impl Default for MutexRng {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for MutexRng {
    fn next_f64(&self) -> f64 {
        match self.inner.lock() {
            Ok(mut rng) => rng.gen::<f64>(),
            Err(poisoned) => poisoned.into_inner().gen::<f64>(),
        }
    }
}

/// Always returns the same draw. Useful to force sampling decisions in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn next_f64(&self) -> f64 {
        self.0
    }
}
