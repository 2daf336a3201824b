//! Turmoil-based Environment implementation for deterministic testing.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use airlink_core::env::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Simulation environment using tokio's (Turmoil-driven) clock and a seeded
/// RNG.
///
/// - **Virtual Time**: inside a Turmoil simulation `now()` follows simulated
///   time, which advances instantly across `sleep()`. Outside a simulation it
///   is the ordinary monotonic clock.
///
/// - **Seeded RNG**: `random_bytes()` uses ChaCha20Rng seeded with a fixed
///   value, so backoff jitter is identical across runs.
///
/// Scenario tests drive the supplicant with explicit `now` values and only use
/// the RNG; the event loop uses both.
#[derive(Clone)]
pub struct SimEnv {
    /// Seeded RNG, shared by clones so they draw from one sequence.
    /// Turmoil is single-threaded, so this Mutex never blocks.
    rng: Arc<Mutex<ChaCha20Rng>>,
}

impl SimEnv {
    /// Create a new SimEnv with default seed (0)
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Create a new SimEnv with a specific seed
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))) }
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn random_bytes(&self, dest: &mut [u8]) {
        self.rng
            .lock()
            .unwrap_or_else(|e| {
                // SAFETY: the simulation is single threaded. The mutex can only be
                // poisoned if another thread panics while holding the lock.
                unreachable!("RNG mutex poisoned in single-threaded context: {}", e)
            })
            .fill_bytes(dest);
    }
}
