//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples station logic from system resources
//! (time and randomness). This enables:
//!
//! - Deterministic Simulation: the harness provides a virtual clock and a
//!   seeded RNG, so a failing reconnect storm can be replayed exactly.
//!
//! - Production Runtime: a system implementation uses the real clock and OS
//!   entropy without any change to the state machines.
//!
//! # Design Philosophy
//!
//! State machines in `airlink-core` are pure logic. They:
//!
//! - MUST NOT call `std::time::Instant::now()` or `tokio::time::sleep()`
//! - MUST NOT use `rand::thread_rng()` or system entropy directly
//! - take `now: Instant` as a parameter and return actions
//!
//! Only the [`Supplicant`](crate::supplicant::Supplicant) holds an
//! `Environment`, and only for randomness (backoff jitter). The event loop that
//! drives it reads `now()` and sleeps until the next deadline.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

use std::time::{Duration, Instant};

/// Abstract environment providing time, randomness, and async sleeping.
///
/// # Implementations
///
/// - Simulation (`airlink-harness::SimEnv`): Turmoil virtual time, seeded
///   ChaCha RNG.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// 1. Time monotonicity: `now()` never goes backwards
/// 2. Minimal panics: Methods are infallible except in exceptional
///    circumstances (e.g., incorrect simulation setup)
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current time.
    ///
    /// Subsequent calls must return times >= previous calls.
    fn now(&self) -> Instant;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it is only used by the
    /// event loop. State machines express waiting as deadlines checked by
    /// `tick()` instead.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// Given the same seed, simulation implementations produce the same
    /// sequence of bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a random value in `0..bound`. Returns 0 for a zero bound.
    ///
    /// Modulo bias is irrelevant for the small bounds used for jitter.
    fn random_below(&self, bound: u64) -> u64 {
        if bound == 0 { 0 } else { self.random_u64() % bound }
    }
}
