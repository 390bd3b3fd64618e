//! Deterministic environment for unit tests.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use holdfast_core::Environment;

/// Test environment: controllable wall clock, deterministic RNG, real
/// monotonic time (unit tests pass instants explicitly where timing
/// matters).
#[derive(Clone)]
pub struct FixedEnv {
    wall_secs: Arc<AtomicU64>,
    rng_state: Arc<AtomicU64>,
}

impl FixedEnv {
    /// Environment pinned to an arbitrary fixed wall clock.
    pub fn new() -> Self {
        Self::at(1_700_000_000)
    }

    /// Environment pinned to `wall_secs`.
    pub fn at(wall_secs: u64) -> Self {
        Self {
            wall_secs: Arc::new(AtomicU64::new(wall_secs)),
            rng_state: Arc::new(AtomicU64::new(0x9E37_79B9_7F4A_7C15)),
        }
    }

    /// Move the wall clock forward.
    pub fn advance_wall(&self, secs: u64) {
        self.wall_secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Default for FixedEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for FixedEnv {
    #[allow(clippy::disallowed_methods, reason = "test clock")]
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock_secs(&self) -> u64 {
        self.wall_secs.load(Ordering::SeqCst)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        // splitmix64: deterministic, well-distributed, good enough for
        // seeds and nonces under test
        for chunk in buffer.chunks_mut(8) {
            let mut x = self.rng_state.fetch_add(0x9E37_79B9_7F4A_7C15, Ordering::SeqCst);
            x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            x ^= x >> 31;
            let bytes = x.to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
