//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (time, randomness). Tests
//! drive a fixed or scripted environment; production uses real system
//! resources.

use std::time::{Duration, Instant};

/// Abstract environment providing time, randomness, and async sleep.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - `wall_clock_secs()` is Unix time, coarse enough that tests can pin it
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current monotonic time.
    fn now(&self) -> Instant;

    /// Current wall-clock time in Unix seconds.
    ///
    /// Persisted stamps (login/logout/failure times) use this, never
    /// `now()`: monotonic instants are process-local and meaningless in
    /// storage.
    fn wall_clock_secs(&self) -> u64;

    /// Fill the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Sleep for the specified duration.
    ///
    /// The only async method in the trait; used by driver code, never by
    /// pure protocol logic.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Generate a random `u64` (connection ids, nonce seeds).
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_le_bytes(bytes)
    }

    /// Generate a random 32-byte array (keypair seeds).
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }
}
