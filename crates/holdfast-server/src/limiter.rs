//! Rate limiting primitives.
//!
//! Three limiters cooperate on the dispatch path:
//!
//! - [`TokenBucket`]: per-connection admission, atomic counters on the fast
//!   path (no lock, CAS-based refill)
//! - [`CallWindow`]: per-connection-per-opcode leaky window, parameters from
//!   handler metadata
//! - [`ConcurrencyLimiter`]: global cap on in-flight handler executions

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Micro-tokens per whole token. Refill math stays integral at any rate.
const MICRO: u64 = 1_000_000;

/// Lock-free token bucket.
///
/// Tokens are tracked in micro-token units so fractional refill (e.g. 16
/// tokens/sec polled every few hundred microseconds) never rounds to zero.
/// Acquisition is a CAS loop on one atomic; refill is a second CAS that at
/// most one caller wins per poll, so contended connections never spin long.
pub struct TokenBucket {
    capacity_micro: u64,
    refill_per_micro: u64,
    tokens_micro: AtomicU64,
    /// Microseconds since `origin` of the last refill.
    last_refill_micros: AtomicU64,
    origin: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    ///
    /// `origin` anchors the bucket's internal clock; pass the environment's
    /// `now()` at construction.
    #[must_use]
    pub fn new(capacity: u32, refill_per_sec: u32, origin: Instant) -> Self {
        Self {
            capacity_micro: u64::from(capacity) * MICRO,
            refill_per_micro: u64::from(refill_per_sec),
            tokens_micro: AtomicU64::new(u64::from(capacity) * MICRO),
            last_refill_micros: AtomicU64::new(0),
            origin,
        }
    }

    /// Take one token. `false` means rate-limited.
    pub fn try_acquire(&self, now: Instant) -> bool {
        self.refill(now);

        self.tokens_micro
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |tokens| {
                tokens.checked_sub(MICRO)
            })
            .is_ok()
    }

    /// Whole tokens currently available (observability/test hook).
    #[must_use]
    pub fn available(&self) -> u32 {
        (self.tokens_micro.load(Ordering::Acquire) / MICRO) as u32
    }

    fn refill(&self, now: Instant) {
        let now_micros = now.saturating_duration_since(self.origin).as_micros() as u64;
        let last = self.last_refill_micros.load(Ordering::Acquire);
        if now_micros <= last {
            return;
        }

        // Single winner per poll interval; losers skip the credit and let
        // the winner's stamp cover the elapsed span.
        if self
            .last_refill_micros
            .compare_exchange(last, now_micros, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let credit = (now_micros - last).saturating_mul(self.refill_per_micro);
        if credit == 0 {
            return;
        }

        let capacity = self.capacity_micro;
        let _ = self.tokens_micro.fetch_update(Ordering::AcqRel, Ordering::Acquire, |tokens| {
            Some(tokens.saturating_add(credit).min(capacity))
        });
    }
}

/// Static per-handler rate declaration (from handler metadata).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSpec {
    /// Calls admitted per window.
    pub max_calls: u32,
    /// Window length.
    pub window: Duration,
}

/// Leaky call window; one per (connection, opcode).
#[derive(Debug, Clone, Copy)]
pub struct CallWindow {
    started: Instant,
    count: u32,
}

impl CallWindow {
    /// Open a fresh window.
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self { started: now, count: 0 }
    }

    /// Admit one call under `spec`. `false` means the window is exhausted.
    pub fn admit(&mut self, spec: RateLimitSpec, now: Instant) -> bool {
        if now.saturating_duration_since(self.started) >= spec.window {
            self.started = now;
            self.count = 0;
        }

        if self.count < spec.max_calls {
            self.count += 1;
            true
        } else {
            false
        }
    }
}

/// Global cap on concurrently executing handlers.
///
/// A thin wrapper over a semaphore; permits travel with the dispatch item
/// and release on drop when the handler finishes.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    permits: Arc<Semaphore>,
}

impl ConcurrencyLimiter {
    /// Create a limiter with `max_in_flight` slots.
    #[must_use]
    pub fn new(max_in_flight: usize) -> Self {
        Self { permits: Arc::new(Semaphore::new(max_in_flight)) }
    }

    /// Grab a slot without waiting. `None` means the server is saturated.
    #[must_use]
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.permits).try_acquire_owned().ok()
    }

    /// Slots currently free (observability/test hook).
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
