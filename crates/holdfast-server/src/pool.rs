#![allow(
    clippy::disallowed_types,
    reason = "pool free-lists are synchronous push/pop critical sections only"
)]

//! Typed, bounded packet pools.
//!
//! Allocation-heavy hot paths (handshake, login) reuse fixed-shape packet
//! bodies instead of allocating fresh ones per reply. Every value returned
//! to a pool passes through its [`Poolable::reset`] hook first, so pooled
//! credentials never survive their request: strings are zeroized and the
//! packet's routing state returns to quiescent.
//!
//! The pool is bounded per class; returns beyond capacity are dropped on
//! the floor (after reset), which keeps a burst from pinning memory.

use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

use holdfast_proto::packet::{
    Body, CredentialsPacket, CredsUpdatePacket, DirectiveBody, HandshakePacket, ResponsePacket,
};

/// Default per-class capacity.
const DEFAULT_CAPACITY: usize = 128;

/// A value that can live in a pool.
///
/// `reset` must zero payload fields; the pool calls it on every return, so
/// an implementation that forgets a field leaks that field to the next
/// borrower.
pub trait Poolable: Default + Send + 'static {
    /// Zero payload fields and restore quiescent state.
    fn reset(&mut self);
}

impl Poolable for HandshakePacket {
    fn reset(&mut self) {
        Self::reset(self);
    }
}

impl Poolable for CredentialsPacket {
    fn reset(&mut self) {
        Self::reset(self);
    }
}

impl Poolable for CredsUpdatePacket {
    fn reset(&mut self) {
        Self::reset(self);
    }
}

impl Poolable for DirectiveBody {
    fn reset(&mut self) {
        Self::reset(self);
    }
}

impl Poolable for ResponsePacket {
    fn reset(&mut self) {
        Self::reset(self);
    }
}

/// Bounded free-list for one packet class.
pub struct Pool<T: Poolable> {
    items: Mutex<Vec<T>>,
    max: AtomicUsize,
}

impl<T: Poolable> Default for Pool<T> {
    fn default() -> Self {
        Self { items: Mutex::new(Vec::new()), max: AtomicUsize::new(DEFAULT_CAPACITY) }
    }
}

impl<T: Poolable> Pool<T> {
    /// Take a value, reusing a pooled one when available.
    #[allow(clippy::expect_used)]
    pub fn get(&self) -> T {
        self.items.lock().expect("mutex poisoned").pop().unwrap_or_default()
    }

    /// Return a value. It is reset before it becomes visible to any other
    /// borrower; beyond capacity it is reset and dropped.
    #[allow(clippy::expect_used)]
    pub fn put(&self, mut value: T) {
        value.reset();

        let mut items = self.items.lock().expect("mutex poisoned");
        if items.len() < self.max.load(Ordering::Acquire) {
            items.push(value);
        }
    }

    /// Cap the free-list; an over-full list is trimmed immediately.
    #[allow(clippy::expect_used)]
    pub fn set_max_capacity(&self, max: usize) {
        self.max.store(max, Ordering::Release);
        self.items.lock().expect("mutex poisoned").truncate(max);
    }

    /// Fill the free-list up to `count` fresh values.
    #[allow(clippy::expect_used)]
    pub fn prealloc(&self, count: usize) {
        let mut items = self.items.lock().expect("mutex poisoned");
        let target = count.min(self.max.load(Ordering::Acquire));
        while items.len() < target {
            items.push(T::default());
        }
    }

    /// Values currently pooled.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().expect("mutex poisoned").len()
    }

    /// Whether the free-list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Selects the per-class pool inside [`PacketPool`].
pub trait PooledClass: Poolable + Sized {
    /// The pool holding this class.
    fn pool_of(pools: &PacketPool) -> &Pool<Self>;
}

macro_rules! pooled_class {
    ($ty:ty, $field:ident) => {
        impl PooledClass for $ty {
            fn pool_of(pools: &PacketPool) -> &Pool<Self> {
                &pools.$field
            }
        }
    };
}

pooled_class!(HandshakePacket, handshake);
pooled_class!(CredentialsPacket, credentials);
pooled_class!(CredsUpdatePacket, creds_update);
pooled_class!(DirectiveBody, directive);
pooled_class!(ResponsePacket, response);

/// One pool per packet class.
#[derive(Default)]
pub struct PacketPool {
    handshake: Pool<HandshakePacket>,
    credentials: Pool<CredentialsPacket>,
    creds_update: Pool<CredsUpdatePacket>,
    directive: Pool<DirectiveBody>,
    response: Pool<ResponsePacket>,
}

impl PacketPool {
    /// Create a pool set with default capacities.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a value of class `T`.
    pub fn get<T: PooledClass>(&self) -> T {
        T::pool_of(self).get()
    }

    /// Return a value of class `T` (reset enforced).
    pub fn put<T: PooledClass>(&self, value: T) {
        T::pool_of(self).put(value);
    }

    /// Cap class `T`'s free-list.
    pub fn set_max_capacity<T: PooledClass>(&self, max: usize) {
        T::pool_of(self).set_max_capacity(max);
    }

    /// Pre-fill class `T`'s free-list.
    pub fn prealloc<T: PooledClass>(&self, count: usize) {
        T::pool_of(self).prealloc(count);
    }

    /// Pooled count for class `T`.
    #[must_use]
    pub fn pooled<T: PooledClass>(&self) -> usize {
        T::pool_of(self).len()
    }

    /// Return a finished reply body to its class pool.
    pub fn put_body(&self, body: Body) {
        match body {
            Body::Handshake(inner) => self.put(inner),
            Body::Credentials(inner) => self.put(inner),
            Body::CredsUpdate(inner) => self.put(inner),
            Body::Directive(inner) => self.put(inner),
            Body::Response(inner) => self.put(inner),
        }
    }
}
