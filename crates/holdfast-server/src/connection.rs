#![allow(
    clippy::disallowed_types,
    reason = "session-state mutexes guard short synchronous critical sections only"
)]

//! Per-connection session state.
//!
//! A [`Connection`] owns everything scoped to one TCP peer: the stable id,
//! the remote address, the permission level, the post-handshake session key,
//! the most recent decoded packet, the per-connection limiters, and the
//! outbound byte channel its writer task drains. Ordered delivery falls out
//! of the single writer channel; serialized handling falls out of the
//! single dispatcher task per connection.
//!
//! Session secrets are owned exclusively by their connection; cross-task
//! access goes through these methods and never leaks the raw key out of the
//! dispatch path.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    time::Instant,
};

use bytes::Bytes;
use holdfast_core::PermissionLevel;
use holdfast_crypto::SessionKey;
use holdfast_proto::{Packet, directive::Directive, packet::encode_to_bytes};
use tokio::sync::{mpsc, watch};

use crate::limiter::{CallWindow, RateLimitSpec, TokenBucket};

/// Outbound channel depth: writes queue here between dispatcher and socket.
pub(crate) const OUTBOUND_DEPTH: usize = 256;

/// State for one connected peer.
pub struct Connection {
    id: u64,
    remote: SocketAddr,
    level: AtomicU8,
    secret: Mutex<Option<SessionKey>>,
    incoming: Mutex<Option<Packet>>,
    accepting: AtomicBool,
    closing: watch::Sender<bool>,
    outbound: mpsc::Sender<Bytes>,
    bucket: TokenBucket,
    windows: Mutex<HashMap<u16, CallWindow>>,
}

impl Connection {
    /// Create a connection in the fresh state (`level = None`, no secret).
    ///
    /// `outbound` feeds the connection's writer task; `origin` anchors the
    /// token bucket's clock.
    #[must_use]
    pub fn new(
        id: u64,
        remote: SocketAddr,
        outbound: mpsc::Sender<Bytes>,
        bucket_capacity: u32,
        bucket_refill_per_sec: u32,
        origin: Instant,
    ) -> Self {
        let (closing, _) = watch::channel(false);

        Self {
            id,
            remote,
            level: AtomicU8::new(level_to_u8(PermissionLevel::None)),
            secret: Mutex::new(None),
            incoming: Mutex::new(None),
            accepting: AtomicBool::new(true),
            closing,
            outbound,
            bucket: TokenBucket::new(bucket_capacity, bucket_refill_per_sec, origin),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Stable connection id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remote peer address.
    #[must_use]
    pub fn remote_endpoint(&self) -> SocketAddr {
        self.remote
    }

    /// Current permission level.
    #[must_use]
    pub fn level(&self) -> PermissionLevel {
        level_from_u8(self.level.load(Ordering::Acquire))
    }

    /// Set the permission level.
    pub fn set_level(&self, level: PermissionLevel) {
        self.level.store(level_to_u8(level), Ordering::Release);
    }

    /// Clone of the session key, if the handshake has completed.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn secret(&self) -> Option<SessionKey> {
        self.secret.lock().expect("mutex poisoned").clone()
    }

    /// Install the post-handshake session key.
    #[allow(clippy::expect_used)]
    pub fn set_secret(&self, key: SessionKey) {
        *self.secret.lock().expect("mutex poisoned") = Some(key);
    }

    /// Drop the session key (handshake rollback, teardown).
    #[allow(clippy::expect_used)]
    pub fn clear_secret(&self) {
        // SessionKey zeroizes on drop
        *self.secret.lock().expect("mutex poisoned") = None;
    }

    /// Store the most recent decoded packet.
    #[allow(clippy::expect_used)]
    pub fn set_incoming(&self, packet: Packet) {
        *self.incoming.lock().expect("mutex poisoned") = Some(packet);
    }

    /// Snapshot of the most recent decoded packet.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn incoming_packet(&self) -> Option<Packet> {
        self.incoming.lock().expect("mutex poisoned").clone()
    }

    /// Whether the read loop should keep consuming frames.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire) && !self.is_closing()
    }

    /// Stop consuming new frames (shutdown drain) without closing yet.
    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::Release);
    }

    /// Whether teardown has begun.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        *self.closing.borrow()
    }

    /// Begin teardown: wake the read loop, writer task, and dispatcher.
    ///
    /// Idempotent; the first call wins.
    pub fn disconnect(&self) {
        self.accepting.store(false, Ordering::Release);
        let _ = self.closing.send(true);
    }

    /// Resolve when [`Connection::disconnect`] has been called.
    pub async fn closed(&self) {
        let mut rx = self.closing.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Serialize a packet and queue its bytes for the writer task.
    ///
    /// Returns `false` if the peer is gone (teardown begun or writer
    /// stopped) or the packet failed to serialize.
    pub async fn send(&self, packet: &Packet) -> bool {
        if self.is_closing() {
            return false;
        }

        let Ok(wire) = encode_to_bytes(packet) else {
            tracing::error!(conn = self.id, "reply failed to serialize");
            return false;
        };

        self.outbound.send(wire).await.is_ok()
    }

    /// Build and send a directive. The reply opcode echoes the request's.
    pub async fn send_directive(&self, directive: Directive, opcode: u16) -> bool {
        self.send(&Packet::from_directive(directive, opcode)).await
    }

    /// Per-connection token bucket admission.
    pub fn admit_frame(&self, now: Instant) -> bool {
        self.bucket.try_acquire(now)
    }

    /// Per-handler leaky-window admission for `opcode`.
    #[allow(clippy::expect_used)]
    pub fn admit_handler_call(&self, opcode: u16, spec: RateLimitSpec, now: Instant) -> bool {
        let mut windows = self.windows.lock().expect("mutex poisoned");
        windows.entry(opcode).or_insert_with(|| CallWindow::new(now)).admit(spec, now)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .field("level", &self.level())
            .field("closing", &self.is_closing())
            .finish_non_exhaustive()
    }
}

fn level_to_u8(level: PermissionLevel) -> u8 {
    match level {
        PermissionLevel::None => 0,
        PermissionLevel::Guest => 1,
        PermissionLevel::User => 2,
        PermissionLevel::Admin => 3,
    }
}

fn level_from_u8(value: u8) -> PermissionLevel {
    match value {
        1 => PermissionLevel::Guest,
        2 => PermissionLevel::User,
        3 => PermissionLevel::Admin,
        _ => PermissionLevel::None,
    }
}
