//! Shared server context.
//!
//! Everything process-wide lives here and is constructed explicitly at
//! startup: the environment, the credentials repository, the hub, the
//! packet pool, the global concurrency limiter, the frozen handler
//! registry, and the middleware pipeline. Handlers and stages receive a
//! reference; nothing reaches for globals.

use std::sync::Arc;

use holdfast_core::{CredentialsRepository, Environment};

use crate::{
    config::ServerConfig,
    hub::ConnectionHub,
    limiter::ConcurrencyLimiter,
    middleware::Pipeline,
    ops,
    pool::PacketPool,
    registry::HandlerRegistry,
};

/// Process-wide dependencies, wired once at startup.
pub struct ServerContext<E: Environment, R: CredentialsRepository> {
    /// Time, randomness, sleep.
    pub env: E,
    /// Credentials backend.
    pub repository: Arc<R>,
    /// Connection registry and username associations.
    pub hub: ConnectionHub,
    /// Reusable packet bodies.
    pub pool: PacketPool,
    /// Global cap on in-flight handlers.
    pub concurrency: ConcurrencyLimiter,
    /// Opcode → handler descriptor table (frozen).
    pub registry: HandlerRegistry<E, R>,
    /// Ordered inbound/outbound middleware stages.
    pub pipeline: Pipeline<E, R>,
    /// Tunables.
    pub config: ServerConfig,
}

impl<E: Environment, R: CredentialsRepository> ServerContext<E, R> {
    /// Wire the standard context: built-in handlers, standard pipeline.
    #[must_use]
    pub fn new(env: E, repository: R, config: ServerConfig) -> Arc<Self> {
        let pool = PacketPool::new();
        // Handshake and login replies dominate the hot path
        pool.prealloc::<holdfast_proto::packet::HandshakePacket>(32);

        Arc::new(Self {
            env,
            repository: Arc::new(repository),
            hub: ConnectionHub::new(),
            pool,
            concurrency: ConcurrencyLimiter::new(config.max_in_flight),
            registry: ops::standard_registry(),
            pipeline: Pipeline::standard(),
            config,
        })
    }
}

impl<E: Environment, R: CredentialsRepository> std::fmt::Debug for ServerContext<E, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("connections", &self.hub.len())
            .field("handlers", &self.registry.len())
            .finish_non_exhaustive()
    }
}
