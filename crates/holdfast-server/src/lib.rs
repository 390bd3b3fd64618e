//! Holdfast production server.
//!
//! The server core of the Holdfast game backend: a length-prefixed binary
//! TCP protocol server that accepts many concurrent clients, negotiates
//! per-session encryption via an ephemeral Diffie-Hellman handshake, and
//! dispatches framed packets through an ordered middleware pipeline to
//! registered operation handlers.
//!
//! # Architecture
//!
//! - [`Server`]: accept loop, per-connection read/write tasks, shutdown
//! - [`ServerContext`]: explicit process-wide wiring (hub, pool, limiters,
//!   registry, pipeline, repository, environment)
//! - [`ConnectionHub`]: connection-id and username registry
//! - [`Pipeline`]: ordered inbound/outbound middleware stages
//! - [`DispatchQueue`]: bounded per-connection FIFO; one in-flight handler
//!   per connection, parallel across connections
//! - [`ops`]: the five operations (handshake, register, login, logout,
//!   change-password)
//! - [`SystemEnv`]: production time and RNG behind
//!   [`holdfast_core::Environment`]

#![forbid(unsafe_code)]

mod config;
mod connection;
mod context;
mod dispatch;
mod error;
mod hub;
mod limiter;
mod listener;
mod middleware;
pub mod ops;
mod pool;
mod registry;
mod system_env;
#[cfg(test)]
mod testutil;

pub use config::ServerConfig;
pub use connection::Connection;
pub use context::ServerContext;
pub use dispatch::{DispatchQueue, PushOutcome, run_dispatcher};
pub use error::ServerError;
pub use hub::{AssociateOutcome, ConnectionHub};
pub use limiter::{CallWindow, ConcurrencyLimiter, RateLimitSpec, TokenBucket};
pub use listener::{Server, ShutdownHandle};
pub use middleware::{DispatchItem, InboundStage, OutboundStage, Pipeline, StageDecision};
pub use pool::{PacketPool, Pool, Poolable, PooledClass};
pub use registry::{HandlerDescriptor, HandlerFn, HandlerFuture, HandlerRegistry, Outcome};
pub use system_env::SystemEnv;
