//! Server configuration.

use std::time::Duration;

/// Tunables for one server instance.
///
/// Defaults are sized for a single mid-range node; every knob is
/// overridable from the CLI.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g. "0.0.0.0:7750").
    pub bind_address: String,

    /// Maximum concurrent connections admitted by the listener.
    pub max_connections: usize,

    /// Per-connection dispatch queue depth. On overflow the oldest queued
    /// frame is dropped and the client receives a BACKPRESSURE directive.
    pub dispatch_queue_depth: usize,

    /// Token-bucket capacity per connection (frames).
    pub bucket_capacity: u32,

    /// Token-bucket refill rate per connection (frames per second).
    pub bucket_refill_per_sec: u32,

    /// Global cap on in-flight handler executions across all connections.
    pub max_in_flight: usize,

    /// Idle disconnect: longest gap without a complete frame.
    pub idle_timeout: Duration,

    /// Handler deadline when a descriptor does not declare its own.
    pub default_handler_timeout: Duration,

    /// Drain deadline for graceful shutdown.
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7750".to_string(),
            max_connections: 10_000,
            dispatch_queue_depth: 64,
            bucket_capacity: 32,
            bucket_refill_per_sec: 16,
            max_in_flight: 512,
            idle_timeout: Duration::from_secs(60),
            default_handler_timeout: Duration::from_secs(4),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}
