//! Holdfast server binary.
//!
//! # Usage
//!
//! ```bash
//! # Development defaults
//! holdfast-server --bind 0.0.0.0:7750
//!
//! # Tighter admission for a small node
//! holdfast-server --bind 0.0.0.0:7750 --max-connections 2000 --max-in-flight 128
//! ```

use clap::Parser;
use holdfast_core::MemoryRepository;
use holdfast_server::{Server, ServerConfig, SystemEnv};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Holdfast game backend protocol server
#[derive(Parser, Debug)]
#[command(name = "holdfast-server")]
#[command(about = "Holdfast game backend protocol server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:7750")]
    bind: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Global cap on in-flight handler executions
    #[arg(long, default_value = "512")]
    max_in_flight: usize,

    /// Per-connection dispatch queue depth
    #[arg(long, default_value = "64")]
    queue_depth: usize,

    /// Per-connection token bucket capacity (frames)
    #[arg(long, default_value = "32")]
    bucket_capacity: u32,

    /// Per-connection token refill rate (frames per second)
    #[arg(long, default_value = "16")]
    bucket_refill: u32,

    /// Idle disconnect threshold in seconds
    #[arg(long, default_value = "60")]
    idle_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Holdfast server starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerConfig {
        bind_address: args.bind,
        max_connections: args.max_connections,
        max_in_flight: args.max_in_flight,
        dispatch_queue_depth: args.queue_depth,
        bucket_capacity: args.bucket_capacity,
        bucket_refill_per_sec: args.bucket_refill,
        idle_timeout: std::time::Duration::from_secs(args.idle_timeout),
        ..ServerConfig::default()
    };

    // Single-node credentials store; a database-backed repository plugs in
    // behind the same contract.
    let server = Server::bind(SystemEnv::new(), MemoryRepository::new(), config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received");
        shutdown.shutdown();
    });

    server.run().await?;

    tracing::info!("Holdfast server stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                tracing::error!(%err, "cannot install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            },
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
