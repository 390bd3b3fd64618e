//! TCP listener and per-connection tasks.
//!
//! The accept loop admits sockets under a connection-count semaphore and
//! spawns three tasks per connection: this read loop (frames bytes and
//! feeds the dispatch queue), a writer task (drains the outbound byte
//! channel in order), and the dispatcher (serializes handler execution).
//!
//! Teardown paths: peer close, read error, idle timeout, codec errors
//! beyond `Incomplete` (fatal, no directive), hub-initiated disconnect, and
//! server shutdown (stop accepting, then drain under the grace deadline).

use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::{Buf, Bytes, BytesMut};
use holdfast_core::{CredentialsRepository, Environment};
use holdfast_proto::{
    Frame,
    directive::{Advice, Directive, Reason},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::{OwnedSemaphorePermit, Semaphore, mpsc, watch},
};

use crate::{
    config::ServerConfig,
    connection::{Connection, OUTBOUND_DEPTH},
    context::ServerContext,
    dispatch::{DispatchQueue, PushOutcome, run_dispatcher},
    error::ServerError,
};

/// Read buffer granularity.
const READ_CHUNK: usize = 4 * 1024;

/// A bound Holdfast server.
pub struct Server<E: Environment, R: CredentialsRepository> {
    ctx: Arc<ServerContext<E, R>>,
    listener: TcpListener,
    shutdown: watch::Sender<bool>,
}

/// Handle that triggers graceful shutdown from outside the accept loop.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Begin graceful shutdown: stop accepting, drain, then exit.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

impl<E: Environment, R: CredentialsRepository> Server<E, R> {
    /// Bind the listen endpoint and wire the context.
    pub async fn bind(env: E, repository: R, config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_address).await.map_err(|err| {
            ServerError::Config(format!("cannot bind '{}': {err}", config.bind_address))
        })?;

        let ctx = ServerContext::new(env, repository, config);
        let (shutdown, _) = watch::channel(false);

        Ok(Self { ctx, listener, shutdown })
    }

    /// Local address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shutdown trigger for signal handlers and tests.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { tx: self.shutdown.clone() }
    }

    /// Shared context (observability/test hook).
    #[must_use]
    pub fn context(&self) -> Arc<ServerContext<E, R>> {
        Arc::clone(&self.ctx)
    }

    /// Accept connections until shutdown is triggered, then drain.
    pub async fn run(self) -> Result<(), ServerError> {
        let Self { ctx, listener, shutdown } = self;
        let admission = Arc::new(Semaphore::new(ctx.config.max_connections));
        let mut shutdown_rx = shutdown.subscribe();

        tracing::info!(addr = %listener.local_addr()?, "listener started");

        loop {
            if *shutdown_rx.borrow_and_update() {
                break;
            }

            let permit = tokio::select! {
                _ = shutdown_rx.changed() => break,
                permit = Arc::clone(&admission).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let accepted = tokio::select! {
                _ = shutdown_rx.changed() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, remote)) => {
                    let ctx = Arc::clone(&ctx);
                    let shutdown_rx = shutdown.subscribe();
                    tokio::spawn(async move {
                        handle_connection(ctx, stream, remote, permit, shutdown_rx).await;
                    });
                },
                Err(err) => {
                    tracing::error!(%err, "failed to accept incoming connection");
                },
            }
        }

        drain(&ctx).await;
        Ok(())
    }
}

/// Signal every connection and wait for teardown under the grace deadline.
async fn drain<E: Environment, R: CredentialsRepository>(ctx: &Arc<ServerContext<E, R>>) {
    let live = ctx.hub.len();
    tracing::info!(connections = live, "shutting down, draining");

    for conn in ctx.hub.enumerate() {
        conn.stop_accepting();
        conn.disconnect();
    }

    let deadline = ctx.config.shutdown_grace;
    let drained = tokio::time::timeout(deadline, async {
        while !ctx.hub.is_empty() {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await;

    match drained {
        Ok(()) => tracing::info!("drain complete"),
        Err(_) => tracing::warn!(remaining = ctx.hub.len(), "drain deadline expired"),
    }
}

/// Own one connection: register it, spawn its writer and dispatcher, frame
/// its byte stream, release everything on exit.
async fn handle_connection<E: Environment, R: CredentialsRepository>(
    ctx: Arc<ServerContext<E, R>>,
    stream: TcpStream,
    remote: SocketAddr,
    permit: OwnedSemaphorePermit,
    shutdown: watch::Receiver<bool>,
) {
    if let Err(err) = stream.set_nodelay(true) {
        tracing::warn!(%err, "failed to set TCP_NODELAY");
    }

    let id = ctx.hub.allocate_id();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_DEPTH);
    let conn = Arc::new(Connection::new(
        id,
        remote,
        outbound_tx,
        ctx.config.bucket_capacity,
        ctx.config.bucket_refill_per_sec,
        ctx.env.now(),
    ));

    if ctx.hub.register(Arc::clone(&conn)).is_none() {
        tracing::error!(conn = id, "connection id collision");
        return;
    }
    tracing::debug!(conn = id, %remote, "connection accepted");

    let (read_half, write_half) = stream.into_split();
    let queue = Arc::new(DispatchQueue::new(ctx.config.dispatch_queue_depth));

    let writer = tokio::spawn(write_loop(Arc::clone(&conn), write_half, outbound_rx));
    let dispatcher =
        tokio::spawn(run_dispatcher(Arc::clone(&ctx), Arc::clone(&conn), Arc::clone(&queue)));

    read_loop(&ctx.config, &conn, read_half, &queue, shutdown).await;

    // Let already-queued frames finish dispatching before teardown
    let settle = async {
        while !queue.is_empty() && !conn.is_closing() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    let _ = tokio::time::timeout(Duration::from_secs(1), settle).await;

    conn.disconnect();
    ctx.hub.unregister(id);
    let _ = writer.await;
    let _ = dispatcher.await;

    tracing::debug!(conn = id, "connection released");
    drop(permit);
}

/// Frame the byte stream and feed the dispatch queue.
async fn read_loop(
    config: &ServerConfig,
    conn: &Arc<Connection>,
    mut read_half: OwnedReadHalf,
    queue: &Arc<DispatchQueue>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    'outer: while conn.is_accepting() {
        tokio::select! {
            () = conn.closed() => break,

            _ = shutdown.changed() => {
                tracing::debug!(conn = conn.id(), "server shutdown, read loop stopping");
                conn.stop_accepting();
                break;
            },

            () = tokio::time::sleep(config.idle_timeout) => {
                tracing::debug!(conn = conn.id(), "idle timeout");
                break;
            },

            result = read_half.read_buf(&mut buf) => {
                match result {
                    Ok(0) => {
                        tracing::debug!(conn = conn.id(), "peer closed");
                        break;
                    },
                    Ok(_) => {},
                    Err(err) => {
                        tracing::debug!(conn = conn.id(), %err, "read failed");
                        break;
                    },
                }

                // Extract every complete frame the buffer now holds
                loop {
                    match Frame::decode(&buf) {
                        Ok(frame) => {
                            buf.advance(frame.wire_len());

                            match queue.push(frame) {
                                PushOutcome::Queued => {},
                                PushOutcome::DroppedOldest { sequence_id, opcode } => {
                                    tracing::warn!(
                                        conn = conn.id(),
                                        "dispatch queue overflow, dropped oldest"
                                    );
                                    let _ = conn
                                        .send_directive(
                                            Directive::error(
                                                Reason::Backpressure,
                                                Advice::BackoffRetry,
                                                sequence_id,
                                            )
                                            .transient(),
                                            opcode,
                                        )
                                        .await;
                                },
                            }
                        },
                        Err(err) if err.is_incomplete() => break,
                        Err(err) => {
                            // Fatal session: disconnect without directive
                            tracing::warn!(conn = conn.id(), %err, "corrupt frame");
                            conn.disconnect();
                            break 'outer;
                        },
                    }
                }
            },
        }
    }
}

/// Drain the outbound channel into the socket, preserving order.
async fn write_loop(
    conn: Arc<Connection>,
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Bytes>,
) {
    loop {
        tokio::select! {
            biased;

            maybe = outbound.recv() => match maybe {
                Some(bytes) => {
                    if let Err(err) = write_half.write_all(&bytes).await {
                        tracing::debug!(conn = conn.id(), %err, "write failed");
                        conn.disconnect();
                        break;
                    }
                },
                None => break,
            },

            () = conn.closed() => {
                // Flush what was queued before teardown (logout's
                // DISCONNECT directive rides this path)
                while let Ok(bytes) = outbound.try_recv() {
                    if write_half.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
                break;
            },
        }
    }

    let _ = write_half.shutdown().await;
}
