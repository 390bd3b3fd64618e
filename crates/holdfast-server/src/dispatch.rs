#![allow(
    clippy::disallowed_types,
    reason = "queue mutex guards short synchronous push/pop critical sections only"
)]

//! Per-connection dispatch channel.
//!
//! Each connection has one bounded FIFO between its read loop (producer)
//! and its dispatcher task (consumer). The dispatcher pops one frame at a
//! time, runs the inbound stages, invokes the handler under its armed
//! deadline, and writes the reply through the outbound stack - so handler
//! execution is strictly serialized per connection while different
//! connections progress in parallel.
//!
//! Backpressure: when the FIFO is full, the oldest queued frame is dropped
//! and the client receives `BACKPRESSURE / BACKOFF_RETRY / IS_TRANSIENT`
//! correlated to the dropped frame.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use holdfast_core::{CredentialsRepository, Environment};
use holdfast_proto::{
    Frame,
    directive::{Advice, Directive, Reason},
};
use tokio::sync::Notify;

use crate::{
    connection::Connection,
    context::ServerContext,
    middleware::{DispatchItem, StageDecision},
    registry::Outcome,
};

/// Bounded single-producer single-consumer frame FIFO.
pub struct DispatchQueue {
    depth: usize,
    frames: Mutex<VecDeque<Frame>>,
    ready: Notify,
}

/// Result of [`DispatchQueue::push`].
#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// Frame queued.
    Queued,
    /// Queue was full; the oldest frame was dropped to make room.
    DroppedOldest {
        /// Correlation token of the dropped frame.
        sequence_id: u32,
        /// Opcode of the dropped frame.
        opcode: u16,
    },
}

impl DispatchQueue {
    /// Create a queue bounded at `depth` frames.
    #[must_use]
    pub fn new(depth: usize) -> Self {
        Self { depth: depth.max(1), frames: Mutex::new(VecDeque::new()), ready: Notify::new() }
    }

    /// Enqueue a frame, evicting the oldest on overflow.
    #[allow(clippy::expect_used)]
    pub fn push(&self, frame: Frame) -> PushOutcome {
        let outcome = {
            let mut frames = self.frames.lock().expect("mutex poisoned");

            let outcome = if frames.len() >= self.depth {
                match frames.pop_front() {
                    Some(dropped) => PushOutcome::DroppedOldest {
                        sequence_id: dropped.header.sequence_id(),
                        opcode: dropped.header.opcode(),
                    },
                    None => PushOutcome::Queued,
                }
            } else {
                PushOutcome::Queued
            };

            frames.push_back(frame);
            outcome
        };

        self.ready.notify_one();
        outcome
    }

    /// Dequeue the next frame, waiting until one arrives.
    #[allow(clippy::expect_used)]
    pub async fn pop(&self) -> Frame {
        loop {
            if let Some(frame) = self.frames.lock().expect("mutex poisoned").pop_front() {
                return frame;
            }
            self.ready.notified().await;
        }
    }

    /// Frames currently queued.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.lock().expect("mutex poisoned").len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Dispatcher task body: serialize handler execution for one connection.
///
/// Runs until the connection begins teardown. Each frame is processed in
/// its own task and awaited before the next pop, so handler execution
/// stays strictly serialized while a panicking handler is confined: the
/// panic is logged and discarded, and the connection keeps dispatching.
pub async fn run_dispatcher<E, R>(
    ctx: Arc<ServerContext<E, R>>,
    conn: Arc<Connection>,
    queue: Arc<DispatchQueue>,
) where
    E: Environment,
    R: CredentialsRepository,
{
    loop {
        let frame = tokio::select! {
            () = conn.closed() => break,
            frame = queue.pop() => frame,
        };

        let task = tokio::spawn({
            let ctx = Arc::clone(&ctx);
            let conn = Arc::clone(&conn);
            async move { process_frame(&ctx, &conn, frame).await }
        });

        if let Err(err) = task.await {
            if err.is_panic() {
                tracing::error!(conn = conn.id(), "handler panicked; frame discarded");
            }
        }
    }

    tracing::debug!(conn = conn.id(), "dispatcher stopped");
}

/// Run one frame through middleware, handler, and reply.
async fn process_frame<E, R>(ctx: &Arc<ServerContext<E, R>>, conn: &Arc<Connection>, frame: Frame)
where
    E: Environment,
    R: CredentialsRepository,
{
    let opcode = frame.header.opcode();
    let sequence_id = frame.header.sequence_id();

    let Some(desc) = ctx.registry.lookup(opcode) else {
        let _ = conn
            .send_directive(
                Directive::error(Reason::UnsupportedPacket, Advice::DoNotRetry, sequence_id),
                opcode,
            )
            .await;
        return;
    };

    let mut item = DispatchItem::new(frame);
    match ctx.pipeline.run_inbound(ctx, conn, desc, &mut item) {
        StageDecision::Continue => {},
        StageDecision::ReplyAndStop(directive) => {
            let _ = conn.send_directive(directive, opcode).await;
            return;
        },
        StageDecision::DropSilently => return,
    }

    let Some(packet) = item.packet.take() else {
        // A Continue pipeline without a parsed packet is a stage-ordering bug
        tracing::error!(conn = conn.id(), opcode, "inbound stack produced no packet");
        let _ = conn
            .send_directive(
                Directive::error(Reason::InternalError, Advice::BackoffRetry, sequence_id)
                    .transient(),
                opcode,
            )
            .await;
        return;
    };

    conn.set_incoming(packet.clone());

    let deadline = item.deadline.unwrap_or(ctx.config.default_handler_timeout);
    let handler = (desc.handler)(ctx, conn, packet);

    let outcome = tokio::select! {
        () = conn.closed() => {
            // Teardown cancels in-flight work for this connection
            let _ = conn
                .send_directive(
                    Directive::error(Reason::Cancelled, Advice::DoNotRetry, sequence_id)
                        .transient(),
                    opcode,
                )
                .await;
            return;
        },
        result = tokio::time::timeout(deadline, handler) => match result {
            Err(_elapsed) => {
                tracing::warn!(conn = conn.id(), opcode, "handler deadline expired");
                let _ = conn
                    .send_directive(
                        Directive::error(Reason::Timeout, Advice::BackoffRetry, sequence_id)
                            .transient(),
                        opcode,
                    )
                    .await;
                return;
            },
            Ok(Err(err)) => {
                tracing::error!(conn = conn.id(), opcode, %err, "handler failed");
                let _ = conn
                    .send_directive(
                        Directive::error(Reason::InternalError, Advice::BackoffRetry, sequence_id)
                            .transient(),
                        opcode,
                    )
                    .await;
                return;
            },
            Ok(Ok(outcome)) => outcome,
        },
    };

    match outcome {
        Outcome::Reply(mut reply) => {
            if let Err(err) = ctx.pipeline.run_outbound(ctx, conn, desc, &mut reply) {
                tracing::error!(conn = conn.id(), opcode, %err, "outbound stack failed");
                let _ = conn
                    .send_directive(
                        Directive::error(Reason::InternalError, Advice::BackoffRetry, sequence_id)
                            .transient(),
                        opcode,
                    )
                    .await;
                return;
            }

            if !conn.send(&reply).await {
                tracing::debug!(conn = conn.id(), opcode, "peer gone before reply");
            }
            ctx.pool.put_body(reply.body);
        },

        Outcome::Control(directive) => {
            let _ = conn.send_directive(directive, opcode).await;
        },

        Outcome::ControlThenClose(directive) => {
            let _ = conn.send_directive(directive, opcode).await;
            conn.disconnect();
        },

        Outcome::Done => {},
    }

    // item.permit drops here, releasing the global concurrency slot
}
