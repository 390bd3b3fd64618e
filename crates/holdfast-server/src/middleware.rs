//! Middleware pipeline.
//!
//! Ordered inbound stages run between frame arrival and handler execution;
//! the outbound stage runs between handler reply and the socket. Each
//! inbound stage is a transformation of `(item, connection)` into a
//! [`StageDecision`]; the first non-`Continue` decision short-circuits the
//! chain.
//!
//! Inbound order (fixed by [`Pipeline::standard`]):
//!
//! 1. Permission - gate on `connection.level`
//! 2. Token bucket - per-connection admission
//! 3. Concurrency - global in-flight slot
//! 4. Handler rate - per-connection-per-opcode window
//! 5. Unwrap - decompress payload, parse body, unseal string fields
//! 6. Timeout - arm the per-handler deadline
//!
//! Outbound: Wrap - seal string fields and set ENCRYPTED when the handler
//! requires it.
//!
//! A stage that detects a fatal-session condition (corrupt payload) calls
//! `connection.disconnect()` and returns [`StageDecision::DropSilently`]:
//! fatal frames get no directive.

use std::sync::Arc;

use holdfast_core::{CredentialsRepository, Environment};
use holdfast_crypto::{inflate, open_field, seal_field};
use holdfast_proto::{
    Frame, Packet,
    directive::{Advice, Directive, Reason},
};
use tokio::sync::OwnedSemaphorePermit;

use crate::{
    connection::Connection, context::ServerContext, error::ServerError,
    registry::HandlerDescriptor,
};

/// One frame moving through the inbound stages.
pub struct DispatchItem {
    /// The raw frame as decoded by the read loop.
    pub frame: Frame,
    /// Parsed, unsealed packet; filled by the unwrap stage.
    pub packet: Option<Packet>,
    /// Global concurrency slot; held until the handler finishes.
    pub permit: Option<OwnedSemaphorePermit>,
    /// Handler deadline; armed by the timeout stage.
    pub deadline: Option<std::time::Duration>,
}

impl DispatchItem {
    /// Wrap a freshly dequeued frame.
    #[must_use]
    pub fn new(frame: Frame) -> Self {
        Self { frame, packet: None, permit: None, deadline: None }
    }

    /// Correlation token from the frame header.
    #[must_use]
    pub fn sequence_id(&self) -> u32 {
        self.frame.header.sequence_id()
    }
}

/// What a stage decided.
#[derive(Debug)]
pub enum StageDecision {
    /// Pass to the next stage.
    Continue,
    /// Write this directive and stop; the handler never runs.
    ReplyAndStop(Directive),
    /// Stop without any reply (fatal-session paths).
    DropSilently,
}

/// One inbound stage.
pub trait InboundStage<E: Environment, R: CredentialsRepository>: Send + Sync {
    /// Stage name for logs.
    fn name(&self) -> &'static str;

    /// Inspect/transform the item; first non-`Continue` wins.
    fn apply(
        &self,
        ctx: &ServerContext<E, R>,
        conn: &Arc<Connection>,
        desc: &HandlerDescriptor<E, R>,
        item: &mut DispatchItem,
    ) -> StageDecision;
}

/// One outbound stage.
pub trait OutboundStage<E: Environment, R: CredentialsRepository>: Send + Sync {
    /// Stage name for logs.
    fn name(&self) -> &'static str;

    /// Transform the reply in place before serialization.
    fn apply(
        &self,
        ctx: &ServerContext<E, R>,
        conn: &Arc<Connection>,
        desc: &HandlerDescriptor<E, R>,
        reply: &mut Packet,
    ) -> Result<(), ServerError>;
}

/// Ordered stage stacks, assembled once at startup.
pub struct Pipeline<E: Environment, R: CredentialsRepository> {
    inbound: Vec<Box<dyn InboundStage<E, R>>>,
    outbound: Vec<Box<dyn OutboundStage<E, R>>>,
}

impl<E: Environment, R: CredentialsRepository> Pipeline<E, R> {
    /// The standard six-stage inbound / one-stage outbound pipeline.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            inbound: vec![
                Box::new(PermissionStage),
                Box::new(TokenBucketStage),
                Box::new(ConcurrencyStage),
                Box::new(HandlerRateStage),
                Box::new(UnwrapStage),
                Box::new(TimeoutStage),
            ],
            outbound: vec![Box::new(WrapStage)],
        }
    }

    /// Run the inbound stack. Short-circuits on the first non-`Continue`.
    pub fn run_inbound(
        &self,
        ctx: &ServerContext<E, R>,
        conn: &Arc<Connection>,
        desc: &HandlerDescriptor<E, R>,
        item: &mut DispatchItem,
    ) -> StageDecision {
        for stage in &self.inbound {
            match stage.apply(ctx, conn, desc, item) {
                StageDecision::Continue => {},
                decision => {
                    tracing::debug!(
                        conn = conn.id(),
                        stage = stage.name(),
                        ?decision,
                        "inbound stage stopped dispatch"
                    );
                    return decision;
                },
            }
        }
        StageDecision::Continue
    }

    /// Run the outbound stack over a reply.
    pub fn run_outbound(
        &self,
        ctx: &ServerContext<E, R>,
        conn: &Arc<Connection>,
        desc: &HandlerDescriptor<E, R>,
        reply: &mut Packet,
    ) -> Result<(), ServerError> {
        for stage in &self.outbound {
            stage.apply(ctx, conn, desc, reply)?;
        }
        Ok(())
    }
}

/// Stage 1: permission gate.
///
/// The directive vocabulary has no dedicated "unauthorized" reason; failed
/// gates answer `UNAUTHENTICATED / DO_NOT_RETRY` with the auth-related
/// qualifier.
struct PermissionStage;

impl<E: Environment, R: CredentialsRepository> InboundStage<E, R> for PermissionStage {
    fn name(&self) -> &'static str {
        "permission"
    }

    fn apply(
        &self,
        _ctx: &ServerContext<E, R>,
        conn: &Arc<Connection>,
        desc: &HandlerDescriptor<E, R>,
        item: &mut DispatchItem,
    ) -> StageDecision {
        if conn.level() >= desc.required_level {
            return StageDecision::Continue;
        }

        StageDecision::ReplyAndStop(
            Directive::error(Reason::Unauthenticated, Advice::DoNotRetry, item.sequence_id())
                .auth_related(),
        )
    }
}

/// Stage 2: per-connection token bucket.
struct TokenBucketStage;

impl<E: Environment, R: CredentialsRepository> InboundStage<E, R> for TokenBucketStage {
    fn name(&self) -> &'static str {
        "token-bucket"
    }

    fn apply(
        &self,
        ctx: &ServerContext<E, R>,
        conn: &Arc<Connection>,
        _desc: &HandlerDescriptor<E, R>,
        item: &mut DispatchItem,
    ) -> StageDecision {
        if conn.admit_frame(ctx.env.now()) {
            return StageDecision::Continue;
        }

        StageDecision::ReplyAndStop(
            Directive::error(Reason::RateLimited, Advice::BackoffRetry, item.sequence_id())
                .transient(),
        )
    }
}

/// Stage 3: global concurrency slot.
struct ConcurrencyStage;

impl<E: Environment, R: CredentialsRepository> InboundStage<E, R> for ConcurrencyStage {
    fn name(&self) -> &'static str {
        "concurrency"
    }

    fn apply(
        &self,
        ctx: &ServerContext<E, R>,
        _conn: &Arc<Connection>,
        _desc: &HandlerDescriptor<E, R>,
        item: &mut DispatchItem,
    ) -> StageDecision {
        match ctx.concurrency.try_acquire() {
            Some(permit) => {
                item.permit = Some(permit);
                StageDecision::Continue
            },
            None => StageDecision::ReplyAndStop(
                Directive::error(
                    Reason::ConcurrencyExceeded,
                    Advice::BackoffRetry,
                    item.sequence_id(),
                )
                .transient(),
            ),
        }
    }
}

/// Stage 4: per-handler leaky window.
struct HandlerRateStage;

impl<E: Environment, R: CredentialsRepository> InboundStage<E, R> for HandlerRateStage {
    fn name(&self) -> &'static str {
        "handler-rate"
    }

    fn apply(
        &self,
        ctx: &ServerContext<E, R>,
        conn: &Arc<Connection>,
        desc: &HandlerDescriptor<E, R>,
        item: &mut DispatchItem,
    ) -> StageDecision {
        let Some(spec) = desc.rate_limit else {
            return StageDecision::Continue;
        };

        if conn.admit_handler_call(item.frame.header.opcode(), spec, ctx.env.now()) {
            return StageDecision::Continue;
        }

        StageDecision::ReplyAndStop(
            Directive::error(Reason::RateLimited, Advice::BackoffRetry, item.sequence_id())
                .transient(),
        )
    }
}

/// Stage 5: unwrap - decompress, parse, unseal; clears the transform flags.
struct UnwrapStage;

impl<E: Environment, R: CredentialsRepository> InboundStage<E, R> for UnwrapStage {
    fn name(&self) -> &'static str {
        "unwrap"
    }

    fn apply(
        &self,
        _ctx: &ServerContext<E, R>,
        conn: &Arc<Connection>,
        desc: &HandlerDescriptor<E, R>,
        item: &mut DispatchItem,
    ) -> StageDecision {
        let flags = item.frame.header.flags();
        let sequence_id = item.sequence_id();

        // S5 contract: an encryption-requiring handler never sees a
        // plaintext frame.
        if desc.requires_encryption && !flags.encrypted() {
            return StageDecision::ReplyAndStop(Directive::error(
                Reason::NotEncrypted,
                Advice::DoNotRetry,
                sequence_id,
            ));
        }

        let frame = if flags.compressed() {
            match inflate(&item.frame.payload, Frame::MAX_PAYLOAD) {
                Ok(inflated) => match Frame::new(item.frame.header, inflated) {
                    Ok(frame) => frame,
                    Err(err) => {
                        tracing::warn!(conn = conn.id(), %err, "inflated payload oversized");
                        conn.disconnect();
                        return StageDecision::DropSilently;
                    },
                },
                Err(err) => {
                    tracing::warn!(conn = conn.id(), %err, "corrupt compressed payload");
                    conn.disconnect();
                    return StageDecision::DropSilently;
                },
            }
        } else {
            item.frame.clone()
        };

        let mut packet = match Packet::from_frame(&frame) {
            Ok(packet) => packet,
            Err(err) => {
                tracing::warn!(conn = conn.id(), %err, "malformed payload");
                conn.disconnect();
                return StageDecision::DropSilently;
            },
        };

        if flags.encrypted() {
            let Some(key) = conn.secret() else {
                // Flagged as sealed but this session has no key to open it
                return StageDecision::ReplyAndStop(Directive::error(
                    Reason::NotEncrypted,
                    Advice::DoNotRetry,
                    sequence_id,
                ));
            };

            for field in packet.sealed_fields_mut() {
                match open_field(&key, field) {
                    Ok(plaintext) => *field = plaintext,
                    Err(_) => {
                        return StageDecision::ReplyAndStop(Directive::error(
                            Reason::ValidationFailed,
                            Advice::FixAndRetry,
                            sequence_id,
                        ));
                    },
                }
            }
        }

        packet.flags = packet.flags.with_encrypted(false).with_compressed(false);
        item.packet = Some(packet);
        StageDecision::Continue
    }
}

/// Stage 6: arm the per-handler deadline.
struct TimeoutStage;

impl<E: Environment, R: CredentialsRepository> InboundStage<E, R> for TimeoutStage {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn apply(
        &self,
        ctx: &ServerContext<E, R>,
        _conn: &Arc<Connection>,
        desc: &HandlerDescriptor<E, R>,
        item: &mut DispatchItem,
    ) -> StageDecision {
        item.deadline = Some(desc.timeout.unwrap_or(ctx.config.default_handler_timeout));
        StageDecision::Continue
    }
}

/// Outbound: seal reply string fields when the handler requires encryption.
struct WrapStage;

impl<E: Environment, R: CredentialsRepository> OutboundStage<E, R> for WrapStage {
    fn name(&self) -> &'static str {
        "wrap"
    }

    fn apply(
        &self,
        ctx: &ServerContext<E, R>,
        conn: &Arc<Connection>,
        desc: &HandlerDescriptor<E, R>,
        reply: &mut Packet,
    ) -> Result<(), ServerError> {
        if !desc.requires_encryption || reply.sealed_fields_mut().is_empty() {
            return Ok(());
        }

        let Some(key) = conn.secret() else {
            // Unwrap enforced the secret before the handler ran; losing it
            // mid-operation is a teardown race, not a client error.
            return Err(ServerError::Internal(format!(
                "connection {} lost its session key before wrap",
                conn.id()
            )));
        };

        for field in reply.sealed_fields_mut() {
            let sealed = seal_field(&key, field, ctx.env.random_array());
            *field = sealed;
        }

        reply.flags = reply.flags.with_encrypted(true);
        Ok(())
    }
}
