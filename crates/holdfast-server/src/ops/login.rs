//! Credential verification and session elevation.
//!
//! # Security
//!
//! - Unknown usernames burn the same PBKDF2 cost as wrong passwords
//!   (`verify_sink`), so lookup misses are not a username oracle.
//! - Five consecutive failures lock the account for three minutes from the
//!   last failure; the lockout check runs before verification so a locked
//!   account leaks nothing about the password.
//! - The failed-login counter and stamps are updated atomically by the
//!   repository.

use std::sync::Arc;

use holdfast_core::{CredentialsRepository, Environment, PermissionLevel};
use holdfast_crypto::{verify_password, verify_sink};
use holdfast_proto::{
    Packet,
    directive::{Advice, Directive, Reason},
    packet::Body,
};

use crate::{
    connection::Connection,
    context::ServerContext,
    hub::AssociateOutcome,
    registry::{HandlerFuture, Outcome},
};

/// Handle one login request.
pub fn handle<'a, E, R>(
    ctx: &'a ServerContext<E, R>,
    conn: &'a Arc<Connection>,
    packet: Packet,
) -> HandlerFuture<'a>
where
    E: Environment,
    R: CredentialsRepository,
{
    Box::pin(async move {
        let sequence_id = packet.sequence_id;

        let Body::Credentials(mut request) = packet.body else {
            return Ok(Outcome::Control(Directive::error(
                Reason::UnsupportedPacket,
                Advice::DoNotRetry,
                sequence_id,
            )));
        };

        if request.username.is_empty() || request.password.is_empty() {
            request.reset();
            return Ok(Outcome::Control(Directive::error(
                Reason::MissingRequiredField,
                Advice::FixAndRetry,
                sequence_id,
            )));
        }

        let view = ctx.repository.get_auth_view_by_username(&request.username).await?;
        let Some(view) = view else {
            // Equalize timing with the known-user path before answering
            verify_sink(&request.password);
            request.reset();
            return Ok(Outcome::Control(
                Directive::error(Reason::Unauthenticated, Advice::Reauthenticate, sequence_id)
                    .auth_related(),
            ));
        };

        let now_secs = ctx.env.wall_clock_secs();

        if view.locked_at(now_secs) {
            request.reset();
            return Ok(Outcome::Control(
                Directive::error(Reason::AccountLocked, Advice::BackoffRetry, sequence_id)
                    .auth_related(),
            ));
        }

        let verified = verify_password(&request.password, &view.salt, &view.hash);
        let username = std::mem::take(&mut request.username);
        request.reset();

        if !verified {
            ctx.repository.increment_failed(view.id, now_secs).await?;
            tracing::debug!(conn = conn.id(), "login failed");
            return Ok(Outcome::Control(
                Directive::error(Reason::Unauthenticated, Advice::Reauthenticate, sequence_id)
                    .auth_related(),
            ));
        }

        if !view.is_active {
            return Ok(Outcome::Control(
                Directive::error(Reason::AccountSuspended, Advice::DoNotRetry, sequence_id)
                    .auth_related(),
            ));
        }

        ctx.repository.reset_failed_and_stamp_login(view.id, now_secs).await?;

        // At least User; the stored role can elevate further
        conn.set_level(view.role.max(PermissionLevel::User));

        match ctx.hub.associate_username(conn.id(), &username) {
            AssociateOutcome::Bound { evicted: Some(previous) } => {
                tracing::info!(
                    conn = conn.id(),
                    evicted = previous.id(),
                    "username takeover, disconnecting previous session"
                );
                previous.disconnect();
            },
            AssociateOutcome::Bound { evicted: None } => {},
            AssociateOutcome::UnknownConnection => {
                // Teardown raced the login; nothing to associate
                tracing::debug!(conn = conn.id(), "login finished on unregistered connection");
            },
        }

        tracing::info!(conn = conn.id(), account = view.id, "login complete");
        Ok(Outcome::Control(Directive::ack(sequence_id)))
    })
}
