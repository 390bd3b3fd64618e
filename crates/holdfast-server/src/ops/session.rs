//! Authenticated session operations: logout and password rotation.

use std::sync::Arc;

use holdfast_core::{CredentialsRepository, Environment, PermissionLevel, validate::is_strong_password};
use holdfast_crypto::{hash_password, verify_password};
use holdfast_proto::{
    Packet,
    directive::{Advice, Directive, Reason},
    packet::Body,
};

use crate::{
    connection::Connection,
    context::ServerContext,
    registry::{HandlerFuture, Outcome},
};

/// Handle one logout request.
///
/// The permission gate already required `User`; the hub lookup here is a
/// secondary integrity check covering the race where the association
/// vanished between gate and handler.
pub fn logout<'a, E, R>(
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

        let Some(username) = ctx.hub.get_username(conn.id()) else {
            return Ok(Outcome::Control(Directive::error(
                Reason::SessionNotFound,
                Advice::DoNotRetry,
                sequence_id,
            )));
        };

        ctx.repository.stamp_logout(&username, ctx.env.wall_clock_secs()).await?;

        conn.set_level(PermissionLevel::None);
        ctx.hub.dissociate(conn.id());

        tracing::info!(conn = conn.id(), "logout complete");
        Ok(Outcome::ControlThenClose(Directive::disconnect(Reason::ClientQuit, sequence_id)))
    })
}

/// Handle one password-rotation request.
///
/// The update is optimistic: `UPDATE ... WHERE id = ? AND hash = ?`. Zero
/// rows changed means the stored hash moved between read and write, and
/// the client is told to retry.
pub fn change_password<'a, E, R>(
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

        let Body::CredsUpdate(mut request) = packet.body else {
            return Ok(Outcome::Control(Directive::error(
                Reason::UnsupportedPacket,
                Advice::DoNotRetry,
                sequence_id,
            )));
        };

        let Some(username) = ctx.hub.get_username(conn.id()) else {
            request.reset();
            return Ok(Outcome::Control(Directive::error(
                Reason::SessionNotFound,
                Advice::DoNotRetry,
                sequence_id,
            )));
        };

        if !is_strong_password(&request.new_password) {
            request.reset();
            return Ok(Outcome::Control(Directive::error(
                Reason::WeakPassword,
                Advice::FixAndRetry,
                sequence_id,
            )));
        }

        let view = ctx.repository.get_for_password_change_by_username(&username).await?;
        let Some(view) = view else {
            // The account vanished underneath a live session
            request.reset();
            return Ok(Outcome::Control(Directive::error(
                Reason::SessionNotFound,
                Advice::DoNotRetry,
                sequence_id,
            )));
        };

        if !view.is_active {
            request.reset();
            return Ok(Outcome::Control(
                Directive::error(Reason::AccountSuspended, Advice::DoNotRetry, sequence_id)
                    .auth_related(),
            ));
        }

        if !verify_password(&request.current_password, &view.salt, &view.hash) {
            request.reset();
            return Ok(Outcome::Control(
                Directive::error(Reason::Unauthenticated, Advice::Reauthenticate, sequence_id)
                    .auth_related(),
            ));
        }

        // PasswordHash and the view both zeroize on drop
        let hashed = hash_password(&request.new_password, ctx.env.random_array());
        request.reset();

        let changed = ctx
            .repository
            .update_password_if_matches(view.id, &view.hash, hashed.salt, hashed.hash)
            .await?;

        if changed == 0 {
            return Ok(Outcome::Control(
                Directive::error(Reason::ValidationFailed, Advice::BackoffRetry, sequence_id)
                    .transient(),
            ));
        }

        tracing::info!(conn = conn.id(), account = view.id, "password rotated");
        Ok(Outcome::Control(Directive::ack(sequence_id)))
    })
}
