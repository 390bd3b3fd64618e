//! Account registration.

use std::sync::Arc;

use holdfast_core::{
    CredentialsRepository, Environment, NewAccount,
    validate::{is_strong_password, is_valid_username},
};
use holdfast_crypto::hash_password;
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

/// Handle one registration request.
///
/// Insert is insert-or-ignore on the username: a returned id ≤ 0 means the
/// name was taken (possibly by a concurrent registration - exactly one of
/// two racers gets the ACK). Password material is zeroized on every path.
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

        if !is_valid_username(&request.username) {
            request.reset();
            return Ok(Outcome::Control(Directive::error(
                Reason::InvalidUsername,
                Advice::FixAndRetry,
                sequence_id,
            )));
        }

        if !is_strong_password(&request.password) {
            request.reset();
            return Ok(Outcome::Control(Directive::error(
                Reason::WeakPassword,
                Advice::FixAndRetry,
                sequence_id,
            )));
        }

        // NewAccount and PasswordHash both zeroize on drop
        let hashed = hash_password(&request.password, ctx.env.random_array());
        let account = NewAccount {
            username: request.username.clone(),
            salt: hashed.salt,
            hash: hashed.hash,
            created_at: ctx.env.wall_clock_secs(),
        };
        request.reset();

        let id = ctx.repository.insert_or_ignore(account).await?;
        if id <= 0 {
            return Ok(Outcome::Control(Directive::error(
                Reason::AlreadyExists,
                Advice::FixAndRetry,
                sequence_id,
            )));
        }

        tracing::info!(conn = conn.id(), account = id, "account registered");
        Ok(Outcome::Control(Directive::ack(sequence_id)))
    })
}
