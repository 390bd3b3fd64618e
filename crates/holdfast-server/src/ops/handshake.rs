//! Ephemeral Diffie-Hellman handshake.
//!
//! The client sends its raw X25519 public key; the server generates an
//! ephemeral keypair, derives `session_key = Keccak-256(X25519(priv,
//! peer_pub))`, installs it on the connection, elevates the level to
//! `Guest`, and replies with its own public key. The private scalar and
//! shared point are wiped on the exit path; only the derived key survives,
//! and it never crosses the wire.

use std::sync::Arc;

use holdfast_core::{CredentialsRepository, Environment, PermissionLevel};
use holdfast_crypto::Keypair;
use holdfast_proto::{
    FrameFlags, Opcode, Packet,
    directive::{Advice, Directive, Reason},
    packet::{Body, HandshakePacket, PUBLIC_KEY_LEN},
};

use crate::{
    connection::Connection,
    context::ServerContext,
    registry::{HandlerFuture, Outcome},
};

/// Handle one handshake request.
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

        let Body::Handshake(request) = packet.body else {
            return Ok(Outcome::Control(Directive::error(
                Reason::UnsupportedPacket,
                Advice::DoNotRetry,
                sequence_id,
            )));
        };

        if request.public_key.is_empty() {
            return Ok(Outcome::Control(Directive::error(
                Reason::MissingRequiredField,
                Advice::FixAndRetry,
                sequence_id,
            )));
        }

        if request.public_key.len() != PUBLIC_KEY_LEN {
            return Ok(Outcome::Control(Directive::error(
                Reason::ValidationFailed,
                Advice::FixAndRetry,
                sequence_id,
            )));
        }

        let keypair = Keypair::from_seed(ctx.env.random_array());
        let server_public = keypair.public_bytes();

        let session_key = match keypair.agree(&request.public_key) {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(conn = conn.id(), %err, "key agreement failed");
                conn.clear_secret();
                conn.set_level(PermissionLevel::None);
                return Ok(Outcome::Control(
                    Directive::error(Reason::InternalError, Advice::BackoffRetry, sequence_id)
                        .transient(),
                ));
            },
        };

        conn.set_secret(session_key);
        conn.set_level(PermissionLevel::Guest);

        let mut reply_body: HandshakePacket = ctx.pool.get();
        reply_body.public_key.extend_from_slice(&server_public);
        let reply = Packet {
            opcode: Opcode::Handshake.to_u16(),
            flags: FrameFlags::default(),
            sequence_id,
            body: Body::Handshake(reply_body),
        };

        if conn.send(&reply).await {
            tracing::debug!(conn = conn.id(), "handshake complete");
            ctx.pool.put_body(reply.body);
            return Ok(Outcome::Done);
        }

        // The reply never reached the peer: the client cannot know the key,
        // so drop it and tear down. The level stays Guest here - parity
        // with the shipped behavior (a Guest without a key cannot pass the
        // unwrap stage anyway, so the window is inert).
        tracing::debug!(conn = conn.id(), "handshake reply undeliverable, rolling back");
        conn.clear_secret();
        conn.disconnect();
        ctx.pool.put_body(reply.body);
        Ok(Outcome::Done)
    })
}
