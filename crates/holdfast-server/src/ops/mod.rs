//! Operation handlers.
//!
//! One module per operation family: key exchange ([`handshake`]), account
//! creation ([`register`]), credential verification ([`login`]), and the
//! authenticated session operations ([`session`]).
//!
//! [`standard_registry`] is the single registration point: it pins each
//! opcode's permission gate, encryption requirement, deadline, and rate
//! limit. The registry is frozen once built.

pub mod handshake;
pub mod login;
pub mod register;
pub mod session;

use std::time::Duration;

use holdfast_core::{CredentialsRepository, Environment, PermissionLevel};
use holdfast_proto::Opcode;

use crate::{
    limiter::RateLimitSpec,
    registry::{HandlerDescriptor, HandlerRegistry},
};

/// Per-minute window shared by the credential operations.
const MINUTE: Duration = Duration::from_secs(60);

/// Build the descriptor table for the five built-in operations.
#[must_use]
pub fn standard_registry<E, R>() -> HandlerRegistry<E, R>
where
    E: Environment,
    R: CredentialsRepository,
{
    HandlerRegistry::from_descriptors(vec![
        HandlerDescriptor {
            opcode: Opcode::Handshake,
            required_level: PermissionLevel::None,
            requires_encryption: false,
            timeout: Some(Duration::from_secs(2)),
            rate_limit: Some(RateLimitSpec { max_calls: 5, window: MINUTE }),
            handler: handshake::handle,
        },
        HandlerDescriptor {
            opcode: Opcode::Register,
            required_level: PermissionLevel::Guest,
            requires_encryption: true,
            timeout: None,
            rate_limit: Some(RateLimitSpec { max_calls: 5, window: MINUTE }),
            handler: register::handle,
        },
        HandlerDescriptor {
            opcode: Opcode::Login,
            required_level: PermissionLevel::Guest,
            requires_encryption: true,
            timeout: None,
            // Wide enough that the account lockout trips before the limiter
            rate_limit: Some(RateLimitSpec { max_calls: 10, window: MINUTE }),
            handler: login::handle,
        },
        HandlerDescriptor {
            opcode: Opcode::Logout,
            required_level: PermissionLevel::User,
            requires_encryption: false,
            timeout: Some(Duration::from_secs(2)),
            rate_limit: None,
            handler: session::logout,
        },
        HandlerDescriptor {
            opcode: Opcode::ChangePassword,
            required_level: PermissionLevel::User,
            requires_encryption: true,
            timeout: None,
            rate_limit: Some(RateLimitSpec { max_calls: 5, window: MINUTE }),
            handler: session::change_password,
        },
    ])
}
