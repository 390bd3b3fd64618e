//! Handler registry.
//!
//! A data table of handler descriptors, frozen at startup: opcode →
//! `{required_level, requires_encryption, timeout, rate_limit, handler}`.
//! Lookup is O(1). There is no runtime registration; the table is built
//! once by [`crate::ops::standard_registry`] and never mutated.

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc, time::Duration};

use holdfast_core::{CredentialsRepository, Environment, PermissionLevel};
use holdfast_proto::{Opcode, Packet, directive::Directive};

use crate::{
    connection::Connection, context::ServerContext, error::ServerError, limiter::RateLimitSpec,
};

/// What a handler produced.
///
/// Handlers never write to the socket for replies (the dispatcher applies
/// the outbound stack and sends), with one exception: [`Outcome::Done`]
/// marks handlers that sent their own reply because they must observe the
/// send result (handshake rollback).
#[derive(Debug)]
pub enum Outcome {
    /// Reply packet; goes through the outbound stack.
    Reply(Packet),
    /// Control reply (ACK or error directive).
    Control(Directive),
    /// Control reply, then close the connection (logout).
    ControlThenClose(Directive),
    /// Handler already replied and handled its own failure path.
    Done,
}

/// Boxed handler future, borrowed from the dispatch call.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<Outcome, ServerError>> + Send + 'a>>;

/// Handler entry point.
pub type HandlerFn<E, R> =
    for<'a> fn(&'a ServerContext<E, R>, &'a Arc<Connection>, Packet) -> HandlerFuture<'a>;

/// Static metadata plus entry point for one operation.
pub struct HandlerDescriptor<E: Environment, R: CredentialsRepository> {
    /// Operation this descriptor serves.
    pub opcode: Opcode,
    /// Minimum permission level; gated before anything else runs.
    pub required_level: PermissionLevel,
    /// Whether frames must arrive with sealed fields (and replies leave
    /// with them).
    pub requires_encryption: bool,
    /// Handler deadline; `None` falls back to the server default.
    pub timeout: Option<Duration>,
    /// Per-connection leaky rate limit; `None` means unlimited.
    pub rate_limit: Option<RateLimitSpec>,
    /// Entry point.
    pub handler: HandlerFn<E, R>,
}

/// Immutable opcode → descriptor table.
pub struct HandlerRegistry<E: Environment, R: CredentialsRepository> {
    by_opcode: HashMap<u16, HandlerDescriptor<E, R>>,
}

impl<E: Environment, R: CredentialsRepository> HandlerRegistry<E, R> {
    /// Build a registry from descriptors.
    ///
    /// # Panics
    ///
    /// Panics on duplicate opcodes: the table is assembled from compile-time
    /// constants and a collision is a programming error, caught at startup
    /// rather than smuggled into dispatch.
    #[allow(clippy::panic)]
    #[must_use]
    pub fn from_descriptors(descriptors: Vec<HandlerDescriptor<E, R>>) -> Self {
        let mut by_opcode = HashMap::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let opcode = descriptor.opcode.to_u16();
            if by_opcode.insert(opcode, descriptor).is_some() {
                panic!("duplicate handler registration for opcode {opcode:#06x}");
            }
        }

        Self { by_opcode }
    }

    /// Descriptor for an opcode. `None` means unsupported.
    #[must_use]
    pub fn lookup(&self, opcode: u16) -> Option<&HandlerDescriptor<E, R>> {
        self.by_opcode.get(&opcode)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_opcode.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_opcode.is_empty()
    }
}

impl<E: Environment, R: CredentialsRepository> std::fmt::Debug for HandlerRegistry<E, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut opcodes: Vec<u16> = self.by_opcode.keys().copied().collect();
        opcodes.sort_unstable();
        f.debug_struct("HandlerRegistry").field("opcodes", &opcodes).finish()
    }
}
