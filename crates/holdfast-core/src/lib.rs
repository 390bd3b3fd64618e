//! Holdfast domain core.
//!
//! Everything the protocol engine knows about accounts, and nothing about
//! sockets: the permission ladder, the credentials record and its
//! authentication views, the repository contract the server consumes, an
//! in-memory repository, input validation, and the [`Environment`]
//! abstraction that keeps time and randomness injectable.
//!
//! The concrete database engine, its schema, and migrations are external
//! collaborators behind [`CredentialsRepository`].

#![forbid(unsafe_code)]

pub mod account;
pub mod env;
mod memory;
mod repository;
pub mod validate;

pub use account::{
    Account, AuthView, LOCKOUT_SECS, MAX_FAILED_LOGINS, NewAccount, PasswordChangeView,
    PermissionLevel,
};
pub use env::Environment;
pub use memory::MemoryRepository;
pub use repository::{CredentialsRepository, RepositoryError};
