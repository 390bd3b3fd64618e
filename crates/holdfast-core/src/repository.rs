//! Credentials repository contract.
//!
//! Trait-based abstraction over whatever persists accounts. The server core
//! consumes exactly these seven operations; engine choice, schema, and
//! migrations live behind the trait (out of scope for the core).
//!
//! Methods are async because repository calls are suspension points: the
//! dispatcher's per-handler deadline must be able to cancel a slow backend.

use async_trait::async_trait;
use holdfast_crypto::{HASH_LEN, SALT_LEN};
use thiserror::Error;

use crate::account::{AuthView, NewAccount, PasswordChangeView};

/// Errors from repository implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// The backend is unreachable or failed mid-operation.
    ///
    /// Transient from the client's point of view: the operation may be
    /// retried after backoff.
    #[error("credentials backend unavailable: {0}")]
    Unavailable(String),

    /// A row referenced by id vanished between read and write.
    ///
    /// Indicates a concurrent delete or a logic bug; the operation should
    /// surface a validation failure, not retry blindly.
    #[error("account {0} not found")]
    RowMissing(i64),
}

/// Storage contract for account credentials.
///
/// Must be `Send + Sync` (shared by all connection tasks). Implementations
/// typically share internal state via `Arc`, so clones access the same
/// underlying store.
///
/// # Invariants
///
/// - `username` is a unique key; [`CredentialsRepository::insert_or_ignore`]
///   is the only insert path and must be atomic with respect to itself
/// - Counters and stamps are updated atomically per call; callers never
///   read-modify-write across calls
#[async_trait]
pub trait CredentialsRepository: Send + Sync + 'static {
    /// Load the login view for a username. `None` if unknown.
    async fn get_auth_view_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AuthView>, RepositoryError>;

    /// Load the password-change view for a username. `None` if unknown.
    async fn get_for_password_change_by_username(
        &self,
        username: &str,
    ) -> Result<Option<PasswordChangeView>, RepositoryError>;

    /// Insert a new account unless the username exists.
    ///
    /// Returns the new row id (> 0), or a value ≤ 0 when the username was
    /// already taken (insert-or-ignore semantics).
    async fn insert_or_ignore(&self, account: NewAccount) -> Result<i64, RepositoryError>;

    /// Atomically increment the failed-login counter and stamp the failure
    /// time.
    async fn increment_failed(&self, id: i64, at_secs: u64) -> Result<(), RepositoryError>;

    /// Atomically reset the failed-login counter and stamp a successful
    /// login.
    async fn reset_failed_and_stamp_login(
        &self,
        id: i64,
        at_secs: u64,
    ) -> Result<(), RepositoryError>;

    /// Stamp a logout time for a username. Unknown usernames are a no-op.
    async fn stamp_logout(&self, username: &str, at_secs: u64) -> Result<(), RepositoryError>;

    /// Replace salt/hash only if the stored hash still matches
    /// `expected_hash` (optimistic concurrency).
    ///
    /// Returns the number of rows changed: 1 on success, 0 when the hash
    /// moved underneath the caller.
    async fn update_password_if_matches(
        &self,
        id: i64,
        expected_hash: &[u8; HASH_LEN],
        new_salt: [u8; SALT_LEN],
        new_hash: [u8; HASH_LEN],
    ) -> Result<u64, RepositoryError>;
}
