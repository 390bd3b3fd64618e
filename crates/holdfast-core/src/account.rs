//! Account records and the views the authentication path reads.
//!
//! The full [`Account`] row exists only inside repository implementations;
//! operations consume the narrow views so password material never travels
//! further than the code that verifies it.

use holdfast_crypto::{HASH_LEN, SALT_LEN};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Four-level permission ladder.
///
/// Monotonically elevated by handshake (`Guest`) and login (`User` or the
/// stored role). Ordering is derived so gates read as `level >= required`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PermissionLevel {
    /// Fresh connection, no handshake yet.
    #[default]
    None,
    /// Handshake complete; may register and log in.
    Guest,
    /// Authenticated account.
    User,
    /// Operator account.
    Admin,
}

/// Consecutive failed logins that trip the lockout.
pub const MAX_FAILED_LOGINS: u32 = 5;

/// Seconds an account stays locked after the last failed attempt.
pub const LOCKOUT_SECS: u64 = 180;

/// One persisted credentials row.
///
/// # Invariants
///
/// - `username` is unique and already validated (3-20 chars of
///   `[A-Za-z0-9_-]`)
/// - `salt` and `hash` are fixed width; neither leaves the auth path
#[derive(Debug, Clone)]
pub struct Account {
    /// Unique row id (> 0).
    pub id: i64,
    /// Unique account name.
    pub username: String,
    /// PBKDF2 salt.
    pub salt: [u8; SALT_LEN],
    /// PBKDF2 derived key.
    pub hash: [u8; HASH_LEN],
    /// Role granted on login.
    pub role: PermissionLevel,
    /// Consecutive failed login attempts since the last success.
    pub failed_login_count: u32,
    /// Unix seconds of the last successful login.
    pub last_login_at: Option<u64>,
    /// Unix seconds of the last logout.
    pub last_logout_at: Option<u64>,
    /// Unix seconds of the last failed login.
    pub last_failed_login_at: Option<u64>,
    /// Whether the account may log in at all.
    pub is_active: bool,
    /// Unix seconds the row was created.
    pub created_at: u64,
}

/// Insert payload for a new account.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct NewAccount {
    /// Validated account name.
    pub username: String,
    /// PBKDF2 salt.
    pub salt: [u8; SALT_LEN],
    /// PBKDF2 derived key.
    pub hash: [u8; HASH_LEN],
    /// Unix seconds of creation.
    pub created_at: u64,
}

impl std::fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print hash material
        f.debug_struct("NewAccount")
            .field("username", &self.username)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// What the login path reads.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AuthView {
    /// Row id.
    pub id: i64,
    /// PBKDF2 salt.
    pub salt: [u8; SALT_LEN],
    /// PBKDF2 derived key.
    pub hash: [u8; HASH_LEN],
    /// Whether the account may log in.
    pub is_active: bool,
    /// Consecutive failed attempts.
    pub failed_login_count: u32,
    /// Unix seconds of the last failed attempt.
    #[zeroize(skip)]
    pub last_failed_login_at: Option<u64>,
    /// Role granted on success.
    #[zeroize(skip)]
    pub role: PermissionLevel,
}

impl AuthView {
    /// Whether the lockout window is active at `now` (Unix seconds).
    #[must_use]
    pub fn locked_at(&self, now: u64) -> bool {
        self.failed_login_count >= MAX_FAILED_LOGINS
            && self.last_failed_login_at.is_some_and(|at| now < at.saturating_add(LOCKOUT_SECS))
    }
}

impl std::fmt::Debug for AuthView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthView")
            .field("id", &self.id)
            .field("is_active", &self.is_active)
            .field("failed_login_count", &self.failed_login_count)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// What the password-change path reads.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PasswordChangeView {
    /// Row id.
    pub id: i64,
    /// PBKDF2 salt.
    pub salt: [u8; SALT_LEN],
    /// PBKDF2 derived key.
    pub hash: [u8; HASH_LEN],
    /// Whether the account may change its password.
    pub is_active: bool,
}

impl std::fmt::Debug for PasswordChangeView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordChangeView")
            .field("id", &self.id)
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(failed: u32, last_failed: Option<u64>) -> AuthView {
        AuthView {
            id: 1,
            salt: [0; SALT_LEN],
            hash: [0; HASH_LEN],
            is_active: true,
            failed_login_count: failed,
            last_failed_login_at: last_failed,
            role: PermissionLevel::User,
        }
    }

    #[test]
    fn permission_ladder_orders() {
        assert!(PermissionLevel::None < PermissionLevel::Guest);
        assert!(PermissionLevel::Guest < PermissionLevel::User);
        assert!(PermissionLevel::User < PermissionLevel::Admin);
        assert!(PermissionLevel::Admin >= PermissionLevel::User);
    }

    #[test]
    fn lockout_needs_both_count_and_recency() {
        // Too few failures: never locked
        assert!(!view(4, Some(1000)).locked_at(1001));

        // Enough failures, inside the window
        assert!(view(5, Some(1000)).locked_at(1000 + LOCKOUT_SECS - 1));

        // Enough failures, window expired
        assert!(!view(5, Some(1000)).locked_at(1000 + LOCKOUT_SECS));

        // Enough failures but no stamp (cleared by admin): not locked
        assert!(!view(9, None).locked_at(1000));
    }

    #[test]
    fn sensitive_views_hide_material_in_debug() {
        let rendered = format!("{:?}", view(0, None));
        assert!(!rendered.contains("salt"));
        assert!(!rendered.contains("hash"));
    }
}
