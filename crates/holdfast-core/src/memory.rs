#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

//! In-memory credentials repository for testing and single-node use.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use holdfast_crypto::{HASH_LEN, SALT_LEN};

use crate::{
    account::{Account, AuthView, NewAccount, PasswordChangeView, PermissionLevel},
    repository::{CredentialsRepository, RepositoryError},
};

/// In-memory repository implementation.
///
/// Uses a `HashMap` keyed by username with a monotonic id counter. All state
/// is wrapped in `Arc<Mutex<>>` to allow Clone and concurrent access.
/// Thread-safe through the mutex, but uses `lock().expect()` which will
/// panic if the mutex is poisoned - acceptable for an in-memory store whose
/// critical sections cannot themselves panic.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    inner: Arc<Mutex<MemoryRepositoryInner>>,
}

#[derive(Default)]
struct MemoryRepositoryInner {
    /// Accounts keyed by username (the unique key).
    accounts: HashMap<String, Account>,
    /// Next row id to hand out.
    next_id: i64,
}

impl MemoryRepository {
    /// Create a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts. Useful for tests.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn account_count(&self) -> usize {
        self.inner.lock().expect("mutex poisoned").accounts.len()
    }

    /// Snapshot one account by username. Useful for tests.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn account(&self, username: &str) -> Option<Account> {
        self.inner.lock().expect("mutex poisoned").accounts.get(username).cloned()
    }

    /// Flip an account's `is_active` flag. Operator/test hook.
    #[allow(clippy::expect_used)]
    pub fn set_active(&self, username: &str, active: bool) -> bool {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        match inner.accounts.get_mut(username) {
            Some(account) => {
                account.is_active = active;
                true
            },
            None => false,
        }
    }
}

#[async_trait]
impl CredentialsRepository for MemoryRepository {
    #[allow(clippy::expect_used)]
    async fn get_auth_view_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AuthView>, RepositoryError> {
        let inner = self.inner.lock().expect("mutex poisoned");

        Ok(inner.accounts.get(username).map(|account| AuthView {
            id: account.id,
            salt: account.salt,
            hash: account.hash,
            is_active: account.is_active,
            failed_login_count: account.failed_login_count,
            last_failed_login_at: account.last_failed_login_at,
            role: account.role,
        }))
    }

    #[allow(clippy::expect_used)]
    async fn get_for_password_change_by_username(
        &self,
        username: &str,
    ) -> Result<Option<PasswordChangeView>, RepositoryError> {
        let inner = self.inner.lock().expect("mutex poisoned");

        Ok(inner.accounts.get(username).map(|account| PasswordChangeView {
            id: account.id,
            salt: account.salt,
            hash: account.hash,
            is_active: account.is_active,
        }))
    }

    #[allow(clippy::expect_used)]
    async fn insert_or_ignore(&self, account: NewAccount) -> Result<i64, RepositoryError> {
        let mut inner = self.inner.lock().expect("mutex poisoned");

        if inner.accounts.contains_key(&account.username) {
            return Ok(0);
        }

        inner.next_id += 1;
        let id = inner.next_id;

        let row = Account {
            id,
            username: account.username.clone(),
            salt: account.salt,
            hash: account.hash,
            role: PermissionLevel::User,
            failed_login_count: 0,
            last_login_at: None,
            last_logout_at: None,
            last_failed_login_at: None,
            is_active: true,
            created_at: account.created_at,
        };
        inner.accounts.insert(row.username.clone(), row);

        Ok(id)
    }

    #[allow(clippy::expect_used)]
    async fn increment_failed(&self, id: i64, at_secs: u64) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().expect("mutex poisoned");

        let account = inner
            .accounts
            .values_mut()
            .find(|account| account.id == id)
            .ok_or(RepositoryError::RowMissing(id))?;

        account.failed_login_count += 1;
        account.last_failed_login_at = Some(at_secs);
        Ok(())
    }

    #[allow(clippy::expect_used)]
    async fn reset_failed_and_stamp_login(
        &self,
        id: i64,
        at_secs: u64,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().expect("mutex poisoned");

        let account = inner
            .accounts
            .values_mut()
            .find(|account| account.id == id)
            .ok_or(RepositoryError::RowMissing(id))?;

        account.failed_login_count = 0;
        account.last_login_at = Some(at_secs);
        Ok(())
    }

    #[allow(clippy::expect_used)]
    async fn stamp_logout(&self, username: &str, at_secs: u64) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().expect("mutex poisoned");

        if let Some(account) = inner.accounts.get_mut(username) {
            account.last_logout_at = Some(at_secs);
        }
        Ok(())
    }

    #[allow(clippy::expect_used)]
    async fn update_password_if_matches(
        &self,
        id: i64,
        expected_hash: &[u8; HASH_LEN],
        new_salt: [u8; SALT_LEN],
        new_hash: [u8; HASH_LEN],
    ) -> Result<u64, RepositoryError> {
        let mut inner = self.inner.lock().expect("mutex poisoned");

        let Some(account) = inner.accounts.values_mut().find(|account| account.id == id) else {
            return Ok(0);
        };

        if account.hash != *expected_hash {
            return Ok(0);
        }

        account.salt = new_salt;
        account.hash = new_hash;
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_account(username: &str) -> NewAccount {
        NewAccount {
            username: username.to_owned(),
            salt: [0x01; SALT_LEN],
            hash: [0x02; HASH_LEN],
            created_at: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn insert_and_fetch_auth_view() {
        let repo = MemoryRepository::new();

        let id = repo.insert_or_ignore(new_account("alice")).await.expect("insert");
        assert!(id > 0);

        let view = repo
            .get_auth_view_by_username("alice")
            .await
            .expect("query")
            .expect("account exists");

        assert_eq!(view.id, id);
        assert!(view.is_active);
        assert_eq!(view.failed_login_count, 0);
        assert_eq!(view.role, PermissionLevel::User);
    }

    #[tokio::test]
    async fn duplicate_insert_is_ignored() {
        let repo = MemoryRepository::new();

        let first = repo.insert_or_ignore(new_account("alice")).await.expect("insert");
        let second = repo.insert_or_ignore(new_account("alice")).await.expect("insert");

        assert!(first > 0);
        assert!(second <= 0);
        assert_eq!(repo.account_count(), 1);
    }

    #[tokio::test]
    async fn unknown_username_is_none() {
        let repo = MemoryRepository::new();
        assert!(repo.get_auth_view_by_username("ghost").await.expect("query").is_none());
    }

    #[tokio::test]
    async fn failed_counter_increments_and_resets() {
        let repo = MemoryRepository::new();
        let id = repo.insert_or_ignore(new_account("alice")).await.expect("insert");

        repo.increment_failed(id, 1000).await.expect("increment");
        repo.increment_failed(id, 1005).await.expect("increment");

        let view = repo.get_auth_view_by_username("alice").await.expect("query").expect("exists");
        assert_eq!(view.failed_login_count, 2);
        assert_eq!(view.last_failed_login_at, Some(1005));

        repo.reset_failed_and_stamp_login(id, 1010).await.expect("reset");

        let view = repo.get_auth_view_by_username("alice").await.expect("query").expect("exists");
        assert_eq!(view.failed_login_count, 0);
        assert_eq!(repo.account("alice").expect("exists").last_login_at, Some(1010));
    }

    #[tokio::test]
    async fn increment_missing_row_errors() {
        let repo = MemoryRepository::new();
        let result = repo.increment_failed(99, 1000).await;
        assert_eq!(result, Err(RepositoryError::RowMissing(99)));
    }

    #[tokio::test]
    async fn stamp_logout_records_time() {
        let repo = MemoryRepository::new();
        repo.insert_or_ignore(new_account("alice")).await.expect("insert");

        repo.stamp_logout("alice", 2000).await.expect("stamp");
        assert_eq!(repo.account("alice").expect("exists").last_logout_at, Some(2000));

        // Unknown username is a no-op, not an error
        repo.stamp_logout("ghost", 2000).await.expect("stamp");
    }

    #[tokio::test]
    async fn password_update_requires_matching_hash() {
        let repo = MemoryRepository::new();
        let id = repo.insert_or_ignore(new_account("alice")).await.expect("insert");

        // Matching expected hash: 1 row changed
        let changed = repo
            .update_password_if_matches(id, &[0x02; HASH_LEN], [0x0A; SALT_LEN], [0x0B; HASH_LEN])
            .await
            .expect("update");
        assert_eq!(changed, 1);

        // Hash moved underneath the second caller: 0 rows changed
        let changed = repo
            .update_password_if_matches(id, &[0x02; HASH_LEN], [0x0C; SALT_LEN], [0x0D; HASH_LEN])
            .await
            .expect("update");
        assert_eq!(changed, 0);

        let account = repo.account("alice").expect("exists");
        assert_eq!(account.salt, [0x0A; SALT_LEN]);
        assert_eq!(account.hash, [0x0B; HASH_LEN]);
    }

    #[tokio::test]
    async fn set_active_toggles_flag() {
        let repo = MemoryRepository::new();
        repo.insert_or_ignore(new_account("alice")).await.expect("insert");

        assert!(repo.set_active("alice", false));
        let view = repo.get_auth_view_by_username("alice").await.expect("query").expect("exists");
        assert!(!view.is_active);

        assert!(!repo.set_active("ghost", false));
    }
}
