#![allow(
    clippy::disallowed_types,
    reason = "registry RwLock guards short synchronous critical sections only"
)]

//! Process-wide connection registry.
//!
//! The hub maintains bidirectional mappings: connection-id → connection (for
//! routing and teardown) and connection-id ↔ username (after login). This
//! enables O(1) lookups in both directions.
//!
//! Read-heavy: middleware consults it on every frame, mutation happens only
//! on accept, login, logout, and teardown, so the maps sit behind one
//! `RwLock`.
//!
//! # Invariants
//!
//! - Associations are one-to-one: a second association on the same
//!   connection replaces the prior one, and a new association for a
//!   username in use evicts the previous holder (returned to the caller for
//!   disconnect).

use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::connection::Connection;

/// Process-wide registry: connections and username associations.
#[derive(Default)]
pub struct ConnectionHub {
    next_id: AtomicU64,
    inner: RwLock<HubInner>,
}

#[derive(Default)]
struct HubInner {
    /// Connection id → connection.
    connections: HashMap<u64, Arc<Connection>>,
    /// Connection id → username (after login).
    username_by_id: HashMap<u64, String>,
    /// Username → connection id (reverse index).
    id_by_username: HashMap<String, u64>,
}

impl ConnectionHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next stable connection id.
    pub fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Register a connection under its id.
    ///
    /// Returns the id, or `None` if that id is already registered (a logic
    /// bug: ids come from [`ConnectionHub::allocate_id`]).
    #[allow(clippy::expect_used)]
    pub fn register(&self, conn: Arc<Connection>) -> Option<u64> {
        let mut inner = self.inner.write().expect("lock poisoned");

        let id = conn.id();
        if inner.connections.contains_key(&id) {
            return None;
        }
        inner.connections.insert(id, conn);
        Some(id)
    }

    /// Remove a connection and any username association.
    ///
    /// Returns the connection if it was registered.
    #[allow(clippy::expect_used)]
    pub fn unregister(&self, id: u64) -> Option<Arc<Connection>> {
        let mut inner = self.inner.write().expect("lock poisoned");

        let conn = inner.connections.remove(&id)?;
        if let Some(username) = inner.username_by_id.remove(&id) {
            inner.id_by_username.remove(&username);
        }
        Some(conn)
    }

    /// Bind a username to a connection after login.
    ///
    /// Replaces the connection's prior association, if any. If the username
    /// is already bound to a different live connection, that holder is
    /// evicted and returned so the caller can disconnect it.
    ///
    /// Returns `None` for an unregistered connection id (nothing changes).
    #[allow(clippy::expect_used)]
    pub fn associate_username(&self, id: u64, username: &str) -> AssociateOutcome {
        let mut inner = self.inner.write().expect("lock poisoned");

        if !inner.connections.contains_key(&id) {
            return AssociateOutcome::UnknownConnection;
        }

        // Evict the previous holder of this username, if it is someone else
        let evicted = match inner.id_by_username.get(username) {
            Some(&holder) if holder != id => {
                inner.username_by_id.remove(&holder);
                inner.id_by_username.remove(username);
                inner.connections.get(&holder).cloned()
            },
            _ => None,
        };

        // Replace this connection's prior association
        if let Some(previous) = inner.username_by_id.remove(&id) {
            inner.id_by_username.remove(&previous);
        }

        inner.username_by_id.insert(id, username.to_owned());
        inner.id_by_username.insert(username.to_owned(), id);

        AssociateOutcome::Bound { evicted }
    }

    /// Drop a connection's username association (logout).
    ///
    /// Returns the username that was bound, if any.
    #[allow(clippy::expect_used)]
    pub fn dissociate(&self, id: u64) -> Option<String> {
        let mut inner = self.inner.write().expect("lock poisoned");

        let username = inner.username_by_id.remove(&id)?;
        inner.id_by_username.remove(&username);
        Some(username)
    }

    /// Username bound to a connection. `None` before login.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn get_username(&self, id: u64) -> Option<String> {
        self.inner.read().expect("lock poisoned").username_by_id.get(&id).cloned()
    }

    /// Connection holding a username. `None` if nobody is logged in as it.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn connection_for_username(&self, username: &str) -> Option<Arc<Connection>> {
        let inner = self.inner.read().expect("lock poisoned");
        let id = inner.id_by_username.get(username)?;
        inner.connections.get(id).cloned()
    }

    /// Connection by id.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn get(&self, id: u64) -> Option<Arc<Connection>> {
        self.inner.read().expect("lock poisoned").connections.get(&id).cloned()
    }

    /// Snapshot of all live connections.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn enumerate(&self) -> Vec<Arc<Connection>> {
        self.inner.read().expect("lock poisoned").connections.values().cloned().collect()
    }

    /// Number of live connections.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").connections.len()
    }

    /// Whether no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of [`ConnectionHub::associate_username`].
#[derive(Debug, Clone)]
pub enum AssociateOutcome {
    /// Username bound; `evicted` holds a previous holder to disconnect.
    Bound {
        /// Prior holder of the username, if one was displaced.
        evicted: Option<Arc<Connection>>,
    },
    /// The connection id is not registered.
    UnknownConnection,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::test_connection;

    fn registered(hub: &ConnectionHub) -> Arc<Connection> {
        let (conn, rx) = test_connection(hub.allocate_id());
        // Keep the channel open for the connection's lifetime
        std::mem::forget(rx);
        hub.register(Arc::clone(&conn)).expect("fresh id");
        conn
    }

    #[test]
    fn register_and_lookup() {
        let hub = ConnectionHub::new();
        let conn = registered(&hub);

        assert_eq!(hub.len(), 1);
        assert!(hub.get(conn.id()).is_some());
        assert!(hub.get(conn.id() + 1).is_none());
    }

    #[test]
    fn duplicate_register_fails() {
        let hub = ConnectionHub::new();
        let conn = registered(&hub);

        assert!(hub.register(Arc::clone(&conn)).is_none());
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn allocate_id_is_monotonic() {
        let hub = ConnectionHub::new();
        let a = hub.allocate_id();
        let b = hub.allocate_id();
        assert!(b > a);
    }

    #[test]
    fn associate_and_resolve_username() {
        let hub = ConnectionHub::new();
        let conn = registered(&hub);

        let outcome = hub.associate_username(conn.id(), "alice");
        assert!(matches!(outcome, AssociateOutcome::Bound { evicted: None }));

        assert_eq!(hub.get_username(conn.id()).as_deref(), Some("alice"));
        assert_eq!(
            hub.connection_for_username("alice").map(|c| c.id()),
            Some(conn.id())
        );
    }

    #[test]
    fn second_association_replaces_first() {
        let hub = ConnectionHub::new();
        let conn = registered(&hub);

        hub.associate_username(conn.id(), "alice");
        hub.associate_username(conn.id(), "alice2");

        assert_eq!(hub.get_username(conn.id()).as_deref(), Some("alice2"));
        assert!(hub.connection_for_username("alice").is_none());
    }

    #[test]
    fn username_takeover_evicts_previous_holder() {
        let hub = ConnectionHub::new();
        let first = registered(&hub);
        let second = registered(&hub);

        hub.associate_username(first.id(), "alice");
        let outcome = hub.associate_username(second.id(), "alice");

        let AssociateOutcome::Bound { evicted: Some(evicted) } = outcome else {
            unreachable!("previous holder must be reported");
        };
        assert_eq!(evicted.id(), first.id());

        // The username resolves to the new holder only
        assert_eq!(
            hub.connection_for_username("alice").map(|c| c.id()),
            Some(second.id())
        );
        assert!(hub.get_username(first.id()).is_none());
    }

    #[test]
    fn associate_unknown_connection_is_rejected() {
        let hub = ConnectionHub::new();
        let outcome = hub.associate_username(999, "alice");
        assert!(matches!(outcome, AssociateOutcome::UnknownConnection));
        assert!(hub.connection_for_username("alice").is_none());
    }

    #[test]
    fn dissociate_clears_both_directions() {
        let hub = ConnectionHub::new();
        let conn = registered(&hub);

        hub.associate_username(conn.id(), "alice");
        assert_eq!(hub.dissociate(conn.id()).as_deref(), Some("alice"));

        assert!(hub.get_username(conn.id()).is_none());
        assert!(hub.connection_for_username("alice").is_none());
        // The connection itself stays registered
        assert!(hub.get(conn.id()).is_some());
    }

    #[test]
    fn unregister_drops_association_too() {
        let hub = ConnectionHub::new();
        let conn = registered(&hub);

        hub.associate_username(conn.id(), "alice");
        let removed = hub.unregister(conn.id()).expect("was registered");
        assert_eq!(removed.id(), conn.id());

        assert!(hub.is_empty());
        assert!(hub.connection_for_username("alice").is_none());
    }

    #[test]
    fn enumerate_snapshots_live_connections() {
        let hub = ConnectionHub::new();
        let a = registered(&hub);
        let b = registered(&hub);

        let ids: Vec<u64> = hub.enumerate().iter().map(|c| c.id()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a.id()));
        assert!(ids.contains(&b.id()));
    }
}
