//! Connection registry implementation
//!
//! The central registry tracking every live connection, used for lookup and
//! bulk teardown. Thread-safe via `RwLock`; concurrent negotiations and
//! asynchronous state-change cleanups add and remove entries freely.
//!
//! Invariant: a connection appears here if and only if it has not been
//! closed. Callers removing a connection close it as part of the same
//! cleanup path.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::connection::{Connection, ConnectionId, Role};
use super::error::RegistryError;

/// Registry of all live connections
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a connection
    ///
    /// Idempotent per identity: re-adding an already-registered connection is
    /// a no-op and never creates a duplicate entry.
    pub async fn add(&self, connection: Arc<Connection>) {
        let mut connections = self.connections.write().await;

        let id = connection.id();
        let role = connection.role();
        if connections.insert(id, connection).is_none() {
            tracing::info!(
                connection_id = %id,
                role = %role,
                total = connections.len(),
                "Connection registered"
            );
        }
    }

    /// Insert a connection if the admission policy allows it
    ///
    /// The policy check and the insert run under one write lock, so two
    /// concurrent negotiations cannot both pass the check: the connection
    /// limit and broadcaster exclusivity hold under any interleaving of
    /// offers. `max_connections` of 0 means unlimited.
    pub async fn admit(
        &self,
        connection: Arc<Connection>,
        max_connections: usize,
        broadcaster_takeover: bool,
    ) -> Result<(), RegistryError> {
        let mut connections = self.connections.write().await;

        if max_connections > 0 && connections.len() >= max_connections {
            return Err(RegistryError::ConnectionLimit(max_connections));
        }
        if connection.role() == Role::Broadcaster
            && !broadcaster_takeover
            && connections.values().any(|c| c.role() == Role::Broadcaster)
        {
            return Err(RegistryError::BroadcasterActive);
        }

        let id = connection.id();
        let role = connection.role();
        connections.insert(id, connection);
        tracing::info!(
            connection_id = %id,
            role = %role,
            total = connections.len(),
            "Connection admitted"
        );
        Ok(())
    }

    /// Remove a connection if present
    ///
    /// No-op (returning `None`) if the connection is not registered.
    pub async fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut connections = self.connections.write().await;

        let removed = connections.remove(&id);
        if removed.is_some() {
            tracing::debug!(
                connection_id = %id,
                total = connections.len(),
                "Connection removed"
            );
        }
        removed
    }

    /// Look up a connection by ID
    pub async fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().await.get(&id).cloned()
    }

    /// Snapshot of all registered connections, for bulk operations
    pub async fn all(&self) -> Vec<Arc<Connection>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Number of registered connections
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Remove every entry
    pub async fn clear(&self) {
        self.connections.write().await.clear();
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
