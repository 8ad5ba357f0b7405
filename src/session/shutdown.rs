//! Shutdown coordinator
//!
//! Drains the connection registry at process termination: every connection
//! is closed concurrently, individual close failures are collected without
//! aborting the rest, and the registry always ends empty.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::transport::TransportError;

/// Result of draining the registry
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Connections closed cleanly
    pub closed: usize,
    /// Connections whose close reported an error
    pub failures: Vec<(ConnectionId, TransportError)>,
}

impl ShutdownReport {
    /// Whether every close succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total connections drained
    pub fn total(&self) -> usize {
        self.closed + self.failures.len()
    }
}

/// Closes every registered connection on process termination
pub struct ShutdownCoordinator {
    registry: Arc<ConnectionRegistry>,
}

impl ShutdownCoordinator {
    /// Create a coordinator over the shared registry
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Close all connections concurrently and clear the registry
    ///
    /// Idempotent: calling on an already-empty registry is a no-op.
    pub async fn shutdown(&self) -> ShutdownReport {
        let connections = self.registry.all().await;
        let mut report = ShutdownReport::default();

        if connections.is_empty() {
            return report;
        }

        let mut closes = JoinSet::new();
        for conn in connections {
            closes.spawn(async move { (conn.id(), conn.close().await) });
        }

        while let Some(joined) = closes.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.closed += 1,
                Ok((id, Err(e))) => {
                    tracing::warn!(connection_id = %id, error = %e, "Close failed during shutdown");
                    report.failures.push((id, e));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Close task panicked during shutdown");
                }
            }
        }

        self.registry.clear().await;

        tracing::info!(
            closed = report.closed,
            failures = report.failures.len(),
            "Shutdown drained all connections"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Connection, Role};
    use crate::transport::LoopbackTransport;

    #[tokio::test]
    async fn test_shutdown_empty_registry() {
        let registry = Arc::new(ConnectionRegistry::new());
        let coordinator = ShutdownCoordinator::new(Arc::clone(&registry));

        let report = coordinator.shutdown().await;
        assert_eq!(report.total(), 0);
        assert!(report.is_clean());

        // Safe to call again
        coordinator.shutdown().await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_shutdown_collects_failures_and_empties_registry() {
        let registry = Arc::new(ConnectionRegistry::new());

        for i in 0..4u64 {
            let (transport, _events) = LoopbackTransport::new();
            if i == 2 {
                transport.fail_close();
            }
            registry
                .add(Connection::new(ConnectionId(i), Role::Viewer, transport))
                .await;
        }

        let coordinator = ShutdownCoordinator::new(Arc::clone(&registry));
        let report = coordinator.shutdown().await;

        assert_eq!(report.total(), 4);
        assert_eq!(report.closed, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, ConnectionId(2));

        // The registry is empty regardless of close failures
        assert!(registry.is_empty().await);
    }
}
