//! Relay server context
//!
//! One [`RelayServer`] is constructed at process start and passed by handle
//! to every request handler; it owns the connection registry, the track
//! relay, the readiness gate, and both coordinators. There is no ambient
//! global state anywhere in the crate.

use std::sync::Arc;

use crate::error::Result;
use crate::registry::ConnectionRegistry;
use crate::relay::{ReadinessGate, TrackRelay};
use crate::session::{NegotiationCoordinator, ShutdownCoordinator, ShutdownReport};
use crate::stats::{RelayStats, StatsSnapshot};
use crate::transport::{SessionDescription, TransportFactory};

pub mod config;

pub use config::RelayConfig;

/// The broadcast relay server
///
/// Exposes the three-operation signaling surface: `publish` for the
/// broadcaster, `view` for each viewer, and `shutdown` at termination. The
/// transport-level framing of these requests (HTTP, WebSocket, whatever) is
/// the embedder's concern.
pub struct RelayServer {
    registry: Arc<ConnectionRegistry>,
    relay: Arc<TrackRelay>,
    gate: Arc<ReadinessGate>,
    stats: Arc<RelayStats>,
    negotiator: NegotiationCoordinator,
    shutdown: ShutdownCoordinator,
}

impl RelayServer {
    /// Create a server with the default configuration
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self::with_config(RelayConfig::default(), factory)
    }

    /// Create a server with a custom configuration
    pub fn with_config(config: RelayConfig, factory: Arc<dyn TransportFactory>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = Arc::new(TrackRelay::new());
        let gate = Arc::new(ReadinessGate::new());
        let stats = Arc::new(RelayStats::new());

        let negotiator = NegotiationCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&relay),
            Arc::clone(&gate),
            Arc::clone(&stats),
            factory,
            config,
        );
        let shutdown = ShutdownCoordinator::new(Arc::clone(&registry));

        Self {
            registry,
            relay,
            gate,
            stats,
            negotiator,
            shutdown,
        }
    }

    /// Broadcaster negotiation entry point
    ///
    /// Creates a broadcaster-role connection and returns the answer. Inbound
    /// tracks are published into the relay as the transport reports them,
    /// asynchronously relative to this call.
    pub async fn publish(&self, offer: SessionDescription) -> Result<SessionDescription> {
        self.negotiator.broadcast(offer).await
    }

    /// Viewer negotiation entry point
    ///
    /// Creates a viewer-role connection; may suspend at the readiness gate
    /// until a broadcaster has published, bounded by the configured wait
    /// timeout.
    pub async fn view(&self, offer: SessionDescription) -> Result<SessionDescription> {
        self.negotiator.view(offer).await
    }

    /// Drain all connections at process termination
    pub async fn shutdown(&self) -> ShutdownReport {
        self.shutdown.shutdown().await
    }

    /// The connection registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The track relay
    pub fn relay(&self) -> &Arc<TrackRelay> {
        &self.relay
    }

    /// The readiness gate
    pub fn gate(&self) -> &Arc<ReadinessGate> {
        &self.gate
    }

    /// Current relay counters
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
