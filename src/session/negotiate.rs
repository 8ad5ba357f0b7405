//! Role-aware negotiation state machine
//!
//! Drives the offer/answer exchange for both roles. A broadcaster's
//! connection publishes inbound tracks into the relay as the transport
//! reports them; a viewer's connection waits on the readiness gate, attaches
//! relayed tracks, and answers. Each negotiation is an independent unit of
//! work: concurrent calls only meet at the registry, the source table, and
//! the gate, and no registry-wide lock is held across a suspension point.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::registry::{Connection, ConnectionId, ConnectionRegistry, ConnectionState, Role};
use crate::relay::{ReadinessGate, RelayError, TrackKind, TrackRelay};
use crate::server::RelayConfig;
use crate::stats::RelayStats;
use crate::transport::{
    SessionDescription, TransportEvent, TransportFactory, TransportState,
};

/// Outcome of a gated wait for one kind
enum WaitOutcome {
    Ready,
    TimedOut,
}

/// Coordinates offer/answer negotiation for broadcasters and viewers
pub struct NegotiationCoordinator {
    registry: Arc<ConnectionRegistry>,
    relay: Arc<TrackRelay>,
    gate: Arc<ReadinessGate>,
    stats: Arc<RelayStats>,
    factory: Arc<dyn TransportFactory>,
    config: RelayConfig,
    next_connection_id: AtomicU64,
}

impl NegotiationCoordinator {
    /// Create a coordinator over the shared server state
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        relay: Arc<TrackRelay>,
        gate: Arc<ReadinessGate>,
        stats: Arc<RelayStats>,
        factory: Arc<dyn TransportFactory>,
        config: RelayConfig,
    ) -> Self {
        Self {
            registry,
            relay,
            gate,
            stats,
            factory,
            config,
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Negotiate a broadcaster connection
    ///
    /// Returns the answer as soon as the offer/answer exchange completes;
    /// track publication happens asynchronously as the transport reports
    /// inbound tracks.
    pub async fn broadcast(&self, offer: SessionDescription) -> Result<SessionDescription> {
        validate_offer(&offer)?;

        let conn = self.open_connection(Role::Broadcaster).await?;
        match self.negotiate_broadcast(&conn, &offer).await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                self.abort(&conn, &e).await;
                Err(e)
            }
        }
    }

    /// Negotiate a viewer connection
    ///
    /// Suspends at the readiness gate for each kind not yet published, so
    /// the answer may come long after the offer.
    pub async fn view(&self, offer: SessionDescription) -> Result<SessionDescription> {
        validate_offer(&offer)?;

        let conn = self.open_connection(Role::Viewer).await?;
        match self.negotiate_view(&conn, &offer).await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                self.abort(&conn, &e).await;
                Err(e)
            }
        }
    }

    async fn negotiate_broadcast(
        &self,
        conn: &Arc<Connection>,
        offer: &SessionDescription,
    ) -> Result<SessionDescription> {
        let transport = conn.transport();

        transport.apply_remote_description(offer).await?;
        let answer = transport.create_local_description().await?;
        transport.apply_local_description(&answer).await?;

        tracing::info!(connection_id = %conn.id(), "Broadcaster negotiation complete");
        Ok(answer)
    }

    async fn negotiate_view(
        &self,
        conn: &Arc<Connection>,
        offer: &SessionDescription,
    ) -> Result<SessionDescription> {
        let transport = conn.transport();

        transport.apply_remote_description(offer).await?;

        // Audio then video, in that fixed order. A kind that times out or
        // races the relay is skipped; failing every kind fails the viewer.
        let mut first_miss: Option<Error> = None;
        for kind in TrackKind::ALL {
            match self.wait_ready(kind).await {
                WaitOutcome::TimedOut => {
                    if first_miss.is_none() {
                        first_miss = Some(Error::WaitTimeout(kind));
                    }
                    continue;
                }
                WaitOutcome::Ready => {}
            }

            match self.relay.subscribe(kind).await {
                Ok(subscription) => {
                    transport.attach_track(kind, subscription.frames()).await?;
                    conn.add_subscription(subscription).await;
                    tracing::debug!(
                        connection_id = %conn.id(),
                        kind = %kind,
                        "Relayed track attached"
                    );
                }
                Err(RelayError::NoSource(kind)) => {
                    // Retryable by the next viewer; not fatal for this one
                    // unless nothing at all attaches.
                    tracing::warn!(
                        connection_id = %conn.id(),
                        kind = %kind,
                        "Gate released but no source published; skipping kind"
                    );
                    if first_miss.is_none() {
                        first_miss = Some(Error::NoSource(kind));
                    }
                }
            }
        }

        if conn.attached_kinds().await.is_empty() {
            return Err(first_miss.unwrap_or(Error::WaitTimeout(TrackKind::Audio)));
        }

        let answer = transport.create_local_description().await?;
        transport.apply_local_description(&answer).await?;

        let kinds = conn.attached_kinds().await;
        tracing::info!(
            connection_id = %conn.id(),
            kinds = ?kinds,
            "Viewer negotiation complete"
        );
        Ok(answer)
    }

    /// Create, admit, and start event handling for a new connection
    ///
    /// The connection limit and broadcaster exclusivity are checked
    /// atomically with registration, under the registry's write lock; two
    /// concurrent publish offers cannot both pass. A rejected connection's
    /// transport is closed before the error is returned.
    async fn open_connection(&self, role: Role) -> Result<Arc<Connection>> {
        let (transport, events) = self.factory.create_transport().await?;

        let id = ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed));
        let conn = Connection::new(id, role, transport);

        if let Err(e) = self
            .registry
            .admit(
                Arc::clone(&conn),
                self.config.max_connections,
                self.config.broadcaster_takeover,
            )
            .await
        {
            tracing::warn!(
                connection_id = %id,
                role = %role,
                error = %e,
                "Offer rejected at admission"
            );
            if let Err(close_err) = conn.close().await {
                tracing::debug!(
                    connection_id = %id,
                    error = %close_err,
                    "Close after rejected admission failed"
                );
            }
            return Err(e.into());
        }

        conn.transition(ConnectionState::Negotiating).await;
        self.stats.record_connection(role);
        self.spawn_event_pump(Arc::clone(&conn), events);

        Ok(conn)
    }

    /// Drain transport notifications for one connection
    ///
    /// Runs until the transport reports Failed/Closed or drops its event
    /// channel. Cleanup here only ever touches this connection's state.
    fn spawn_event_pump(
        &self,
        conn: Arc<Connection>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        let registry = Arc::clone(&self.registry);
        let relay = Arc::clone(&self.relay);
        let gate = Arc::clone(&self.gate);
        let stats = Arc::clone(&self.stats);

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    TransportEvent::TrackReceived(track) => {
                        if conn.role() != Role::Broadcaster {
                            tracing::warn!(
                                connection_id = %conn.id(),
                                kind = %track.kind(),
                                "Ignoring inbound track on a viewer connection"
                            );
                            continue;
                        }

                        let kind = track.kind();
                        relay.publish(track).await;
                        gate.signal(kind);
                        stats.record_track_published();

                        tracing::info!(
                            connection_id = %conn.id(),
                            kind = %kind,
                            "Inbound track published to relay"
                        );
                    }
                    TransportEvent::StateChanged(TransportState::Connecting) => {}
                    TransportEvent::StateChanged(TransportState::Connected) => {
                        conn.transition(ConnectionState::Connected).await;
                    }
                    TransportEvent::StateChanged(state) => {
                        // Failed or Closed: same cleanup path either way.
                        if state == TransportState::Failed {
                            conn.transition(ConnectionState::Failed).await;
                            stats.record_transport_failure();
                        }

                        tracing::info!(
                            connection_id = %conn.id(),
                            role = %conn.role(),
                            state = %state,
                            "Transport terminated; cleaning up connection"
                        );

                        registry.remove(conn.id()).await;
                        if let Err(e) = conn.close().await {
                            tracing::warn!(
                                connection_id = %conn.id(),
                                error = %e,
                                "Error closing connection"
                            );
                        }
                        break;
                    }
                }
            }
        });
    }

    /// Tear down a connection whose negotiation failed
    async fn abort(&self, conn: &Arc<Connection>, error: &Error) {
        tracing::warn!(
            connection_id = %conn.id(),
            role = %conn.role(),
            error = %error,
            "Negotiation failed; removing connection"
        );

        self.stats.record_negotiation_failure();
        conn.transition(ConnectionState::Failed).await;
        self.registry.remove(conn.id()).await;
        if let Err(e) = conn.close().await {
            tracing::debug!(connection_id = %conn.id(), error = %e, "Close after abort failed");
        }
    }

    async fn wait_ready(&self, kind: TrackKind) -> WaitOutcome {
        match self.config.gate_wait_timeout {
            Some(timeout) => match self.gate.wait_timeout(kind, timeout).await {
                Ok(()) => WaitOutcome::Ready,
                Err(timeout) => {
                    tracing::warn!(
                        kind = %kind,
                        waited_ms = timeout.waited.as_millis() as u64,
                        "Gate wait timed out; skipping kind"
                    );
                    WaitOutcome::TimedOut
                }
            },
            None => {
                self.gate.wait(kind).await;
                WaitOutcome::Ready
            }
        }
    }

}

fn validate_offer(offer: &SessionDescription) -> Result<()> {
    if !offer.is_offer() {
        return Err(Error::InvalidOffer(format!(
            "expected an offer, got {:?}",
            offer.sdp_type
        )));
    }
    if offer.sdp.trim().is_empty() {
        return Err(Error::InvalidOffer("empty sdp".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::transport::{
        LoopbackFactory, MediaTransport, SdpType, TransportError,
    };

    /// Factory whose transport creation suspends, widening the window
    /// between two concurrent offers
    struct SlowFactory {
        inner: Arc<LoopbackFactory>,
        delay: Duration,
    }

    #[async_trait]
    impl TransportFactory for SlowFactory {
        async fn create_transport(
            &self,
        ) -> std::result::Result<
            (
                Arc<dyn MediaTransport>,
                mpsc::UnboundedReceiver<TransportEvent>,
            ),
            TransportError,
        > {
            tokio::time::sleep(self.delay).await;
            self.inner.create_transport().await
        }
    }

    fn coordinator(config: RelayConfig) -> (NegotiationCoordinator, Arc<LoopbackFactory>) {
        let factory = LoopbackFactory::new();
        let coordinator = NegotiationCoordinator::new(
            Arc::new(ConnectionRegistry::new()),
            Arc::new(TrackRelay::new()),
            Arc::new(ReadinessGate::new()),
            Arc::new(RelayStats::new()),
            factory.clone() as Arc<dyn TransportFactory>,
            config,
        );
        (coordinator, factory)
    }

    fn offer() -> SessionDescription {
        SessionDescription::offer("v=0\r\nm=audio\r\nm=video\r\n")
    }

    /// Poll until `check` passes or a second elapses
    async fn eventually<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 1s");
    }

    #[tokio::test]
    async fn test_rejects_non_offer() {
        let (coordinator, _factory) = coordinator(RelayConfig::default());

        let answer = SessionDescription {
            sdp_type: SdpType::Answer,
            sdp: "v=0\r\n".into(),
        };
        assert!(matches!(
            coordinator.broadcast(answer).await,
            Err(Error::InvalidOffer(_))
        ));

        let blank = SessionDescription::offer("   ");
        assert!(matches!(
            coordinator.view(blank).await,
            Err(Error::InvalidOffer(_))
        ));

        assert!(coordinator.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_broadcast_publishes_tracks_asynchronously() {
        let (coordinator, factory) = coordinator(RelayConfig::default());

        let answer = coordinator.broadcast(offer()).await.unwrap();
        assert_eq!(answer.sdp_type, SdpType::Answer);
        assert_eq!(coordinator.registry.len().await, 1);

        // The answer was produced before any track arrived
        assert!(!coordinator.gate.is_ready(TrackKind::Video));

        let transport = factory.created(0).unwrap();
        transport.deliver_track(factory.new_track(TrackKind::Video));
        transport.deliver_track(factory.new_track(TrackKind::Audio));

        let relay = Arc::clone(&coordinator.relay);
        eventually(move || {
            let relay = Arc::clone(&relay);
            async move { relay.source_count().await == 2 }
        })
        .await;

        assert!(coordinator.gate.is_ready(TrackKind::Audio));
        assert!(coordinator.gate.is_ready(TrackKind::Video));
        assert_eq!(coordinator.stats.snapshot().tracks_published, 2);
    }

    #[tokio::test]
    async fn test_second_broadcaster_rejected() {
        let (coordinator, _factory) = coordinator(RelayConfig::default());

        coordinator.broadcast(offer()).await.unwrap();
        let result = coordinator.broadcast(offer()).await;

        assert!(matches!(result, Err(Error::BroadcasterActive)));
        assert_eq!(coordinator.registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_broadcaster_takeover_allowed_by_config() {
        let (coordinator, factory) =
            coordinator(RelayConfig::default().broadcaster_takeover(true));

        coordinator.broadcast(offer()).await.unwrap();
        factory
            .created(0)
            .unwrap()
            .deliver_track(factory.new_track(TrackKind::Video));

        coordinator.broadcast(offer()).await.unwrap();
        factory
            .created(1)
            .unwrap()
            .deliver_track(factory.new_track(TrackKind::Video));

        let relay = Arc::clone(&coordinator.relay);
        eventually(move || {
            let relay = Arc::clone(&relay);
            async move {
                relay
                    .source(TrackKind::Video)
                    .await
                    .map(|s| s.id().0 == 2)
                    .unwrap_or(false)
            }
        })
        .await;
        assert_eq!(coordinator.registry.len().await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_broadcasters_admit_only_one() {
        let factory = LoopbackFactory::new();
        let slow = Arc::new(SlowFactory {
            inner: factory.clone(),
            delay: Duration::from_millis(50),
        });
        let coordinator = Arc::new(NegotiationCoordinator::new(
            Arc::new(ConnectionRegistry::new()),
            Arc::new(TrackRelay::new()),
            Arc::new(ReadinessGate::new()),
            Arc::new(RelayStats::new()),
            slow,
            RelayConfig::default(),
        ));

        let offers: Vec<_> = (0..2)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(async move { coordinator.broadcast(offer()).await })
            })
            .collect();

        let mut results = Vec::new();
        for handle in offers {
            results.push(handle.await.unwrap());
        }

        // Both offers pass the pre-admission steps before either registers;
        // exactly one may win.
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(Error::BroadcasterActive))));
        assert_eq!(coordinator.registry.len().await, 1);

        // The loser's transport was created but closed again
        assert_eq!(factory.created_count(), 2);
        let closed = (0..2)
            .filter(|&i| factory.created(i).unwrap().is_closed())
            .count();
        assert_eq!(closed, 1);
    }

    #[tokio::test]
    async fn test_negotiation_failure_cleans_up() {
        let (coordinator, factory) = coordinator(RelayConfig::default());

        factory.fail_next_negotiation();
        let result = coordinator.broadcast(offer()).await;

        assert!(matches!(result, Err(Error::NegotiationFailed(_))));
        assert!(coordinator.registry.is_empty().await);
        assert!(factory.created(0).unwrap().is_closed());
        assert_eq!(coordinator.stats.snapshot().negotiation_failures, 1);

        // The failure was local: a fresh broadcaster negotiates fine
        coordinator.broadcast(offer()).await.unwrap();
        assert_eq!(coordinator.registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_viewer_negotiation_failure_cleans_up() {
        let (coordinator, factory) = coordinator(RelayConfig::default());

        coordinator.broadcast(offer()).await.unwrap();
        factory
            .created(0)
            .unwrap()
            .deliver_track(factory.new_track(TrackKind::Audio));
        factory
            .created(0)
            .unwrap()
            .deliver_track(factory.new_track(TrackKind::Video));

        let relay = Arc::clone(&coordinator.relay);
        eventually(move || {
            let relay = Arc::clone(&relay);
            async move { relay.source_count().await == 2 }
        })
        .await;

        factory.fail_next_negotiation();
        let result = coordinator.view(offer()).await;

        assert!(matches!(result, Err(Error::NegotiationFailed(_))));
        // Only the broadcaster remains registered; its sources are intact
        assert_eq!(coordinator.registry.len().await, 1);
        assert_eq!(coordinator.relay.source_count().await, 2);

        // Subscriber accounting was rolled back with the failed viewer
        let audio = coordinator.relay.source(TrackKind::Audio).await.unwrap();
        assert_eq!(audio.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_viewer_times_out_with_no_broadcaster() {
        let (coordinator, _factory) = coordinator(
            RelayConfig::default().gate_wait_timeout(Some(Duration::from_millis(50))),
        );

        let result = coordinator.view(offer()).await;

        assert!(matches!(result, Err(Error::WaitTimeout(TrackKind::Audio))));
        assert!(coordinator.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_transport_failure_removes_connection() {
        let (coordinator, factory) = coordinator(RelayConfig::default());

        coordinator.broadcast(offer()).await.unwrap();
        let transport = factory.created(0).unwrap();
        transport.set_state(TransportState::Connected);
        transport.set_state(TransportState::Failed);

        let registry = Arc::clone(&coordinator.registry);
        eventually(move || {
            let registry = Arc::clone(&registry);
            async move { registry.is_empty().await }
        })
        .await;

        assert!(transport.is_closed());
        assert_eq!(coordinator.stats.snapshot().transport_failures, 1);
    }
}
