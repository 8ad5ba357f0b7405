//! Per-connection state
//!
//! Each negotiation request gets one [`Connection`]: an identity, a role, a
//! checked lifecycle state machine, the transport handle, and the relay
//! subscriptions it holds. The registry owns connections from creation until
//! removal; nothing else retains them past that point.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, RwLock};

use crate::relay::{RelaySubscription, TrackKind};
use crate::transport::{MediaTransport, TransportError};

/// Unique identifier for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a connection in the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Publishes tracks into the relay
    Broadcaster,
    /// Consumes relayed tracks
    Viewer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Broadcaster => "broadcaster",
            Role::Viewer => "viewer",
        };
        f.write_str(s)
    }
}

/// Connection lifecycle state
///
/// Legal transitions: `New → Negotiating → Connected`,
/// `Negotiating → Failed`, `Connected → Failed`, and
/// `{Negotiating, Connected, Failed} → Closed`. Failed and Closed are
/// terminal for negotiation purposes; once Closed, no further operations are
/// valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, offer not yet applied
    New,
    /// Offer/answer exchange in progress
    Negotiating,
    /// Transport reported the session established
    Connected,
    /// Transport reported failure
    Failed,
    /// Closed and removed from the registry
    Closed,
}

impl ConnectionState {
    /// Whether the connection can make no further progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }

    fn can_transition_to(&self, to: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, to),
            (New, Negotiating)
                | (Negotiating, Connected)
                | (Negotiating, Failed)
                | (Connected, Failed)
                | (Negotiating, Closed)
                | (Connected, Closed)
                | (Failed, Closed)
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::New => "new",
            ConnectionState::Negotiating => "negotiating",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// A single broadcaster or viewer connection
pub struct Connection {
    id: ConnectionId,
    role: Role,
    state: RwLock<ConnectionState>,
    transport: Arc<dyn MediaTransport>,
    subscriptions: Mutex<Vec<RelaySubscription>>,
    created_at: Instant,
}

impl Connection {
    /// Create a new connection in the `New` state
    pub fn new(id: ConnectionId, role: Role, transport: Arc<dyn MediaTransport>) -> Arc<Self> {
        Arc::new(Self {
            id,
            role,
            state: RwLock::new(ConnectionState::New),
            transport,
            subscriptions: Mutex::new(Vec::new()),
            created_at: Instant::now(),
        })
    }

    /// Connection identifier
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Connection role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Transport handle for this connection
    pub fn transport(&self) -> &Arc<dyn MediaTransport> {
        &self.transport
    }

    /// Current lifecycle state
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Attempt a state transition, returning whether it was applied
    ///
    /// Illegal transitions are rejected and logged; they leave the state
    /// untouched.
    pub async fn transition(&self, to: ConnectionState) -> bool {
        let mut state = self.state.write().await;

        if state.can_transition_to(to) {
            tracing::debug!(
                connection_id = %self.id,
                role = %self.role,
                from = %*state,
                to = %to,
                "Connection state transition"
            );
            *state = to;
            true
        } else {
            tracing::warn!(
                connection_id = %self.id,
                from = %*state,
                to = %to,
                "Rejected connection state transition"
            );
            false
        }
    }

    /// Record a relay subscription held by this connection
    pub async fn add_subscription(&self, subscription: RelaySubscription) {
        self.subscriptions.lock().await.push(subscription);
    }

    /// Kinds this connection has attached, in attachment order
    pub async fn attached_kinds(&self) -> Vec<TrackKind> {
        self.subscriptions
            .lock()
            .await
            .iter()
            .map(|s| s.kind())
            .collect()
    }

    /// Close the connection, releasing its subscriptions and transport
    ///
    /// Idempotent: closing an already-closed connection is a no-op. Only this
    /// connection's subscriptions are dropped; other connections are never
    /// affected.
    pub async fn close(&self) -> Result<(), TransportError> {
        {
            let mut state = self.state.write().await;
            if *state == ConnectionState::Closed {
                return Ok(());
            }
            *state = ConnectionState::Closed;
        }

        self.subscriptions.lock().await.clear();

        tracing::debug!(
            connection_id = %self.id,
            role = %self.role,
            age_ms = self.created_at.elapsed().as_millis() as u64,
            "Connection closed"
        );

        self.transport.close().await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("role", &self.role)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackTransport;

    fn connection(role: Role) -> Arc<Connection> {
        let (transport, _events) = LoopbackTransport::new();
        Connection::new(ConnectionId(1), role, transport)
    }

    #[tokio::test]
    async fn test_lifecycle_happy_path() {
        let conn = connection(Role::Broadcaster);
        assert_eq!(conn.state().await, ConnectionState::New);

        assert!(conn.transition(ConnectionState::Negotiating).await);
        assert!(conn.transition(ConnectionState::Connected).await);
        assert!(conn.transition(ConnectionState::Failed).await);
        assert!(conn.transition(ConnectionState::Closed).await);
        assert!(conn.state().await.is_terminal());
    }

    #[tokio::test]
    async fn test_illegal_transitions_rejected() {
        let conn = connection(Role::Viewer);

        // Cannot connect or close without negotiating first
        assert!(!conn.transition(ConnectionState::Connected).await);
        assert!(!conn.transition(ConnectionState::Closed).await);
        assert_eq!(conn.state().await, ConnectionState::New);

        assert!(conn.transition(ConnectionState::Negotiating).await);
        assert!(conn.transition(ConnectionState::Closed).await);

        // Closed is terminal
        assert!(!conn.transition(ConnectionState::Negotiating).await);
        assert!(!conn.transition(ConnectionState::Failed).await);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let conn = connection(Role::Viewer);
        conn.transition(ConnectionState::Negotiating).await;

        conn.close().await.unwrap();
        assert_eq!(conn.state().await, ConnectionState::Closed);

        // Second close does not touch the transport again
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_releases_subscriptions() {
        use crate::relay::{TrackId, TrackKind};

        let conn = connection(Role::Viewer);
        conn.transition(ConnectionState::Negotiating).await;

        let source = Arc::new(crate::relay::SourceTrack::new(
            TrackId(1),
            TrackKind::Video,
            16,
        ));
        conn.add_subscription(source.attach(1)).await;
        assert_eq!(source.subscriber_count(), 1);
        assert_eq!(conn.attached_kinds().await, vec![TrackKind::Video]);

        conn.close().await.unwrap();
        assert_eq!(source.subscriber_count(), 0);
    }
}
