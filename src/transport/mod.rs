//! Media-transport collaborator seam
//!
//! The actual media engine (ICE, DTLS, RTP, codec negotiation) lives outside
//! this crate. Per connection it is driven through the [`MediaTransport`]
//! trait and reports back through a channel of [`TransportEvent`]s, so the
//! orchestration core never touches media bytes and can be tested by
//! injecting synthetic notifications.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::mpsc;

use crate::relay::{SourceTrack, TrackFrame, TrackKind};

pub mod loopback;

pub use loopback::{LoopbackFactory, LoopbackTransport};

/// Type tag of a session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// The first message of the negotiation exchange
    Offer,
    /// The response completing the exchange
    Answer,
}

/// An SDP-like session description plus its type tag
///
/// This is the signaling payload: peers POST an offer and receive an answer.
/// Serialized with `type`/`sdp` fields to match the browser-side
/// `RTCSessionDescription` JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Description type
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    /// Description body
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// Check whether this description is an offer
    pub fn is_offer(&self) -> bool {
        self.sdp_type == SdpType::Offer
    }
}

/// Connection state as reported by the transport engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Negotiation/ICE in progress
    Connecting,
    /// Media is flowing
    Connected,
    /// The transport gave up on the connection
    Failed,
    /// The connection was closed
    Closed,
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::Failed => "failed",
            TransportState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Asynchronous notification from the transport engine
///
/// Delivered over the per-connection event channel returned by
/// [`TransportFactory::create_transport`]. The negotiation coordinator drains
/// this channel in a spawned task; the transport's own notification model
/// stays decoupled from the core's control flow.
#[derive(Debug)]
pub enum TransportEvent {
    /// The connection state changed
    StateChanged(TransportState),
    /// An inbound track arrived (broadcaster connections only)
    TrackReceived(SourceTrack),
}

/// Error type for transport operations
#[derive(Debug, Clone)]
pub enum TransportError {
    /// The description could not be parsed or applied
    InvalidDescription(String),
    /// The transport failed mid-operation
    Failed(String),
    /// The transport is already closed
    Closed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::InvalidDescription(reason) => {
                write!(f, "Invalid session description: {}", reason)
            }
            TransportError::Failed(reason) => write!(f, "Transport failed: {}", reason),
            TransportError::Closed => write!(f, "Transport is closed"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Per-connection interface onto the external media engine
///
/// All methods may suspend while the engine performs its own asynchronous
/// work; this crate only awaits completion, it never drives the engine.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Apply the remote peer's description (the received offer)
    async fn apply_remote_description(
        &self,
        desc: &SessionDescription,
    ) -> Result<(), TransportError>;

    /// Produce a local description answering the applied offer
    async fn create_local_description(&self) -> Result<SessionDescription, TransportError>;

    /// Apply the local description, committing the negotiation
    async fn apply_local_description(
        &self,
        desc: &SessionDescription,
    ) -> Result<(), TransportError>;

    /// Attach a relayed track to this connection's outbound media
    ///
    /// `frames` is the media path; the accounting subscription stays with the
    /// owning connection.
    async fn attach_track(
        &self,
        kind: TrackKind,
        frames: broadcast::Receiver<TrackFrame>,
    ) -> Result<(), TransportError>;

    /// Tear the transport down
    async fn close(&self) -> Result<(), TransportError>;
}

/// Factory producing one transport (and its event channel) per connection
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Create a transport for a new connection
    async fn create_transport(
        &self,
    ) -> Result<
        (
            Arc<dyn MediaTransport>,
            mpsc::UnboundedReceiver<TransportEvent>,
        ),
        TransportError,
    >;
}
