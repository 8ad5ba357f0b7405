//! One-to-many WebRTC broadcast relay orchestration
//!
//! Bridges a single broadcasting peer to any number of viewers over a
//! real-time media transport, without re-encoding or storing the stream.
//! The media engine itself (ICE, DTLS, RTP, codecs) is an external
//! collaborator behind the [`transport::MediaTransport`] trait; this crate
//! owns the signaling and relay orchestration:
//!
//! - [`registry::ConnectionRegistry`] — every live broadcaster/viewer
//!   connection, from offer receipt to teardown
//! - [`relay::TrackRelay`] — single-producer, multi-consumer track fan-out
//! - [`relay::ReadinessGate`] — parks viewers that arrive before the
//!   broadcaster has published
//! - [`session::NegotiationCoordinator`] — the role-aware offer/answer state
//!   machine
//! - [`session::ShutdownCoordinator`] — bulk teardown at termination
//!
//! All shared state hangs off one [`server::RelayServer`] context object.
//!
//! # Example
//! ```no_run
//! use rtc_relay::server::RelayServer;
//! use rtc_relay::transport::{LoopbackFactory, SessionDescription};
//!
//! # async fn example() -> rtc_relay::error::Result<()> {
//! let server = RelayServer::new(LoopbackFactory::new());
//!
//! // Broadcaster offers; tracks flow in asynchronously afterwards
//! let broadcast_answer = server.publish(SessionDescription::offer("v=0\r\n")).await?;
//!
//! // Each viewer offers independently and receives the relayed tracks
//! let viewer_answer = server.view(SessionDescription::offer("v=0\r\n")).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;
pub mod stats;
pub mod transport;

pub use error::{Error, Result};
pub use registry::{Connection, ConnectionId, ConnectionRegistry, ConnectionState, Role};
pub use relay::{
    ReadinessGate, RelaySubscription, SourceTrack, TrackFrame, TrackId, TrackKind, TrackRelay,
};
pub use server::{RelayConfig, RelayServer};
pub use session::{NegotiationCoordinator, ShutdownCoordinator, ShutdownReport};
pub use transport::{
    MediaTransport, SdpType, SessionDescription, TransportError, TransportEvent, TransportFactory,
    TransportState,
};
