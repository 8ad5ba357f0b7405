//! Track relay: single-producer, multi-consumer fan-out
//!
//! The relay takes the one track per kind that a broadcaster publishes and
//! fans it out to any number of viewers. It uses `tokio::sync::broadcast`
//! for zero-copy frame distribution and a `watch`-backed readiness gate to
//! park viewers that arrive before the broadcaster.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<TrackRelay>
//!                 ┌───────────────────────────┐
//!                 │ sources: HashMap<Kind,    │
//!                 │   Arc<SourceTrack {       │
//!                 │     tx: broadcast::Tx,    │
//!                 │   }>                      │
//!                 │ >                         │
//!                 └────────────┬──────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!   [Broadcaster]          [Viewer]              [Viewer]
//!   publish(track)         subscribe(kind)       subscribe(kind)
//!        │                     │                     │
//!        └──► SourceTrack::feed() ──► independent receivers
//! ```
//!
//! # Zero-Copy Design
//!
//! Frame payloads are `bytes::Bytes`, so the broadcast channel clones a
//! [`TrackFrame`] per subscriber but the underlying data is only
//! reference-counted, never copied.

pub mod error;
pub mod gate;
pub mod store;
pub mod track;

pub use error::RelayError;
pub use gate::{GateTimeout, ReadinessGate};
pub use store::TrackRelay;
pub use track::{RelaySubscription, SourceTrack, TrackFrame, TrackId, TrackKind};
