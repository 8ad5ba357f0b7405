//! Track and frame types for relay fan-out
//!
//! A broadcaster publishes one [`SourceTrack`] per kind; every viewer gets an
//! independent [`RelaySubscription`] off it. Frames are opaque to this layer
//! and carried as `Bytes`, so fan-out clones are reference-counted, not copied.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::broadcast;

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

impl TrackKind {
    /// All kinds, in the fixed order viewers attach them (audio then video)
    pub const ALL: [TrackKind; 2] = [TrackKind::Audio, TrackKind::Video];

    /// Kind name as used on the signaling wire
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier for a source track, allocated by the transport that received it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(pub u64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single media frame relayed from the source to subscribers
///
/// The payload is whatever the transport produced (e.g. an RTP payload);
/// this layer never inspects it. Cheap to clone via `Bytes` reference
/// counting.
#[derive(Debug, Clone)]
pub struct TrackFrame {
    /// Opaque frame data
    pub payload: Bytes,
    /// Media timestamp from the transport
    pub timestamp: u32,
    /// Transport marker bit (e.g. end of a video frame)
    pub marker: bool,
}

impl TrackFrame {
    /// Create a new frame
    pub fn new(payload: Bytes, timestamp: u32, marker: bool) -> Self {
        Self {
            payload,
            timestamp,
            marker,
        }
    }
}

/// The single published source for one track kind
///
/// Created by the transport when the broadcaster's media arrives, stored in
/// the relay's source table, and read-only to subscribers. The transport
/// keeps feeding frames through [`SourceTrack::feed`]; subscribers each hold
/// their own `broadcast::Receiver`.
pub struct SourceTrack {
    id: TrackId,
    kind: TrackKind,
    tx: broadcast::Sender<TrackFrame>,
    subscribers: AtomicU32,
}

impl SourceTrack {
    /// Create a new source track with the given frame buffer capacity
    pub fn new(id: TrackId, kind: TrackKind, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);

        Self {
            id,
            kind,
            tx,
            subscribers: AtomicU32::new(0),
        }
    }

    /// Track identifier
    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Track kind
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Number of live relay subscriptions on this source
    pub fn subscriber_count(&self) -> u32 {
        self.subscribers.load(Ordering::Relaxed)
    }

    /// Feed a frame to all subscribers
    ///
    /// Returns the number of receivers that got the frame (0 if nobody is
    /// listening, which is not an error).
    pub fn feed(&self, frame: TrackFrame) -> usize {
        self.tx.send(frame).unwrap_or(0)
    }

    /// Create a new subscription handle bound to this source
    pub(crate) fn attach(self: &Arc<Self>, id: u64) -> RelaySubscription {
        self.subscribers.fetch_add(1, Ordering::Relaxed);

        RelaySubscription {
            id,
            rx: self.tx.subscribe(),
            source: Arc::clone(self),
        }
    }
}

impl std::fmt::Debug for SourceTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// An independent consumer handle on a published source track
///
/// Each subscription has its own receiver; dropping one never affects the
/// source or sibling subscriptions.
pub struct RelaySubscription {
    id: u64,
    rx: broadcast::Receiver<TrackFrame>,
    source: Arc<SourceTrack>,
}

impl RelaySubscription {
    /// Subscription identifier
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Kind of the underlying source track
    pub fn kind(&self) -> TrackKind {
        self.source.kind()
    }

    /// Identifier of the underlying source track
    pub fn track_id(&self) -> TrackId {
        self.source.id()
    }

    /// Receive the next relayed frame
    pub async fn recv(&mut self) -> Result<TrackFrame, broadcast::error::RecvError> {
        self.rx.recv().await
    }

    /// Receive without waiting
    pub fn try_recv(&mut self) -> Result<TrackFrame, broadcast::error::TryRecvError> {
        self.rx.try_recv()
    }

    /// Create an additional frame receiver for this subscription
    ///
    /// Used to hand the media path to a transport while the subscription
    /// itself stays with the owning connection for accounting. Does not count
    /// as a separate subscriber.
    pub fn frames(&self) -> broadcast::Receiver<TrackFrame> {
        self.rx.resubscribe()
    }

    /// Close the subscription, detaching it from the source
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for RelaySubscription {
    fn drop(&mut self) {
        self.source.subscribers.fetch_sub(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for RelaySubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySubscription")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("track_id", &self.track_id())
            .finish()
    }
}
