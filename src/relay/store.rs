//! Track relay source table
//!
//! Holds the single published source per track kind and hands out independent
//! subscriptions. The table is the only track state shared across concurrent
//! negotiations, so every mutation is atomic with respect to readers: a
//! viewer's `subscribe` observes either no source or a fully published one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::error::RelayError;
use super::track::{RelaySubscription, SourceTrack, TrackKind};

/// One-to-many track relay
///
/// A broadcaster's negotiation publishes inbound tracks here; every viewer
/// negotiation subscribes. Publishing a kind that already has a source
/// overwrites it (single-broadcaster design): existing subscribers keep the
/// old source and are not notified. The table is not cleared when the
/// broadcaster disconnects; stale sources stay readable until the next
/// publish replaces them.
pub struct TrackRelay {
    /// Map of kind to the currently-published source
    sources: RwLock<HashMap<TrackKind, Arc<SourceTrack>>>,

    /// Next subscription ID to allocate
    next_subscription_id: AtomicU64,
}

impl TrackRelay {
    /// Create an empty relay
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
            next_subscription_id: AtomicU64::new(1),
        }
    }

    /// Publish a track as the relay source for its kind
    ///
    /// Overwrites any prior source for the same kind. Returns the stored
    /// source handle so the caller can keep feeding frames into it.
    pub async fn publish(&self, track: SourceTrack) -> Arc<SourceTrack> {
        let kind = track.kind();
        let track = Arc::new(track);

        let mut sources = self.sources.write().await;
        if let Some(prev) = sources.insert(kind, Arc::clone(&track)) {
            tracing::warn!(
                kind = %kind,
                prev_track = %prev.id(),
                new_track = %track.id(),
                prev_subscribers = prev.subscriber_count(),
                "Source track replaced; existing subscribers keep the old source"
            );
        } else {
            tracing::info!(kind = %kind, track = %track.id(), "Source track published");
        }

        track
    }

    /// Subscribe to the current source for a kind
    ///
    /// Returns a new, independent subscription handle, or
    /// [`RelayError::NoSource`] if nothing has been published for the kind
    /// yet. Under the gated negotiation flow this error only occurs in a
    /// non-blocking variant and is retryable, not fatal.
    pub async fn subscribe(&self, kind: TrackKind) -> Result<RelaySubscription, RelayError> {
        let sources = self.sources.read().await;

        let source = sources.get(&kind).ok_or(RelayError::NoSource(kind))?;

        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        let subscription = source.attach(id);

        tracing::debug!(
            kind = %kind,
            track = %source.id(),
            subscription = id,
            subscribers = source.subscriber_count(),
            "Subscriber added"
        );

        Ok(subscription)
    }

    /// Check whether a source is published for a kind
    pub async fn has_source(&self, kind: TrackKind) -> bool {
        self.sources.read().await.contains_key(&kind)
    }

    /// Get the current source for a kind
    pub async fn source(&self, kind: TrackKind) -> Option<Arc<SourceTrack>> {
        self.sources.read().await.get(&kind).cloned()
    }

    /// Number of kinds with a published source
    pub async fn source_count(&self) -> usize {
        self.sources.read().await.len()
    }
}

impl Default for TrackRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::super::track::{TrackFrame, TrackId};
    use super::*;

    fn track(id: u64, kind: TrackKind) -> SourceTrack {
        SourceTrack::new(TrackId(id), kind, 16)
    }

    #[tokio::test]
    async fn test_subscribe_without_source() {
        let relay = TrackRelay::new();

        let result = relay.subscribe(TrackKind::Video).await;
        assert_eq!(result.unwrap_err(), RelayError::NoSource(TrackKind::Video));
    }

    #[tokio::test]
    async fn test_publish_and_subscribe() {
        let relay = TrackRelay::new();
        let source = relay.publish(track(1, TrackKind::Audio)).await;

        let mut sub_a = relay.subscribe(TrackKind::Audio).await.unwrap();
        let mut sub_b = relay.subscribe(TrackKind::Audio).await.unwrap();
        assert_ne!(sub_a.id(), sub_b.id());
        assert_eq!(source.subscriber_count(), 2);

        source.feed(TrackFrame::new(Bytes::from_static(b"\x00"), 10, false));
        assert_eq!(sub_a.recv().await.unwrap().timestamp, 10);
        assert_eq!(sub_b.recv().await.unwrap().timestamp, 10);

        // Video is still unpublished
        assert!(!relay.has_source(TrackKind::Video).await);
    }

    #[tokio::test]
    async fn test_overwrite_keeps_old_subscribers_on_old_source() {
        let relay = TrackRelay::new();
        let old = relay.publish(track(1, TrackKind::Video)).await;
        let mut old_sub = relay.subscribe(TrackKind::Video).await.unwrap();

        let new = relay.publish(track(2, TrackKind::Video)).await;
        assert_eq!(relay.source(TrackKind::Video).await.unwrap().id(), TrackId(2));

        // The replaced source still serves its existing subscriber
        old.feed(TrackFrame::new(Bytes::from_static(b"\x01"), 5, false));
        assert_eq!(old_sub.recv().await.unwrap().timestamp, 5);
        assert_eq!(old_sub.track_id(), TrackId(1));

        // New subscriptions bind to the new source
        let new_sub = relay.subscribe(TrackKind::Video).await.unwrap();
        assert_eq!(new_sub.track_id(), TrackId(2));
        assert_eq!(new.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_source_count() {
        let relay = TrackRelay::new();
        assert_eq!(relay.source_count().await, 0);

        relay.publish(track(1, TrackKind::Audio)).await;
        relay.publish(track(2, TrackKind::Video)).await;
        relay.publish(track(3, TrackKind::Video)).await; // overwrite, not a new kind
        assert_eq!(relay.source_count().await, 2);
    }
}
