//! In-process transport for tests and demos
//!
//! Stands in for a real media engine: descriptions are accepted verbatim,
//! answers are synthesized from the attached tracks, and state changes or
//! inbound tracks are injected by the test through the factory's retained
//! handles. No media bytes are moved beyond the relay's own channels.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::mpsc;

use crate::relay::{SourceTrack, TrackFrame, TrackId, TrackKind};

use super::{
    MediaTransport, SessionDescription, TransportError, TransportEvent, TransportFactory,
    TransportState,
};

/// Frame buffer capacity for tracks created by [`LoopbackFactory::new_track`]
const FRAME_CAPACITY: usize = 64;

#[derive(Default)]
struct Inner {
    remote: Option<SessionDescription>,
    local: Option<SessionDescription>,
    attached: Vec<(TrackKind, broadcast::Receiver<TrackFrame>)>,
    closed: bool,
    fail_negotiation: bool,
    fail_close: bool,
}

/// Transport stand-in that loops signaling back to the caller
pub struct LoopbackTransport {
    events: mpsc::UnboundedSender<TransportEvent>,
    inner: Mutex<Inner>,
}

impl LoopbackTransport {
    /// Create a transport and the event channel it reports on
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let transport = Arc::new(Self {
            events: tx,
            inner: Mutex::new(Inner::default()),
        });

        (transport, rx)
    }

    /// Inject an inbound-track notification, as the engine would on
    /// receiving the broadcaster's media
    pub fn deliver_track(&self, track: SourceTrack) {
        let _ = self.events.send(TransportEvent::TrackReceived(track));
    }

    /// Inject a state-change notification
    pub fn set_state(&self, state: TransportState) {
        let _ = self.events.send(TransportEvent::StateChanged(state));
    }

    /// Make the next negotiation step fail
    pub fn fail_negotiation(&self) {
        self.inner.lock().unwrap().fail_negotiation = true;
    }

    /// Make `close` report a failure
    pub fn fail_close(&self) {
        self.inner.lock().unwrap().fail_close = true;
    }

    /// Kinds attached to this transport, in attachment order
    pub fn attached_kinds(&self) -> Vec<TrackKind> {
        self.inner
            .lock()
            .unwrap()
            .attached
            .iter()
            .map(|(kind, _)| *kind)
            .collect()
    }

    /// The remote description applied to this transport, if any
    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.inner.lock().unwrap().remote.clone()
    }

    /// Whether the transport has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    fn check_open(inner: &Inner) -> Result<(), TransportError> {
        if inner.closed {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MediaTransport for LoopbackTransport {
    async fn apply_remote_description(
        &self,
        desc: &SessionDescription,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_open(&inner)?;

        if desc.sdp.trim().is_empty() {
            return Err(TransportError::InvalidDescription("empty sdp".into()));
        }

        inner.remote = Some(desc.clone());
        Ok(())
    }

    async fn create_local_description(&self) -> Result<SessionDescription, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_open(&inner)?;

        if inner.fail_negotiation {
            inner.fail_negotiation = false;
            return Err(TransportError::Failed("simulated negotiation failure".into()));
        }

        if inner.remote.is_none() {
            return Err(TransportError::InvalidDescription(
                "no remote description applied".into(),
            ));
        }

        // Synthesize an answer whose media sections mirror the attached
        // tracks, in attachment order.
        let mut sdp = String::from("v=0\r\ns=loopback\r\n");
        for (kind, _) in &inner.attached {
            sdp.push_str(&format!("m={} 9 UDP/TLS/RTP/SAVPF 0\r\n", kind));
        }

        Ok(SessionDescription::answer(sdp))
    }

    async fn apply_local_description(
        &self,
        desc: &SessionDescription,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_open(&inner)?;

        inner.local = Some(desc.clone());
        Ok(())
    }

    async fn attach_track(
        &self,
        kind: TrackKind,
        frames: broadcast::Receiver<TrackFrame>,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_open(&inner)?;

        inner.attached.push((kind, frames));
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Ok(());
        }

        inner.closed = true;
        inner.attached.clear();

        if inner.fail_close {
            return Err(TransportError::Failed("simulated close failure".into()));
        }
        Ok(())
    }
}

/// Factory that retains handles to every transport it creates
///
/// Tests drive a scenario by calling `publish`/`view` on the server, then
/// fetching the matching transport handle here to inject notifications.
pub struct LoopbackFactory {
    created: Mutex<Vec<Arc<LoopbackTransport>>>,
    next_track_id: AtomicU64,
    fail_next_negotiation: AtomicBool,
}

impl LoopbackFactory {
    /// Create an empty factory
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            created: Mutex::new(Vec::new()),
            next_track_id: AtomicU64::new(1),
            fail_next_negotiation: AtomicBool::new(false),
        })
    }

    /// Arm a negotiation failure on the next transport created
    pub fn fail_next_negotiation(&self) {
        self.fail_next_negotiation.store(true, Ordering::Relaxed);
    }

    /// Transport created for the `index`-th connection
    pub fn created(&self, index: usize) -> Option<Arc<LoopbackTransport>> {
        self.created.lock().unwrap().get(index).cloned()
    }

    /// Most recently created transport
    pub fn last(&self) -> Option<Arc<LoopbackTransport>> {
        self.created.lock().unwrap().last().cloned()
    }

    /// Number of transports created so far
    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    /// Build a source track with a fresh ID, as the engine would for an
    /// inbound media stream
    pub fn new_track(&self, kind: TrackKind) -> SourceTrack {
        let id = TrackId(self.next_track_id.fetch_add(1, Ordering::Relaxed));
        SourceTrack::new(id, kind, FRAME_CAPACITY)
    }
}

#[async_trait]
impl TransportFactory for LoopbackFactory {
    async fn create_transport(
        &self,
    ) -> Result<
        (
            Arc<dyn MediaTransport>,
            mpsc::UnboundedReceiver<TransportEvent>,
        ),
        TransportError,
    > {
        let (transport, events) = LoopbackTransport::new();
        if self.fail_next_negotiation.swap(false, Ordering::Relaxed) {
            transport.fail_negotiation();
        }
        self.created.lock().unwrap().push(Arc::clone(&transport));

        Ok((transport, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_answer_mirrors_attached_kinds() {
        let (transport, _events) = LoopbackTransport::new();

        transport
            .apply_remote_description(&SessionDescription::offer("v=0\r\n"))
            .await
            .unwrap();

        let (audio_tx, _) = broadcast::channel::<TrackFrame>(4);
        let (video_tx, _) = broadcast::channel::<TrackFrame>(4);

        transport
            .attach_track(TrackKind::Audio, audio_tx.subscribe())
            .await
            .unwrap();
        transport
            .attach_track(TrackKind::Video, video_tx.subscribe())
            .await
            .unwrap();

        assert_eq!(
            transport.attached_kinds(),
            vec![TrackKind::Audio, TrackKind::Video]
        );

        let answer = transport.create_local_description().await.unwrap();
        let audio_pos = answer.sdp.find("m=audio").unwrap();
        let video_pos = answer.sdp.find("m=video").unwrap();
        assert!(audio_pos < video_pos);
    }

    #[tokio::test]
    async fn test_rejects_empty_offer() {
        let (transport, _events) = LoopbackTransport::new();

        let result = transport
            .apply_remote_description(&SessionDescription::offer("  "))
            .await;
        assert!(matches!(
            result,
            Err(TransportError::InvalidDescription(_))
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_detaches() {
        let (transport, _events) = LoopbackTransport::new();
        let factory = LoopbackFactory::new();

        let track = Arc::new(factory.new_track(TrackKind::Video));
        let sub = track.attach(1);
        transport
            .attach_track(TrackKind::Video, sub.frames())
            .await
            .unwrap();

        transport.close().await.unwrap();
        assert!(transport.is_closed());
        transport.close().await.unwrap();

        let result = transport.create_local_description().await;
        assert!(matches!(result, Err(TransportError::Closed)));
        drop(sub);
        assert_eq!(track.subscriber_count(), 0);
    }
}
