//! Readiness gate for viewers that arrive before the broadcaster
//!
//! A per-kind monotonic flag with multi-waiter release. Viewer negotiations
//! suspend on [`ReadinessGate::wait`] until the broadcaster's first track of
//! that kind is published; once signaled, a kind stays ready for the gate's
//! lifetime (there is no unpublish transition).

use std::time::Duration;

use tokio::sync::watch;

use super::track::TrackKind;

/// A gated wait expired before the kind was published
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateTimeout {
    /// The kind that never became ready
    pub kind: TrackKind,
    /// How long the caller waited
    pub waited: Duration,
}

impl std::fmt::Display for GateTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Timed out after {:?} waiting for a {} source",
            self.waited, self.kind
        )
    }
}

impl std::error::Error for GateTimeout {}

/// Per-kind readiness synchronization
///
/// Backed by one `watch` channel per kind: signaling flips the flag and
/// releases every waiter at once, with no ordering guarantee among them.
pub struct ReadinessGate {
    audio: watch::Sender<bool>,
    video: watch::Sender<bool>,
}

impl ReadinessGate {
    /// Create a gate with no kinds ready
    pub fn new() -> Self {
        let (audio, _) = watch::channel(false);
        let (video, _) = watch::channel(false);

        Self { audio, video }
    }

    fn slot(&self, kind: TrackKind) -> &watch::Sender<bool> {
        match kind {
            TrackKind::Audio => &self.audio,
            TrackKind::Video => &self.video,
        }
    }

    /// Mark a kind as available
    ///
    /// Idempotent: signaling an already-ready kind is a no-op.
    pub fn signal(&self, kind: TrackKind) {
        let slot = self.slot(kind);
        if !*slot.borrow() {
            slot.send_replace(true);
            tracing::debug!(kind = %kind, "Kind signaled ready");
        }
    }

    /// Check readiness without waiting
    pub fn is_ready(&self, kind: TrackKind) -> bool {
        *self.slot(kind).borrow()
    }

    /// Suspend until the kind becomes ready
    ///
    /// Returns immediately if already signaled. Waits indefinitely otherwise;
    /// production callers should prefer [`ReadinessGate::wait_timeout`].
    pub async fn wait(&self, kind: TrackKind) {
        let mut rx = self.slot(kind).subscribe();
        // The sender lives as long as the gate, so the channel cannot close
        // under a waiter.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Suspend until the kind becomes ready, or the deadline expires
    pub async fn wait_timeout(&self, kind: TrackKind, timeout: Duration) -> Result<(), GateTimeout> {
        tokio::time::timeout(timeout, self.wait(kind))
            .await
            .map_err(|_| GateTimeout {
                kind,
                waited: timeout,
            })
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}
