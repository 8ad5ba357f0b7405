//! Server-wide relay statistics
//!
//! Counters for what the signaling layer itself observes; media-level
//! metrics (bitrate, frame counts) belong to the transport engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::registry::Role;

/// Atomic counters updated by the negotiation coordinator
pub struct RelayStats {
    broadcasters_total: AtomicU64,
    viewers_total: AtomicU64,
    tracks_published: AtomicU64,
    negotiation_failures: AtomicU64,
    transport_failures: AtomicU64,
    started_at: Instant,
}

impl RelayStats {
    /// Create a zeroed stats tracker
    pub fn new() -> Self {
        Self {
            broadcasters_total: AtomicU64::new(0),
            viewers_total: AtomicU64::new(0),
            tracks_published: AtomicU64::new(0),
            negotiation_failures: AtomicU64::new(0),
            transport_failures: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Count a new connection of the given role
    pub fn record_connection(&self, role: Role) {
        let counter = match role {
            Role::Broadcaster => &self.broadcasters_total,
            Role::Viewer => &self.viewers_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a track published into the relay
    pub fn record_track_published(&self) {
        self.tracks_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed offer/answer exchange
    pub fn record_negotiation_failure(&self) {
        self.negotiation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a transport-reported failure after negotiation
    pub fn record_transport_failure(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            broadcasters_total: self.broadcasters_total.load(Ordering::Relaxed),
            viewers_total: self.viewers_total.load(Ordering::Relaxed),
            tracks_published: self.tracks_published.load(Ordering::Relaxed),
            negotiation_failures: self.negotiation_failures.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the relay counters
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    /// Broadcaster connections ever created
    pub broadcasters_total: u64,
    /// Viewer connections ever created
    pub viewers_total: u64,
    /// Tracks published into the relay
    pub tracks_published: u64,
    /// Failed offer/answer exchanges
    pub negotiation_failures: u64,
    /// Transport failures after a completed negotiation
    pub transport_failures: u64,
    /// Time since the stats tracker was created
    pub uptime: Duration,
}
