//! Relay error types

use super::track::TrackKind;

/// Error type for relay operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayError {
    /// No track of this kind has been published yet
    NoSource(TrackKind),
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::NoSource(kind) => write!(f, "No source track published for {}", kind),
        }
    }
}

impl std::error::Error for RelayError {}
