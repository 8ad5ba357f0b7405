//! Crate-level error types
//!
//! Negotiation errors are local to the offending connection: they terminate
//! that connection only, and never corrupt registry or relay state.

use crate::registry::RegistryError;
use crate::relay::{GateTimeout, RelayError, TrackKind};
use crate::transport::TransportError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for signaling and relay operations
#[derive(Debug)]
pub enum Error {
    /// Malformed or unacceptable remote description
    InvalidOffer(String),
    /// Transport-reported failure during the offer/answer exchange
    NegotiationFailed(TransportError),
    /// No track of this kind has been published
    NoSource(TrackKind),
    /// The gated wait expired before any requested kind was published
    WaitTimeout(TrackKind),
    /// Another broadcaster is already live and takeover is disabled
    BroadcasterActive,
    /// The configured connection limit was reached
    ConnectionLimit(usize),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidOffer(reason) => write!(f, "Invalid offer: {}", reason),
            Error::NegotiationFailed(e) => write!(f, "Negotiation failed: {}", e),
            Error::NoSource(kind) => write!(f, "No source track published for {}", kind),
            Error::WaitTimeout(kind) => {
                write!(f, "Timed out waiting for a {} source", kind)
            }
            Error::BroadcasterActive => write!(f, "A broadcaster is already active"),
            Error::ConnectionLimit(max) => {
                write!(f, "Connection limit reached ({} connections)", max)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NegotiationFailed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::NegotiationFailed(e)
    }
}

impl From<RelayError> for Error {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::NoSource(kind) => Error::NoSource(kind),
        }
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::BroadcasterActive => Error::BroadcasterActive,
            RegistryError::ConnectionLimit(max) => Error::ConnectionLimit(max),
        }
    }
}

impl From<GateTimeout> for Error {
    fn from(e: GateTimeout) -> Self {
        Error::WaitTimeout(e.kind)
    }
}
