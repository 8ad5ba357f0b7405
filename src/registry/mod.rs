//! Connection registry and per-connection state
//!
//! Tracks every live broadcaster and viewer connection from offer receipt
//! until the Closed/Failed cleanup removes it. The registry and the relay's
//! source table are the only state shared across concurrent negotiations.

pub mod connection;
pub mod error;
pub mod store;

pub use connection::{Connection, ConnectionId, ConnectionState, Role};
pub use error::RegistryError;
pub use store::ConnectionRegistry;
