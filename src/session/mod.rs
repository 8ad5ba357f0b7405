//! Negotiation and lifecycle coordination
//!
//! [`NegotiationCoordinator`] drives the role-aware offer/answer state
//! machine; [`ShutdownCoordinator`] drains the registry at termination.

pub mod negotiate;
pub mod shutdown;

pub use negotiate::NegotiationCoordinator;
pub use shutdown::{ShutdownCoordinator, ShutdownReport};
