//! Statistics for the relay server

pub mod metrics;

pub use metrics::{RelayStats, StatsSnapshot};
