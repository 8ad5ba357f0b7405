//! Relay server configuration

use std::time::Duration;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// How long a viewer negotiation waits for a kind to be published
    ///
    /// `None` waits indefinitely, matching the behavior of a relay with no
    /// bounded-wait policy. A kind that times out is skipped; a viewer that
    /// attaches nothing fails its negotiation.
    pub gate_wait_timeout: Option<Duration>,

    /// Whether a second broadcaster may replace a live one
    ///
    /// When disabled (the default), a publish offer is rejected while another
    /// broadcaster connection is live. When enabled, the new broadcaster's
    /// tracks overwrite the relay sources; viewers already attached keep the
    /// old tracks.
    pub broadcaster_takeover: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_connections: 0, // Unlimited
            gate_wait_timeout: Some(Duration::from_secs(30)),
            broadcaster_takeover: false,
        }
    }
}

impl RelayConfig {
    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the gated wait timeout (`None` = wait indefinitely)
    pub fn gate_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.gate_wait_timeout = timeout;
        self
    }

    /// Allow or reject broadcaster takeover
    pub fn broadcaster_takeover(mut self, allow: bool) -> Self {
        self.broadcaster_takeover = allow;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();

        assert_eq!(config.max_connections, 0);
        assert_eq!(config.gate_wait_timeout, Some(Duration::from_secs(30)));
        assert!(!config.broadcaster_takeover);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RelayConfig::default()
            .max_connections(64)
            .gate_wait_timeout(Some(Duration::from_secs(5)))
            .broadcaster_takeover(true);

        assert_eq!(config.max_connections, 64);
        assert_eq!(config.gate_wait_timeout, Some(Duration::from_secs(5)));
        assert!(config.broadcaster_takeover);
    }

    #[test]
    fn test_builder_unbounded_wait() {
        let config = RelayConfig::default().gate_wait_timeout(None);

        assert_eq!(config.gate_wait_timeout, None);
    }
}
