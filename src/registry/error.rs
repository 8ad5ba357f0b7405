//! Registry error types

/// Error type for admission into the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// Another broadcaster is already registered and takeover is disabled
    BroadcasterActive,
    /// The configured connection limit was reached
    ConnectionLimit(usize),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::BroadcasterActive => {
                write!(f, "A broadcaster is already registered")
            }
            RegistryError::ConnectionLimit(max) => {
                write!(f, "Connection limit reached ({} connections)", max)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
