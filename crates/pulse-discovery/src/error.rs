//! Error types for pulse-discovery.

use thiserror::Error;

/// Discovery errors.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("REST refresh failed: {0}")]
    Refresh(#[from] pulse_rest::RestError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for discovery operations.
pub type DiscoveryResult<T> = std::result::Result<T, DiscoveryError>;
