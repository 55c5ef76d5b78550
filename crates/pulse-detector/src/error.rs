//! Error types for pulse-detector.

use thiserror::Error;

/// Detector errors.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Invalid detector configuration: {0}")]
    ConfigError(String),
}

/// Result type alias for detector operations.
pub type DetectorResult<T> = std::result::Result<T, DetectorError>;
