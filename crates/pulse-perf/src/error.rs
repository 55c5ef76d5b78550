//! Error types for pulse-perf.

use thiserror::Error;

/// Performance tracking errors.
#[derive(Debug, Error)]
pub enum PerfError {
    #[error("Unknown signal: {0}")]
    UnknownSignal(String),

    #[error("Horizon already filled: {signal_id} @ {horizon}")]
    HorizonAlreadyFilled { signal_id: String, horizon: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for performance operations.
pub type PerfResult<T> = std::result::Result<T, PerfError>;
