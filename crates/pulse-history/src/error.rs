//! Error types for pulse-history.

use thiserror::Error;

/// History and correlation errors.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Unknown market: {0}")]
    UnknownMarket(String),

    #[error("Insufficient history for {market_id}: {points} points, need {needed}")]
    InsufficientHistory {
        market_id: String,
        points: usize,
        needed: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for history operations.
pub type HistoryResult<T> = std::result::Result<T, HistoryError>;
