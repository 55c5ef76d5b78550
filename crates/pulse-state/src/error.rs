//! Error types for pulse-state.

use thiserror::Error;

/// State maintenance errors.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Unknown market: {0}")]
    UnknownMarket(String),

    #[error("Non-monotonic update for {market_id}: {last_ms} -> {new_ms}")]
    NonMonotonicUpdate {
        market_id: String,
        last_ms: i64,
        new_ms: i64,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for state operations.
pub type StateResult<T> = std::result::Result<T, StateError>;
