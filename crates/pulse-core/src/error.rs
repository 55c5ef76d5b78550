//! Error types for pulse-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid market: {0}")]
    InvalidMarket(String),

    #[error("Invalid orderbook: {0}")]
    InvalidOrderbook(String),

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Shared error taxonomy driving retry and alerting policy.
///
/// - `Transient`: I/O failures, upstream 5xx, 429 — retried with backoff.
/// - `Permanent`: other 4xx, malformed payloads — logged, alerted, not retried.
/// - `Resource`: queue overflow, buffer full — item dropped, counter bumped.
/// - `Logic`: invariant violation — CRITICAL alert, component restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Transient,
    Permanent,
    Resource,
    Logic,
}

impl ErrorClass {
    /// Whether this class of error should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Resource => "resource",
            Self::Logic => "logic",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
