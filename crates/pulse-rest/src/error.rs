//! Error types for pulse-rest.

use chrono::{DateTime, Utc};
use pulse_core::ErrorClass;
use thiserror::Error;

/// REST client errors.
#[derive(Debug, Error)]
pub enum RestError {
    #[error("Rate limited by upstream{}", reset_hint(.reset_at))]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("Upstream returned {status}")]
    Upstream { status: u16 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("HTTP transport error: {0}")]
    Transport(String),

    #[error("Malformed payload: {0}")]
    Parse(String),
}

fn reset_hint(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(t) => format!(", resets at {t}"),
        None => String::new(),
    }
}

impl RestError {
    /// Map onto the shared taxonomy for retry/alert policy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::RateLimited { .. } | Self::Timeout { .. } | Self::Transport(_) => {
                ErrorClass::Transient
            }
            Self::Upstream { status } if *status >= 500 => ErrorClass::Transient,
            Self::Upstream { .. } | Self::Parse(_) => ErrorClass::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }
}

impl From<reqwest::Error> for RestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout { timeout_secs: 0 };
        }
        if let Some(status) = e.status() {
            return Self::Upstream {
                status: status.as_u16(),
            };
        }
        Self::Transport(e.to_string())
    }
}

/// Result type alias for REST operations.
pub type RestResult<T> = std::result::Result<T, RestError>;
