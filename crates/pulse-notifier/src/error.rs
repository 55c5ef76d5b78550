//! Error types for pulse-notifier.

use thiserror::Error;

/// Notifier errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Webhook returned {status}")]
    WebhookStatus { status: u16 },

    #[error("Webhook rate limited, retry after {retry_after_secs}s")]
    WebhookRateLimited { retry_after_secs: u64 },

    #[error("Webhook delivery disabled")]
    DeliveryDisabled,

    #[error("Webhook transport error: {0}")]
    Transport(String),
}

impl NotifyError {
    /// 4xx other than 429 permanently disables delivery.
    pub fn disables_delivery(&self) -> bool {
        matches!(self, Self::WebhookStatus { status } if (400..500).contains(status) && *status != 429)
    }
}

/// Result type alias for notifier operations.
pub type NotifyResult<T> = std::result::Result<T, NotifyError>;
