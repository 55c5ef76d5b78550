//! Error types for pulse-engine.

use thiserror::Error;

/// Application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] pulse_storage::StorageError),

    #[error("Detector error: {0}")]
    Detector(#[from] pulse_detector::DetectorError),

    #[error("Notifier error: {0}")]
    Notifier(#[from] pulse_notifier::NotifyError),

    #[error("REST error: {0}")]
    Rest(#[from] pulse_rest::RestError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] pulse_telemetry::TelemetryError),
}

/// Result type alias for application operations.
pub type AppResult<T> = std::result::Result<T, AppError>;
