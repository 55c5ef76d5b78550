//! Error types for pulse-ws.

use thiserror::Error;

/// WebSocket errors.
#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Handshake timed out after {0}ms")]
    HandshakeTimeout(u64),

    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    #[error("Max reconnect attempts ({0}) exhausted")]
    ReconnectExhausted(u32),

    #[error("Subscription rejected: {0}")]
    SubscriptionRejected(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("WebSocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type alias for WebSocket operations.
pub type WsResult<T> = std::result::Result<T, WsError>;
