//! WebSocket ingestion for the venue's market channel.
//!
//! Provides:
//! - Connection lifecycle as an explicit state machine with
//!   reconnection and exponential backoff
//! - Heartbeat monitoring (server pings answered, inactivity timeout)
//! - The asset-id <-> market-id subscription registry with diffing and
//!   runtime discovery of the per-socket subscription cap
//! - Frame decoding (book snapshots, level deltas, trades) with local
//!   book maintenance and REST-reseed requests on bad deltas
//! - Frame batching grouped by type

pub mod batch;
pub mod book;
pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod registry;

pub use batch::FrameBatcher;
pub use book::{BookApplyOutcome, LocalBookStore};
pub use connection::{
    reconnect_delay, ConnectionConfig, ConnectionManager, ConnectionState, EventBatch, WsCommand,
};
pub use error::{WsError, WsResult};
pub use heartbeat::HeartbeatMonitor;
pub use message::{decode_frame, LevelChange, WsEvent};
pub use registry::{SubscriptionDiff, SubscriptionRegistry, SubscriptionState};
