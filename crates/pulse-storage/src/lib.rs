//! SQLite persistence.
//!
//! A thin relational surface kept off the hot path: the pipeline
//! enqueues writes on a channel drained by a dedicated blocking task,
//! and stays correct if storage is briefly unavailable. Alerts are
//! written at-most-once, performance updates at-least-once.

pub mod error;
pub mod schema;
pub mod store;
pub mod writer;

pub use error::{StorageError, StorageResult};
pub use store::{Storage, SystemAlertRow};
pub use writer::{spawn_writer, StorageOp, WriterHandle};
