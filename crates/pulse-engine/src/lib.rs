//! Engine wiring: configuration, the signal bus, the ingestion
//! dispatcher, the priority worker pool, and the application runtime.

pub mod app;
pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod workers;

pub use app::Application;
pub use bus::SignalBus;
pub use config::AppConfig;
pub use dispatcher::{Dispatcher, SignalSink};
pub use error::{AppError, AppResult};
pub use workers::{JobPriority, PriorityWorkerPool, WorkerHandle};
