//! Telemetry: logging, metrics, system alerts, health.

pub mod alerts;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;

pub use alerts::{AlertLevel, AlertRaiser, SystemAlert};
pub use error::{TelemetryError, TelemetryResult};
pub use health::{ComponentHealth, HealthMonitor, HealthStatus};
pub use logging::init_logging;
