//! Price history and cross-market correlation.
//!
//! The tracker retains a down-sampled (1 Hz) time-indexed series of
//! mid-price and volume per market over a rolling baseline window. The
//! correlation detector fuses those series into a single
//! coordinated-movement signal per cluster.

pub mod config;
pub mod correlation;
pub mod error;
pub mod tracker;

pub use config::{CorrelationConfig, HistoryConfig};
pub use correlation::{CorrelationCandidate, CrossMarketCorrelationDetector};
pub use error::{HistoryError, HistoryResult};
pub use tracker::{HistoryPoint, PriceHistoryTracker};
