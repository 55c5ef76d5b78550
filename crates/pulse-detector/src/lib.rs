//! Microstructure detectors.
//!
//! Each detector is a pure function of a per-market state snapshot and
//! the detector configuration, returning at most one typed signal. The
//! engine fans all of them out on every update; deduplication belongs
//! to the notifier, so concurrent firings are all emitted.

pub mod config;
pub mod detectors;
pub mod engine;
pub mod error;

pub use config::DetectorConfig;
pub use engine::DetectorEngine;
pub use error::{DetectorError, DetectorResult};
