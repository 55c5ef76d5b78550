//! Signal performance tracking.
//!
//! Every emitted signal is forward-sampled at fixed horizons (30m, 1h,
//! 4h, 24h, 7d) and on market resolution. Each sample updates the
//! per-signal-type posterior (accuracy, win rate, Sharpe, expected
//! value, Kelly fraction, Beta confidence) that the notifier uses to
//! weight alerts.

pub mod error;
pub mod posterior;
pub mod record;
pub mod tracker;

pub use error::{PerfError, PerfResult};
pub use posterior::{PosteriorStore, SignalTypePosterior};
pub use record::{Horizon, SignalPerformanceRecord};
pub use tracker::{PerfConfig, SignalPerformanceTracker};
