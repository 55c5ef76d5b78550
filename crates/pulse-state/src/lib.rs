//! Per-market rolling statistical state.
//!
//! Maintains fixed-capacity rolling series (mid-price, spread, depth,
//! imbalance, trade flow) with EWMA baselines and Welford running
//! variance per market. Mutation follows the single-writer rule: the
//! ingestion dispatcher owns writes for a market, detectors read
//! consistent snapshots.

pub mod error;
pub mod market_state;
pub mod ring;
pub mod series;
pub mod stats;

pub use error::{StateError, StateResult};
pub use market_state::{MarketStateStore, PerMarketState, StateConfig, StateSnapshot};
pub use ring::RingBuffer;
pub use series::RollingSeries;
pub use stats::{least_squares_slope, pearson, Ewma, Welford};
