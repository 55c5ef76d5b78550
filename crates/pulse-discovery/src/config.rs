//! Discovery configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bounds on the refresh cadence.
pub const MIN_REFRESH_INTERVAL_MS: u64 = 5_000;
pub const MAX_REFRESH_INTERVAL_MS: u64 = 300_000;

/// Discovery and tiering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Refresh cadence; clamped to [5s, 300s].
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// Global volume floor applied before categorization.
    #[serde(default = "default_min_volume_threshold")]
    pub min_volume_threshold: f64,
    /// Cap on markets kept after tiering (by opportunity score).
    #[serde(default = "default_max_markets_to_track")]
    pub max_markets_to_track: usize,
    /// Closed markets are garbage-collected after this many hours.
    #[serde(default = "default_gc_retention_hours")]
    pub gc_retention_hours: u64,
    /// Per-category ACTIVE volume floors; others use `default_floor`.
    #[serde(default = "default_category_floors")]
    pub category_floors: HashMap<String, f64>,
    #[serde(default = "default_default_floor")]
    pub default_floor: f64,
    /// WATCHLIST volume floor as a fraction of the ACTIVE floor.
    #[serde(default = "default_watchlist_volume_fraction")]
    pub watchlist_volume_fraction: f64,
    /// WATCHLIST recent-activity gate: close date within this many days.
    #[serde(default = "default_watchlist_max_days_to_close")]
    pub watchlist_max_days_to_close: i64,
    /// WATCHLIST recent-activity gate: 24h volume above this.
    #[serde(default = "default_watchlist_min_volume_24hr")]
    pub watchlist_min_volume_24hr: f64,
}

fn default_refresh_interval_ms() -> u64 {
    30_000
}

fn default_min_volume_threshold() -> f64 {
    1_000.0
}

fn default_max_markets_to_track() -> usize {
    500
}

fn default_gc_retention_hours() -> u64 {
    24
}

fn default_category_floors() -> HashMap<String, f64> {
    HashMap::from([
        ("earnings".to_string(), 2_000.0),
        ("politics".to_string(), 8_000.0),
        ("fed".to_string(), 5_000.0),
        ("economic_data".to_string(), 4_000.0),
        ("crypto_events".to_string(), 6_000.0),
        ("court_cases".to_string(), 3_000.0),
        ("world_events".to_string(), 5_000.0),
    ])
}

fn default_default_floor() -> f64 {
    3_000.0
}

fn default_watchlist_volume_fraction() -> f64 {
    0.5
}

fn default_watchlist_max_days_to_close() -> i64 {
    14
}

fn default_watchlist_min_volume_24hr() -> f64 {
    500.0
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
            min_volume_threshold: default_min_volume_threshold(),
            max_markets_to_track: default_max_markets_to_track(),
            gc_retention_hours: default_gc_retention_hours(),
            category_floors: default_category_floors(),
            default_floor: default_default_floor(),
            watchlist_volume_fraction: default_watchlist_volume_fraction(),
            watchlist_max_days_to_close: default_watchlist_max_days_to_close(),
            watchlist_min_volume_24hr: default_watchlist_min_volume_24hr(),
        }
    }
}

impl DiscoveryConfig {
    /// Refresh interval clamped to the allowed range.
    pub fn clamped_refresh_interval_ms(&self) -> u64 {
        self.refresh_interval_ms
            .clamp(MIN_REFRESH_INTERVAL_MS, MAX_REFRESH_INTERVAL_MS)
    }

    /// ACTIVE floor for a category.
    pub fn floor_for(&self, category: pulse_core::Category) -> f64 {
        self.category_floors
            .get(category.as_str())
            .copied()
            .unwrap_or(self.default_floor)
    }
}
