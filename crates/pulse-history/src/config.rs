//! History and correlation configuration.

use pulse_core::Category;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Price-history retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Retention window for per-market series.
    #[serde(default = "default_baseline_window_secs")]
    pub baseline_window_secs: u64,
    /// Minimum spacing between retained samples per market.
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,
}

fn default_baseline_window_secs() -> u64 {
    86_400
}

fn default_sample_interval_secs() -> u64 {
    1
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            baseline_window_secs: default_baseline_window_secs(),
            sample_interval_secs: default_sample_interval_secs(),
        }
    }
}

/// Cross-market correlation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Average pairwise correlation required to fire.
    #[serde(default = "default_min_correlation")]
    pub min_correlation: f64,
    /// Correlation windows, seconds (1h, 4h, 8h).
    #[serde(default = "default_windows_secs")]
    pub windows_secs: Vec<u64>,
    /// Minimum cluster size.
    #[serde(default = "default_min_markets")]
    pub min_markets: usize,
    /// Volume multiple vs the 24h baseline counted as confirmation.
    #[serde(default = "default_volume_confirmation")]
    pub volume_confirmation_threshold: f64,
    /// Average absolute price change (percent) required to fire.
    #[serde(default = "default_min_price_change_pct")]
    pub min_price_change_pct: f64,
    /// Pre-filter: |1h change| must exceed this (percent).
    #[serde(default = "default_prefilter_change_pct")]
    pub prefilter_change_pct: f64,
    /// Pre-filter cap on candidates (bounds the O(N^2) pair count).
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    /// Minimum aligned samples for a pairwise correlation.
    #[serde(default = "default_min_aligned_samples")]
    pub min_aligned_samples: usize,
    /// Per-category baseline correlation; categories not listed use
    /// `default_baseline`.
    #[serde(default = "default_category_baselines")]
    pub category_baselines: HashMap<String, f64>,
    #[serde(default = "default_default_baseline")]
    pub default_baseline: f64,
}

fn default_min_correlation() -> f64 {
    0.6
}

fn default_windows_secs() -> Vec<u64> {
    vec![3_600, 14_400, 28_800]
}

fn default_min_markets() -> usize {
    3
}

fn default_volume_confirmation() -> f64 {
    1.5
}

fn default_min_price_change_pct() -> f64 {
    2.0
}

fn default_prefilter_change_pct() -> f64 {
    1.0
}

fn default_max_candidates() -> usize {
    50
}

fn default_min_aligned_samples() -> usize {
    10
}

fn default_category_baselines() -> HashMap<String, f64> {
    HashMap::from([
        ("politics".to_string(), 0.3),
        ("fed".to_string(), 0.4),
        ("crypto_events".to_string(), 0.5),
        ("economic_data".to_string(), 0.4),
        ("macro".to_string(), 0.4),
    ])
}

fn default_default_baseline() -> f64 {
    0.35
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            min_correlation: default_min_correlation(),
            windows_secs: default_windows_secs(),
            min_markets: default_min_markets(),
            volume_confirmation_threshold: default_volume_confirmation(),
            min_price_change_pct: default_min_price_change_pct(),
            prefilter_change_pct: default_prefilter_change_pct(),
            max_candidates: default_max_candidates(),
            min_aligned_samples: default_min_aligned_samples(),
            category_baselines: default_category_baselines(),
            default_baseline: default_default_baseline(),
        }
    }
}

impl CorrelationConfig {
    /// Baseline correlation for a category.
    pub fn baseline_for(&self, category: Option<Category>) -> f64 {
        category
            .and_then(|c| self.category_baselines.get(c.as_str()).copied())
            .unwrap_or(self.default_baseline)
    }
}
