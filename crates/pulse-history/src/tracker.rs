//! Down-sampled per-market price history.

use crate::config::HistoryConfig;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use pulse_core::MarketId;
use pulse_state::stats::pearson;
use std::collections::VecDeque;
use std::sync::Arc;

/// One retained history sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub mid_price: f64,
    pub volume: f64,
}

#[derive(Debug, Default)]
struct MarketHistory {
    points: VecDeque<HistoryPoint>,
}

impl MarketHistory {
    /// Points within the window ending now, oldest first.
    fn window(&self, window: Duration, now: DateTime<Utc>) -> impl Iterator<Item = &HistoryPoint> {
        let cutoff = now - window;
        self.points.iter().filter(move |p| p.timestamp >= cutoff)
    }
}

/// Time-indexed mid-price/volume series per market.
///
/// Samples arrive on every orderbook update but are down-sampled to at
/// most one per `sample_interval_secs` per market, and trimmed to the
/// baseline window, to bound memory.
pub struct PriceHistoryTracker {
    config: HistoryConfig,
    series: DashMap<MarketId, Arc<RwLock<MarketHistory>>>,
}

impl PriceHistoryTracker {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            series: DashMap::new(),
        }
    }

    /// Append a sample; returns false when down-sampling discarded it.
    pub fn append(
        &self,
        market_id: &str,
        timestamp: DateTime<Utc>,
        mid_price: f64,
        volume: f64,
    ) -> bool {
        let entry = self
            .series
            .entry(market_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(MarketHistory::default())))
            .clone();
        let mut history = entry.write();

        if let Some(last) = history.points.back() {
            let min_gap = Duration::seconds(self.config.sample_interval_secs as i64);
            if timestamp - last.timestamp < min_gap {
                return false;
            }
        }

        history.points.push_back(HistoryPoint {
            timestamp,
            mid_price,
            volume,
        });

        // Trim to the baseline window.
        let cutoff = timestamp - Duration::seconds(self.config.baseline_window_secs as i64);
        while history
            .points
            .front()
            .is_some_and(|p| p.timestamp < cutoff)
        {
            history.points.pop_front();
        }
        true
    }

    /// Number of retained points for a market.
    pub fn len(&self, market_id: &str) -> usize {
        self.series
            .get(market_id)
            .map(|e| e.read().points.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Whether the market has at least `min_points` retained samples.
    pub fn has_sufficient_history(&self, market_id: &str, min_points: usize) -> bool {
        self.len(market_id) >= min_points
    }

    /// Percent price change over the trailing window.
    ///
    /// None when the market has fewer than two samples in the window or
    /// the earliest price is zero.
    pub fn price_change_pct(&self, market_id: &str, window: Duration) -> Option<f64> {
        let entry = self.series.get(market_id)?;
        let history = entry.read();
        let now = Utc::now();
        let mut iter = history.window(window, now);
        let first = iter.next()?;
        let last = history.points.back()?;
        if last.timestamp <= first.timestamp || first.mid_price <= 0.0 {
            return None;
        }
        Some((last.mid_price - first.mid_price) / first.mid_price * 100.0)
    }

    /// Current volume rate vs the baseline-window average rate.
    ///
    /// Compares the mean volume over the trailing window against the
    /// mean over the whole retained series.
    pub fn volume_multiple(&self, market_id: &str, window: Duration) -> Option<f64> {
        let entry = self.series.get(market_id)?;
        let history = entry.read();
        let now = Utc::now();

        let recent: Vec<f64> = history.window(window, now).map(|p| p.volume).collect();
        if recent.is_empty() || history.points.is_empty() {
            return None;
        }
        let recent_avg = recent.iter().sum::<f64>() / recent.len() as f64;
        let base_avg =
            history.points.iter().map(|p| p.volume).sum::<f64>() / history.points.len() as f64;
        if base_avg <= 0.0 {
            return None;
        }
        Some(recent_avg / base_avg)
    }

    /// Pearson correlation of two markets' mid-prices over a window.
    ///
    /// Samples are aligned on epoch-second buckets; None when the
    /// aligned overlap is shorter than `min_aligned` points.
    pub fn correlation(
        &self,
        market_a: &str,
        market_b: &str,
        window: Duration,
        min_aligned: usize,
    ) -> Option<f64> {
        let (xs, ys) = self.aligned_series(market_a, market_b, window, Utc::now())?;
        if xs.len() < min_aligned {
            return None;
        }
        pearson(&xs, &ys)
    }

    fn aligned_series(
        &self,
        market_a: &str,
        market_b: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Option<(Vec<f64>, Vec<f64>)> {
        let entry_a = self.series.get(market_a)?;
        let entry_b = self.series.get(market_b)?;
        let history_a = entry_a.read();
        let history_b = entry_b.read();

        let bucket = self.config.sample_interval_secs.max(1) as i64;
        let index_b: std::collections::HashMap<i64, f64> = history_b
            .window(window, now)
            .map(|p| (p.timestamp.timestamp() / bucket, p.mid_price))
            .collect();

        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for p in history_a.window(window, now) {
            if let Some(&y) = index_b.get(&(p.timestamp.timestamp() / bucket)) {
                xs.push(p.mid_price);
                ys.push(y);
            }
        }
        Some((xs, ys))
    }

    /// Drop series for markets no longer tracked.
    pub fn retain(&self, keep: impl Fn(&str) -> bool) {
        self.series.retain(|id, _| keep(id));
    }
}
