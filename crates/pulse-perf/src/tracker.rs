//! The forward-sampling tracker.
//!
//! Tracks open performance records, reports which horizons are due,
//! applies samples, and streams every defined outcome into the
//! posterior store. The driving clock lives in the engine; this type
//! is synchronous and fully testable with injected times.

use crate::error::{PerfError, PerfResult};
use crate::posterior::PosteriorStore;
use crate::record::{Horizon, SignalPerformanceRecord};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pulse_core::EarlySignal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerfConfig {
    /// Kelly clamp for posterior sizing.
    #[serde(default = "default_max_position_fraction")]
    pub max_position_fraction: f64,
    /// Sampling sweep cadence used by the engine scheduler.
    #[serde(default = "default_sample_sweep_secs")]
    pub sample_sweep_secs: u64,
}

fn default_max_position_fraction() -> f64 {
    0.25
}

fn default_sample_sweep_secs() -> u64 {
    30
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            max_position_fraction: default_max_position_fraction(),
            sample_sweep_secs: default_sample_sweep_secs(),
        }
    }
}

/// Tracks forward samples for every emitted signal.
pub struct SignalPerformanceTracker {
    records: DashMap<String, SignalPerformanceRecord>,
    posteriors: Arc<PosteriorStore>,
}

impl SignalPerformanceTracker {
    pub fn new(config: &PerfConfig) -> Self {
        Self {
            records: DashMap::new(),
            posteriors: Arc::new(PosteriorStore::new(config.max_position_fraction)),
        }
    }

    pub fn posteriors(&self) -> Arc<PosteriorStore> {
        self.posteriors.clone()
    }

    /// Start tracking a signal at its entry price.
    pub fn track(&self, signal: &EarlySignal, entry_price: f64, market_volume: f64) {
        let record = SignalPerformanceRecord::new(
            signal.id.clone(),
            signal.market_id.clone(),
            signal.signal_type,
            signal.confidence,
            signal.timestamp,
            entry_price,
            signal.direction,
            market_volume,
        );
        debug!(
            signal_id = %signal.id,
            signal_type = %signal.signal_type,
            entry_price,
            "Tracking signal performance"
        );
        self.records.insert(signal.id.clone(), record);
    }

    /// All (signal, market, horizon) samples due at `now`.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<(String, String, Horizon)> {
        self.records
            .iter()
            .flat_map(|entry| {
                let record = entry.value();
                record
                    .due_horizons(now)
                    .into_iter()
                    .map(|h| (record.signal_id.clone(), record.market_id.clone(), h))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Apply one horizon sample. The updated record is returned for
    /// persistence; completed records are dropped from the open set.
    pub fn sample_horizon(
        &self,
        signal_id: &str,
        horizon: Horizon,
        price: Option<f64>,
    ) -> PerfResult<SignalPerformanceRecord> {
        let mut entry = self
            .records
            .get_mut(signal_id)
            .ok_or_else(|| PerfError::UnknownSignal(signal_id.to_string()))?;
        let record = entry.value_mut();

        let outcome_before = record.was_correct;
        record.fill_horizon(horizon, price);

        if let Some(pnl) = record.horizon_pnls[horizon.index()] {
            self.posteriors
                .record_horizon_pnl(record.signal_type, horizon, pnl);
        }
        // Outcome becomes defined at the first priced horizon.
        if outcome_before.is_none() {
            if let (Some(correct), Some(pnl)) = (record.was_correct, record.primary_pnl()) {
                self.posteriors
                    .record_outcome(record.signal_type, correct, pnl);
            }
        }

        let snapshot = record.clone();
        drop(entry);

        if snapshot.is_complete() {
            self.records.remove(signal_id);
            info!(signal_id, "Performance record complete");
        }
        Ok(snapshot)
    }

    /// Apply a market resolution to every open record on that market.
    pub fn record_resolution(
        &self,
        market_id: &str,
        winning_outcome_index: usize,
        at: DateTime<Utc>,
    ) -> Vec<SignalPerformanceRecord> {
        let ids: Vec<String> = self
            .records
            .iter()
            .filter(|e| e.value().market_id == market_id)
            .map(|e| e.key().clone())
            .collect();

        let mut resolved = Vec::new();
        for id in ids {
            if let Some(mut entry) = self.records.get_mut(&id) {
                let record = entry.value_mut();
                let outcome_before = record.was_correct;
                record.resolve(winning_outcome_index, at);
                // Resolution defines (or overrides) the outcome; only
                // count it once per record.
                if outcome_before.is_none() {
                    if let (Some(correct), Some(pnl)) = (record.was_correct, record.final_pnl) {
                        self.posteriors.record_outcome(record.signal_type, correct, pnl);
                    }
                }
                resolved.push(record.clone());
            }
            self.records.remove(&id);
        }
        resolved
    }

    /// Open (incomplete) record count.
    pub fn open_records(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pulse_core::{Direction, SignalMetadata, SignalType};

    fn signal() -> EarlySignal {
        EarlySignal::new(
            "m1",
            SignalType::OrderbookImbalance,
            0.8,
            Direction::Bullish,
            SignalMetadata::OrderbookImbalance {
                imbalance: 0.4,
                z_score: 3.0,
                bid_volume: 100.0,
                ask_volume: 20.0,
            },
        )
    }

    #[test]
    fn test_horizon_fill_scenario() {
        // Entry 0.50 bullish; 30m at 0.55, 1h at 0.54.
        let tracker = SignalPerformanceTracker::new(&PerfConfig::default());
        let sig = signal();
        tracker.track(&sig, 0.50, 10_000.0);

        let r = tracker
            .sample_horizon(&sig.id, Horizon::Min30, Some(0.55))
            .unwrap();
        assert!((r.horizon_pnls[0].unwrap() - 0.10).abs() < 1e-9);

        let r = tracker
            .sample_horizon(&sig.id, Horizon::Hour1, Some(0.54))
            .unwrap();
        assert!((r.horizon_pnls[1].unwrap() - 0.08).abs() < 1e-9);
        assert_eq!(r.was_correct, Some(true));

        // Posterior learned exactly one outcome.
        let p = tracker
            .posteriors()
            .snapshot(SignalType::OrderbookImbalance)
            .unwrap();
        assert_eq!(p.samples, 1);
        assert_eq!(p.wins, 1);
    }

    #[test]
    fn test_due_tracking_matches_elapsed() {
        let tracker = SignalPerformanceTracker::new(&PerfConfig::default());
        let sig = signal();
        tracker.track(&sig, 0.50, 0.0);

        assert!(tracker.due(sig.timestamp).is_empty());
        let due = tracker.due(sig.timestamp + Duration::minutes(31));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].2, Horizon::Min30);

        tracker
            .sample_horizon(&sig.id, Horizon::Min30, Some(0.51))
            .unwrap();
        // Already sampled horizons leave the due set.
        assert!(tracker.due(sig.timestamp + Duration::minutes(31)).is_empty());
    }

    #[test]
    fn test_completion_after_all_horizons() {
        let tracker = SignalPerformanceTracker::new(&PerfConfig::default());
        let sig = signal();
        tracker.track(&sig, 0.50, 0.0);
        for h in Horizon::ALL {
            tracker.sample_horizon(&sig.id, h, Some(0.52)).unwrap();
        }
        assert_eq!(tracker.open_records(), 0);
        assert!(tracker
            .sample_horizon(&sig.id, Horizon::Min30, Some(0.5))
            .is_err());
    }

    #[test]
    fn test_resolution_closes_records() {
        let tracker = SignalPerformanceTracker::new(&PerfConfig::default());
        let sig = signal();
        tracker.track(&sig, 0.50, 0.0);
        let resolved = tracker.record_resolution("m1", 0, Utc::now());
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].was_correct, Some(true));
        assert_eq!(tracker.open_records(), 0);

        let p = tracker
            .posteriors()
            .snapshot(SignalType::OrderbookImbalance)
            .unwrap();
        assert_eq!(p.samples, 1);
    }

    #[test]
    fn test_unavailable_price_fills_without_outcome() {
        let tracker = SignalPerformanceTracker::new(&PerfConfig::default());
        let sig = signal();
        tracker.track(&sig, 0.50, 0.0);
        let r = tracker.sample_horizon(&sig.id, Horizon::Min30, None).unwrap();
        assert_eq!(r.was_correct, None);
        assert!(tracker
            .posteriors()
            .snapshot(SignalType::OrderbookImbalance)
            .is_none());
    }
}
