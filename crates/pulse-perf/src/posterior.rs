//! Per-signal-type posterior statistics.

use crate::record::Horizon;
use parking_lot::RwLock;
use pulse_core::SignalType;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Beta, ContinuousCDF};
use std::collections::HashMap;

/// Streaming posterior for one signal type.
///
/// All fields update incrementally, so posterior state is commutative
/// across disjoint record insertions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalTypePosterior {
    pub signal_type: SignalType,
    /// Signals tracked (outcome defined).
    pub samples: u64,
    pub wins: u64,
    pub losses: u64,

    /// Running sums of positive / negative primary pnl.
    sum_win_pnl: f64,
    sum_loss_pnl: f64,

    /// Welford moments over primary per-trade returns.
    ret_count: u64,
    ret_mean: f64,
    ret_m2: f64,

    /// Per-horizon running pnl sums and counts.
    horizon_pnl_sum: [f64; 5],
    horizon_pnl_count: [u64; 5],

    /// Kelly clamp.
    max_position_fraction: f64,
}

impl SignalTypePosterior {
    pub fn new(signal_type: SignalType, max_position_fraction: f64) -> Self {
        Self {
            signal_type,
            samples: 0,
            wins: 0,
            losses: 0,
            sum_win_pnl: 0.0,
            sum_loss_pnl: 0.0,
            ret_count: 0,
            ret_mean: 0.0,
            ret_m2: 0.0,
            horizon_pnl_sum: [0.0; 5],
            horizon_pnl_count: [0; 5],
            max_position_fraction,
        }
    }

    /// Record a resolved outcome with its primary return.
    pub fn record_outcome(&mut self, was_correct: bool, pnl: f64) {
        self.samples += 1;
        if was_correct {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        if pnl > 0.0 {
            self.sum_win_pnl += pnl;
        } else {
            self.sum_loss_pnl += pnl.abs();
        }

        self.ret_count += 1;
        let delta = pnl - self.ret_mean;
        self.ret_mean += delta / self.ret_count as f64;
        self.ret_m2 += delta * (pnl - self.ret_mean);
    }

    /// Record a horizon pnl observation.
    pub fn record_horizon_pnl(&mut self, horizon: Horizon, pnl: f64) {
        let i = horizon.index();
        self.horizon_pnl_sum[i] += pnl;
        self.horizon_pnl_count[i] += 1;
    }

    /// Fraction of outcomes that were correct.
    pub fn accuracy(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.wins as f64 / self.samples as f64
    }

    pub fn win_rate(&self) -> f64 {
        self.accuracy()
    }

    pub fn avg_win(&self) -> f64 {
        if self.wins == 0 {
            return 0.0;
        }
        self.sum_win_pnl / self.wins as f64
    }

    pub fn avg_loss(&self) -> f64 {
        if self.losses == 0 {
            return 0.0;
        }
        self.sum_loss_pnl / self.losses as f64
    }

    /// Mean pnl at a horizon.
    pub fn avg_horizon_pnl(&self, horizon: Horizon) -> Option<f64> {
        let i = horizon.index();
        if self.horizon_pnl_count[i] == 0 {
            return None;
        }
        Some(self.horizon_pnl_sum[i] / self.horizon_pnl_count[i] as f64)
    }

    /// Sharpe over per-trade returns (mean over std, unannualized).
    pub fn sharpe(&self) -> f64 {
        if self.ret_count < 2 {
            return 0.0;
        }
        let var = self.ret_m2 / (self.ret_count - 1) as f64;
        let sd = var.sqrt();
        if sd <= f64::EPSILON {
            return 0.0;
        }
        self.ret_mean / sd
    }

    /// `p * avg_win - (1 - p) * avg_loss`.
    pub fn expected_value(&self) -> f64 {
        let p = self.win_rate();
        p * self.avg_win() - (1.0 - p) * self.avg_loss()
    }

    /// Kelly fraction `max(0, (p*b - (1-p)) / b)` with `b` the
    /// win/loss ratio, clamped to the position cap.
    pub fn kelly_fraction(&self) -> f64 {
        let p = self.win_rate();
        let avg_loss = self.avg_loss();
        if avg_loss <= f64::EPSILON {
            // Without observed losses the edge is unbounded; cap it.
            return if self.wins > 0 {
                self.max_position_fraction
            } else {
                0.0
            };
        }
        let b = self.avg_win() / avg_loss;
        if b <= f64::EPSILON {
            return 0.0;
        }
        let raw = (p * b - (1.0 - p)) / b;
        raw.max(0.0).min(self.max_position_fraction)
    }

    /// Mean of the Beta(1 + wins, 1 + losses) posterior.
    pub fn bayesian_confidence(&self) -> f64 {
        let alpha = 1.0 + self.wins as f64;
        let beta = 1.0 + self.losses as f64;
        alpha / (alpha + beta)
    }

    /// Conservative confidence: the 10th percentile of the Beta
    /// posterior. Punishes small samples harder than the mean does.
    pub fn confidence_lower_bound(&self) -> f64 {
        let alpha = 1.0 + self.wins as f64;
        let beta = 1.0 + self.losses as f64;
        match Beta::new(alpha, beta) {
            Ok(dist) => dist.inverse_cdf(0.10),
            Err(_) => 0.0,
        }
    }
}

/// Posteriors for every signal type behind one lock.
pub struct PosteriorStore {
    max_position_fraction: f64,
    posteriors: RwLock<HashMap<SignalType, SignalTypePosterior>>,
}

impl PosteriorStore {
    pub fn new(max_position_fraction: f64) -> Self {
        Self {
            max_position_fraction,
            posteriors: RwLock::new(HashMap::new()),
        }
    }

    pub fn record_outcome(&self, signal_type: SignalType, was_correct: bool, pnl: f64) {
        let mut map = self.posteriors.write();
        map.entry(signal_type)
            .or_insert_with(|| SignalTypePosterior::new(signal_type, self.max_position_fraction))
            .record_outcome(was_correct, pnl);
    }

    pub fn record_horizon_pnl(&self, signal_type: SignalType, horizon: Horizon, pnl: f64) {
        let mut map = self.posteriors.write();
        map.entry(signal_type)
            .or_insert_with(|| SignalTypePosterior::new(signal_type, self.max_position_fraction))
            .record_horizon_pnl(horizon, pnl);
    }

    /// Consistent snapshot of one type's posterior.
    pub fn snapshot(&self, signal_type: SignalType) -> Option<SignalTypePosterior> {
        self.posteriors.read().get(&signal_type).cloned()
    }

    /// Snapshot of every posterior.
    pub fn all(&self) -> Vec<SignalTypePosterior> {
        self.posteriors.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posterior() -> SignalTypePosterior {
        SignalTypePosterior::new(SignalType::OrderbookImbalance, 0.25)
    }

    #[test]
    fn test_empty_posterior() {
        let p = posterior();
        assert_eq!(p.accuracy(), 0.0);
        assert_eq!(p.kelly_fraction(), 0.0);
        assert_eq!(p.sharpe(), 0.0);
        assert_eq!(p.bayesian_confidence(), 0.5);
    }

    #[test]
    fn test_win_loss_accounting() {
        let mut p = posterior();
        p.record_outcome(true, 0.10);
        p.record_outcome(true, 0.06);
        p.record_outcome(false, -0.04);

        assert_eq!(p.samples, 3);
        assert!((p.win_rate() - 2.0 / 3.0).abs() < 1e-12);
        assert!((p.avg_win() - 0.08).abs() < 1e-12);
        assert!((p.avg_loss() - 0.04).abs() < 1e-12);
        assert!(p.expected_value() > 0.0);
    }

    #[test]
    fn test_kelly_formula() {
        let mut p = posterior();
        // p = 0.6, avg_win = 0.10, avg_loss = 0.05 -> b = 2
        // f* = (0.6*2 - 0.4)/2 = 0.4, clamped to 0.25.
        for _ in 0..6 {
            p.record_outcome(true, 0.10);
        }
        for _ in 0..4 {
            p.record_outcome(false, -0.05);
        }
        assert!((p.win_rate() - 0.6).abs() < 1e-12);
        assert_eq!(p.kelly_fraction(), 0.25);

        // With a weaker edge the raw Kelly applies.
        let mut p = posterior();
        for _ in 0..5 {
            p.record_outcome(true, 0.05);
        }
        for _ in 0..5 {
            p.record_outcome(false, -0.05);
        }
        // p=0.5, b=1 -> f* = 0.
        assert_eq!(p.kelly_fraction(), 0.0);
    }

    #[test]
    fn test_bayesian_confidence() {
        let mut p = posterior();
        for _ in 0..8 {
            p.record_outcome(true, 0.05);
        }
        for _ in 0..2 {
            p.record_outcome(false, -0.05);
        }
        // Beta(9, 3) mean = 0.75.
        assert!((p.bayesian_confidence() - 0.75).abs() < 1e-12);
        // Lower bound sits below the mean.
        let lb = p.confidence_lower_bound();
        assert!(lb > 0.0 && lb < p.bayesian_confidence());
    }

    #[test]
    fn test_sharpe_sign() {
        let mut p = posterior();
        for pnl in [0.10, 0.08, 0.12, -0.02, 0.09] {
            p.record_outcome(pnl > 0.0, pnl);
        }
        assert!(p.sharpe() > 0.0);
    }

    #[test]
    fn test_horizon_pnl_averages() {
        let mut p = posterior();
        p.record_horizon_pnl(Horizon::Min30, 0.10);
        p.record_horizon_pnl(Horizon::Min30, 0.06);
        assert!((p.avg_horizon_pnl(Horizon::Min30).unwrap() - 0.08).abs() < 1e-12);
        assert!(p.avg_horizon_pnl(Horizon::Day7).is_none());
    }

    #[test]
    fn test_commutative_updates() {
        // Two disjoint insertion orders converge to the same posterior.
        let outcomes = [(true, 0.10), (false, -0.05), (true, 0.07), (true, 0.02)];
        let mut a = posterior();
        for (w, pnl) in outcomes {
            a.record_outcome(w, pnl);
        }
        let mut b = posterior();
        for (w, pnl) in outcomes.iter().rev() {
            b.record_outcome(*w, *pnl);
        }
        assert_eq!(a.samples, b.samples);
        assert!((a.win_rate() - b.win_rate()).abs() < 1e-12);
        assert!((a.avg_win() - b.avg_win()).abs() < 1e-12);
        assert!((a.expected_value() - b.expected_value()).abs() < 1e-12);
    }

    #[test]
    fn test_store_snapshot() {
        let store = PosteriorStore::new(0.25);
        store.record_outcome(SignalType::VolumeSpike, true, 0.05);
        let snap = store.snapshot(SignalType::VolumeSpike).unwrap();
        assert_eq!(snap.samples, 1);
        assert!(store.snapshot(SignalType::FrontRunning).is_none());
        assert_eq!(store.all().len(), 1);
    }
}
