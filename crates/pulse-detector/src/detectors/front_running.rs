//! Front-running detector.
//!
//! Persistent one-sided imbalance, a moving micro-price, and an
//! abnormal spread arriving together inside a short window suggest
//! somebody is working an order ahead of news.

use crate::config::DetectorConfig;
use chrono::Utc;
use pulse_core::{ConfidenceTier, Direction, EarlySignal, SignalMetadata, SignalType};
use pulse_state::StateSnapshot;

pub fn check(snap: &StateSnapshot, cfg: &DetectorConfig) -> Option<EarlySignal> {
    if !snap.warmed_up {
        return None;
    }
    // All three effects must be current.
    let age = (Utc::now() - snap.updated_at).num_seconds();
    if age > cfg.front_running_window_secs as i64 {
        return None;
    }

    let imb = snap.imbalance_window_mean;
    let slope = snap.micro_price_slope;
    let spread = snap.spread?;
    let spread_base = snap.spread_baseline?;
    if spread_base <= 0.0 {
        return None;
    }
    let spread_multiple = spread / spread_base;

    let imbalance_ok = imb.abs() >= cfg.imbalance_threshold;
    let slope_ok =
        slope.abs() >= cfg.front_running_slope_threshold && slope.signum() == imb.signum();
    let spread_ok = spread_multiple >= cfg.vacuum_spread_multiplier;
    if !(imbalance_ok && slope_ok && spread_ok) {
        return None;
    }

    let imb_score = (imb.abs() / (2.0 * cfg.imbalance_threshold)).clamp(0.0, 1.0);
    let slope_score =
        (slope.abs() / (4.0 * cfg.front_running_slope_threshold)).clamp(0.0, 1.0);
    let spread_score = ((spread_multiple - 1.0) / 2.0).clamp(0.0, 1.0);
    let composite = 0.45 * imb_score + 0.35 * slope_score + 0.20 * spread_score;

    let tier = if composite >= 0.75 {
        ConfidenceTier::High
    } else if composite >= 0.5 {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    };

    let direction = if imb > 0.0 {
        Direction::Bullish
    } else {
        Direction::Bearish
    };

    Some(EarlySignal::new(
        snap.market_id.clone(),
        SignalType::FrontRunning,
        composite,
        direction,
        SignalMetadata::FrontRunning {
            imbalance: imb,
            micro_price_slope: slope,
            spread_multiple,
            composite_score: composite,
            tier,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::testutil::quiet_snapshot;

    fn active_snapshot() -> StateSnapshot {
        let mut snap = quiet_snapshot("m1");
        snap.imbalance_window_mean = 0.35;
        snap.micro_price_slope = 5e-4;
        snap.spread = Some(0.04); // 2x baseline
        snap
    }

    #[test]
    fn test_quiet_market_no_front_running() {
        assert!(check(&quiet_snapshot("m1"), &DetectorConfig::default()).is_none());
    }

    #[test]
    fn test_all_three_effects_fire() {
        let sig = check(&active_snapshot(), &DetectorConfig::default()).expect("signal");
        assert_eq!(sig.signal_type, SignalType::FrontRunning);
        assert_eq!(sig.direction, Direction::Bullish);
        match sig.metadata {
            SignalMetadata::FrontRunning { tier, .. } => {
                assert!(matches!(tier, ConfidenceTier::Medium | ConfidenceTier::High))
            }
            _ => panic!("wrong metadata"),
        }
    }

    #[test]
    fn test_slope_against_imbalance_suppressed() {
        let mut snap = active_snapshot();
        snap.micro_price_slope = -5e-4; // drifting away from the bid side
        assert!(check(&snap, &DetectorConfig::default()).is_none());
    }

    #[test]
    fn test_missing_spread_effect_suppressed() {
        let mut snap = active_snapshot();
        snap.spread = Some(0.02); // baseline
        assert!(check(&snap, &DetectorConfig::default()).is_none());
    }

    #[test]
    fn test_stale_snapshot_suppressed() {
        let mut snap = active_snapshot();
        snap.updated_at = Utc::now() - chrono::Duration::seconds(120);
        assert!(check(&snap, &DetectorConfig::default()).is_none());
    }
}
