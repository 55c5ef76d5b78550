//! Spread anomaly detector.

use crate::config::DetectorConfig;
use pulse_core::{Direction, EarlySignal, SignalMetadata, SignalType};
use pulse_state::StateSnapshot;

pub fn check(snap: &StateSnapshot, cfg: &DetectorConfig) -> Option<EarlySignal> {
    if !snap.warmed_up {
        return None;
    }
    let spread = snap.spread?;
    let baseline = snap.spread_baseline?;
    if baseline <= 0.0 {
        return None;
    }
    let multiple = spread / baseline;
    if multiple < cfg.spread_multiplier {
        return None;
    }

    // Saturates at twice the trigger multiple.
    let confidence = ((multiple - cfg.spread_multiplier) / cfg.spread_multiplier).clamp(0.0, 1.0);
    let confidence = 0.5 + 0.5 * confidence;

    Some(EarlySignal::new(
        snap.market_id.clone(),
        SignalType::SpreadAnomaly,
        confidence,
        Direction::Neutral,
        SignalMetadata::SpreadAnomaly {
            spread,
            baseline_spread: baseline,
            multiple,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::testutil::quiet_snapshot;

    #[test]
    fn test_normal_spread_quiet() {
        let snap = quiet_snapshot("m1");
        assert!(check(&snap, &DetectorConfig::default()).is_none());
    }

    #[test]
    fn test_widened_spread_fires_neutral() {
        let mut snap = quiet_snapshot("m1");
        snap.spread = Some(0.06); // 3x the 0.02 baseline
        let sig = check(&snap, &DetectorConfig::default()).expect("signal");
        assert_eq!(sig.direction, Direction::Neutral);
        match sig.metadata {
            SignalMetadata::SpreadAnomaly { multiple, .. } => {
                assert!((multiple - 3.0).abs() < 1e-9)
            }
            _ => panic!("wrong metadata"),
        }
    }

    #[test]
    fn test_warm_up_required() {
        let mut snap = quiet_snapshot("m1");
        snap.warmed_up = false;
        snap.spread = Some(0.10);
        assert!(check(&snap, &DetectorConfig::default()).is_none());
    }
}
