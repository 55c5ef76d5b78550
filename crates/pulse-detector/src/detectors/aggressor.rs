//! Aggressive buyer / seller detector.
//!
//! Reads the signed trade-flow window; a z-score breach in either
//! direction produces the corresponding one-sided signal.

use crate::config::DetectorConfig;
use pulse_core::{Direction, EarlySignal, SignalMetadata, SignalType};
use pulse_state::StateSnapshot;

pub fn check(snap: &StateSnapshot, cfg: &DetectorConfig) -> Option<EarlySignal> {
    if snap.window_trades < cfg.min_flow_trades {
        return None;
    }
    if snap.z_flow.abs() < cfg.flow_z_threshold {
        return None;
    }

    let (signal_type, direction) = if snap.z_flow > 0.0 {
        (SignalType::AggressiveBuyer, Direction::Bullish)
    } else {
        (SignalType::AggressiveSeller, Direction::Bearish)
    };

    let confidence = (snap.z_flow.abs() / (2.0 * cfg.flow_z_threshold)).clamp(0.0, 1.0);

    Some(EarlySignal::new(
        snap.market_id.clone(),
        signal_type,
        confidence,
        direction,
        SignalMetadata::AggressiveFlow {
            net_flow: snap.net_flow,
            flow_z_score: snap.z_flow,
            trade_count: snap.window_trades,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::testutil::quiet_snapshot;

    #[test]
    fn test_balanced_flow_quiet() {
        assert!(check(&quiet_snapshot("m1"), &DetectorConfig::default()).is_none());
    }

    #[test]
    fn test_buy_pressure_fires_buyer() {
        let mut snap = quiet_snapshot("m1");
        snap.z_flow = 3.4;
        snap.net_flow = 800.0;
        let sig = check(&snap, &DetectorConfig::default()).expect("signal");
        assert_eq!(sig.signal_type, SignalType::AggressiveBuyer);
        assert_eq!(sig.direction, Direction::Bullish);
    }

    #[test]
    fn test_sell_pressure_fires_seller() {
        let mut snap = quiet_snapshot("m1");
        snap.z_flow = -3.0;
        snap.net_flow = -650.0;
        let sig = check(&snap, &DetectorConfig::default()).expect("signal");
        assert_eq!(sig.signal_type, SignalType::AggressiveSeller);
        assert_eq!(sig.direction, Direction::Bearish);
    }

    #[test]
    fn test_thin_window_suppressed() {
        let mut snap = quiet_snapshot("m1");
        snap.z_flow = 5.0;
        snap.window_trades = 3;
        assert!(check(&snap, &DetectorConfig::default()).is_none());
    }
}
