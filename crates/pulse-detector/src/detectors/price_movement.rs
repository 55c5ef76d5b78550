//! Price movement detector.
//!
//! Compares the current mid against the oldest sample inside the
//! lookback window.

use crate::config::DetectorConfig;
use chrono::{Duration, Utc};
use pulse_core::{Direction, EarlySignal, SignalMetadata, SignalType};
use pulse_state::StateSnapshot;

pub fn check(snap: &StateSnapshot, cfg: &DetectorConfig) -> Option<EarlySignal> {
    let window = Duration::seconds(cfg.price_move_window_secs as i64);
    let cutoff = Utc::now() - window;

    let (_, latest) = *snap.recent_mids.last()?;
    let (_, earliest) = *snap
        .recent_mids
        .iter()
        .find(|(ts, _)| *ts >= cutoff)?;
    if earliest <= 0.0 {
        return None;
    }

    let change_pct = (latest - earliest) / earliest * 100.0;
    if change_pct.abs() < cfg.price_move_pct {
        return None;
    }

    let direction = if change_pct > 0.0 {
        Direction::Bullish
    } else {
        Direction::Bearish
    };
    let confidence =
        (0.5 + 0.5 * (change_pct.abs() - cfg.price_move_pct) / (3.0 * cfg.price_move_pct))
            .clamp(0.0, 1.0);

    Some(EarlySignal::new(
        snap.market_id.clone(),
        SignalType::PriceMovement,
        confidence,
        direction,
        SignalMetadata::PriceMovement {
            outcome_index: 0,
            change_pct,
            window_secs: cfg.price_move_window_secs,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::testutil::quiet_snapshot;

    #[test]
    fn test_flat_series_quiet() {
        assert!(check(&quiet_snapshot("m1"), &DetectorConfig::default()).is_none());
    }

    #[test]
    fn test_up_move_fires_bullish() {
        let mut snap = quiet_snapshot("m1");
        let now = Utc::now();
        snap.recent_mids = vec![
            (now - Duration::seconds(120), 0.50),
            (now - Duration::seconds(60), 0.505),
            (now, 0.52),
        ];
        let sig = check(&snap, &DetectorConfig::default()).expect("signal");
        assert_eq!(sig.direction, Direction::Bullish);
        match sig.metadata {
            SignalMetadata::PriceMovement { change_pct, .. } => {
                assert!((change_pct - 4.0).abs() < 1e-9)
            }
            _ => panic!("wrong metadata"),
        }
    }

    #[test]
    fn test_old_samples_outside_window_ignored() {
        let mut snap = quiet_snapshot("m1");
        let now = Utc::now();
        // The big move happened an hour ago; inside the window it's flat.
        snap.recent_mids = vec![
            (now - Duration::seconds(3600), 0.40),
            (now - Duration::seconds(60), 0.52),
            (now, 0.52),
        ];
        assert!(check(&snap, &DetectorConfig::default()).is_none());
    }

    #[test]
    fn test_down_move_fires_bearish() {
        let mut snap = quiet_snapshot("m1");
        let now = Utc::now();
        snap.recent_mids = vec![(now - Duration::seconds(60), 0.52), (now, 0.50)];
        let sig = check(&snap, &DetectorConfig::default()).expect("signal");
        assert_eq!(sig.direction, Direction::Bearish);
    }
}
