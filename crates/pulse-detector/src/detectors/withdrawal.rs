//! Market-maker withdrawal detector.
//!
//! Flags a top-of-book depth collapse against the EWMA baseline,
//! typically a maker pulling quotes ahead of news.

use crate::config::DetectorConfig;
use pulse_core::{Direction, EarlySignal, SignalMetadata, SignalType};
use pulse_state::StateSnapshot;

pub fn check(snap: &StateSnapshot, cfg: &DetectorConfig) -> Option<EarlySignal> {
    if !snap.warmed_up {
        return None;
    }
    let baseline = snap.depth_baseline?;
    if baseline <= 0.0 {
        return None;
    }
    let drop_pct = (1.0 - snap.depth_top / baseline) * 100.0;
    if drop_pct < cfg.depth_drop_pct {
        return None;
    }

    // 20% drop -> 0.5, total withdrawal -> 1.0.
    let confidence = (0.5 + 0.5 * (drop_pct - cfg.depth_drop_pct) / (100.0 - cfg.depth_drop_pct))
        .clamp(0.0, 1.0);

    Some(EarlySignal::new(
        snap.market_id.clone(),
        SignalType::MarketMakerWithdrawal,
        confidence,
        Direction::Neutral,
        SignalMetadata::MarketMakerWithdrawal {
            baseline_depth: baseline,
            current_depth: snap.depth_top,
            drop_pct,
        },
    ))
}
