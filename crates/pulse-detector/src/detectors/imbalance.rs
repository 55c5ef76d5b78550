//! Orderbook imbalance detector.
//!
//! Fires when the top-N volume imbalance is large in absolute terms
//! and statistically unusual for this market.

use crate::config::DetectorConfig;
use pulse_core::{Direction, EarlySignal, SignalMetadata, SignalType};
use pulse_state::StateSnapshot;

pub fn check(snap: &StateSnapshot, cfg: &DetectorConfig) -> Option<EarlySignal> {
    let imbalance = snap.imbalance;
    if imbalance.abs() < cfg.imbalance_threshold {
        return None;
    }
    if snap.z_imbalance.abs() < cfg.imbalance_z_threshold {
        return None;
    }

    let direction = if imbalance > 0.0 {
        Direction::Bullish
    } else {
        Direction::Bearish
    };

    // Magnitude component from the threshold excess, blended with how
    // unusual the reading is for this market.
    let magnitude =
        ((imbalance.abs() - cfg.imbalance_threshold) / cfg.imbalance_threshold).clamp(0.0, 1.0);
    let z_component =
        (snap.z_imbalance.abs() / (2.0 * cfg.imbalance_z_threshold)).clamp(0.0, 1.0);
    let confidence = 0.6 * magnitude + 0.4 * z_component;

    Some(EarlySignal::new(
        snap.market_id.clone(),
        SignalType::OrderbookImbalance,
        confidence,
        direction,
        SignalMetadata::OrderbookImbalance {
            imbalance,
            z_score: snap.z_imbalance,
            bid_volume: snap.bid_depth,
            ask_volume: snap.ask_depth,
        },
    ))
}
