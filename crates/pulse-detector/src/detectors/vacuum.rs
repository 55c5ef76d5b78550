//! Liquidity vacuum detector.
//!
//! Both sides of the book thin out at once while the spread widens:
//! nobody wants to quote.

use crate::config::DetectorConfig;
use pulse_core::{Direction, EarlySignal, SignalMetadata, SignalType};
use pulse_state::StateSnapshot;

pub fn check(snap: &StateSnapshot, cfg: &DetectorConfig) -> Option<EarlySignal> {
    if !snap.warmed_up {
        return None;
    }
    let bid_base = snap.bid_depth_baseline?;
    let ask_base = snap.ask_depth_baseline?;
    let spread_base = snap.spread_baseline?;
    let spread = snap.spread?;
    if bid_base <= 0.0 || ask_base <= 0.0 || spread_base <= 0.0 {
        return None;
    }

    let bid_drop_pct = (1.0 - snap.bid_depth / bid_base) * 100.0;
    let ask_drop_pct = (1.0 - snap.ask_depth / ask_base) * 100.0;
    let spread_multiple = spread / spread_base;

    if bid_drop_pct < cfg.vacuum_depth_drop_pct || ask_drop_pct < cfg.vacuum_depth_drop_pct {
        return None;
    }
    if spread_multiple < cfg.vacuum_spread_multiplier {
        return None;
    }

    // Confidence scales with the product of the two effects.
    let depth_effect =
        ((bid_drop_pct.min(ask_drop_pct)) / 100.0).clamp(0.0, 1.0);
    let spread_effect =
        ((spread_multiple - 1.0) / (2.0 * cfg.vacuum_spread_multiplier)).clamp(0.0, 1.0);
    let confidence = (depth_effect * spread_effect).sqrt();

    Some(EarlySignal::new(
        snap.market_id.clone(),
        SignalType::LiquidityVacuum,
        confidence,
        Direction::Neutral,
        SignalMetadata::LiquidityVacuum {
            bid_drop_pct,
            ask_drop_pct,
            spread_multiple,
        },
    ))
}
