//! Volume spike detector.
//!
//! Driven by the discovery refresh: the latest per-cycle volume delta
//! is compared against the recent average delta.

use crate::config::DetectorConfig;
use pulse_core::{Direction, EarlySignal, SignalMetadata, SignalType};
use pulse_state::StateSnapshot;

pub fn check(snap: &StateSnapshot, cfg: &DetectorConfig) -> Option<EarlySignal> {
    let delta = snap.volume_delta;
    let avg = snap.volume_delta_avg;
    if delta < cfg.min_volume_delta || avg <= 0.0 {
        return None;
    }
    let multiple = delta / avg;
    if multiple < cfg.spike_multiplier {
        return None;
    }

    let confidence =
        (0.5 + 0.5 * (multiple - cfg.spike_multiplier) / (2.0 * cfg.spike_multiplier))
            .clamp(0.0, 1.0);

    Some(EarlySignal::new(
        snap.market_id.clone(),
        SignalType::VolumeSpike,
        confidence,
        Direction::Neutral,
        SignalMetadata::VolumeSpike {
            volume_delta: delta,
            baseline_delta: avg,
            multiple,
        },
    ))
}
