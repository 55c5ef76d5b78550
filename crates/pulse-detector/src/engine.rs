//! Detector fan-out engine.

use crate::config::DetectorConfig;
use crate::detectors;
use crate::error::{DetectorError, DetectorResult};
use pulse_core::EarlySignal;
use pulse_state::StateSnapshot;
use tracing::debug;

/// Runs every detector against a snapshot.
///
/// All firing detectors emit; deduplication is the notifier's job.
pub struct DetectorEngine {
    config: DetectorConfig,
}

/// Detectors driven by orderbook/trade updates.
type CheckFn = fn(&StateSnapshot, &DetectorConfig) -> Option<EarlySignal>;

const BOOK_CHECKS: [CheckFn; 6] = [
    detectors::imbalance::check,
    detectors::spread::check,
    detectors::withdrawal::check,
    detectors::vacuum::check,
    detectors::aggressor::check,
    detectors::front_running::check,
];

/// Detectors driven by the discovery refresh cycle.
const REFRESH_CHECKS: [CheckFn; 2] = [
    detectors::volume_spike::check,
    detectors::price_movement::check,
];

impl DetectorEngine {
    pub fn new(config: DetectorConfig) -> DetectorResult<Self> {
        config.validate().map_err(DetectorError::ConfigError)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Evaluate the book-driven detectors on one market's snapshot.
    pub fn evaluate_update(&self, snap: &StateSnapshot) -> Vec<EarlySignal> {
        self.run(&BOOK_CHECKS, snap)
    }

    /// Evaluate the refresh-driven detectors (volume spike, price move).
    pub fn evaluate_refresh(&self, snap: &StateSnapshot) -> Vec<EarlySignal> {
        self.run(&REFRESH_CHECKS, snap)
    }

    fn run(&self, checks: &[CheckFn], snap: &StateSnapshot) -> Vec<EarlySignal> {
        let mut signals = Vec::new();
        for check in checks {
            // A panicking detector must not take down the market writer;
            // contain it and keep evaluating the rest.
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                check(snap, &self.config)
            }));
            match result {
                Ok(Some(signal)) => {
                    debug!(
                        market_id = %snap.market_id,
                        signal_type = %signal.signal_type,
                        confidence = signal.confidence,
                        "Detector fired"
                    );
                    signals.push(signal);
                }
                Ok(None) => {}
                Err(_) => {
                    tracing::error!(market_id = %snap.market_id, "Detector panicked; skipped");
                }
            }
        }
        signals
    }
}
