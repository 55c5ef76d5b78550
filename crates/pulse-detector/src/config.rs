//! Detector configuration.

use serde::{Deserialize, Serialize};

/// Thresholds for the detector family.
///
/// Defaults follow the surveillance tuning for thin prediction-market
/// books; every field can be overridden from the TOML config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Absolute top-N imbalance required to consider a book one-sided.
    #[serde(default = "default_imbalance_threshold")]
    pub imbalance_threshold: f64,
    /// Z-score the imbalance must also clear.
    #[serde(default = "default_imbalance_z_threshold")]
    pub imbalance_z_threshold: f64,

    /// Spread must reach baseline * multiplier to be anomalous.
    #[serde(default = "default_spread_multiplier")]
    pub spread_multiplier: f64,

    /// Top-of-book depth drop (percent vs EWMA) for maker withdrawal.
    #[serde(default = "default_depth_drop_pct")]
    pub depth_drop_pct: f64,

    /// Per-side depth drop (percent) for the liquidity vacuum.
    #[serde(default = "default_vacuum_depth_drop_pct")]
    pub vacuum_depth_drop_pct: f64,
    /// Spread widening multiple that must coincide with the vacuum.
    #[serde(default = "default_vacuum_spread_multiplier")]
    pub vacuum_spread_multiplier: f64,

    /// Z-score of windowed signed trade flow for aggressive flow.
    #[serde(default = "default_flow_z_threshold")]
    pub flow_z_threshold: f64,
    /// Minimum trades in the window before flow signals fire.
    #[serde(default = "default_min_flow_trades")]
    pub min_flow_trades: usize,

    /// Coincidence window for the front-running composite.
    #[serde(default = "default_front_running_window_secs")]
    pub front_running_window_secs: u64,
    /// Minimum micro-price slope magnitude (price units per sample).
    #[serde(default = "default_front_running_slope_threshold")]
    pub front_running_slope_threshold: f64,

    /// Volume delta must exceed multiplier * recent average delta.
    #[serde(default = "default_spike_multiplier")]
    pub spike_multiplier: f64,
    /// Absolute floor so near-dead markets never spike on noise.
    #[serde(default = "default_min_volume_delta")]
    pub min_volume_delta: f64,

    /// Percent mid-price move that counts as a price movement.
    #[serde(default = "default_price_move_pct")]
    pub price_move_pct: f64,
    /// Lookback window for the price movement check.
    #[serde(default = "default_price_move_window_secs")]
    pub price_move_window_secs: u64,
}

fn default_imbalance_threshold() -> f64 {
    0.15
}

fn default_imbalance_z_threshold() -> f64 {
    2.0
}

fn default_spread_multiplier() -> f64 {
    2.0
}

fn default_depth_drop_pct() -> f64 {
    20.0
}

fn default_vacuum_depth_drop_pct() -> f64 {
    15.0
}

fn default_vacuum_spread_multiplier() -> f64 {
    1.5
}

fn default_flow_z_threshold() -> f64 {
    2.5
}

fn default_min_flow_trades() -> usize {
    10
}

fn default_front_running_window_secs() -> u64 {
    60
}

fn default_front_running_slope_threshold() -> f64 {
    1e-4
}

fn default_spike_multiplier() -> f64 {
    3.0
}

fn default_min_volume_delta() -> f64 {
    100.0
}

fn default_price_move_pct() -> f64 {
    1.5
}

fn default_price_move_window_secs() -> u64 {
    300
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            imbalance_threshold: default_imbalance_threshold(),
            imbalance_z_threshold: default_imbalance_z_threshold(),
            spread_multiplier: default_spread_multiplier(),
            depth_drop_pct: default_depth_drop_pct(),
            vacuum_depth_drop_pct: default_vacuum_depth_drop_pct(),
            vacuum_spread_multiplier: default_vacuum_spread_multiplier(),
            flow_z_threshold: default_flow_z_threshold(),
            min_flow_trades: default_min_flow_trades(),
            front_running_window_secs: default_front_running_window_secs(),
            front_running_slope_threshold: default_front_running_slope_threshold(),
            spike_multiplier: default_spike_multiplier(),
            min_volume_delta: default_min_volume_delta(),
            price_move_pct: default_price_move_pct(),
            price_move_window_secs: default_price_move_window_secs(),
        }
    }
}

impl DetectorConfig {
    /// Validate threshold sanity.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.imbalance_threshold) || self.imbalance_threshold == 0.0 {
            return Err(format!(
                "imbalance_threshold must be in (0, 1], got {}",
                self.imbalance_threshold
            ));
        }
        if self.imbalance_z_threshold <= 0.0 {
            return Err("imbalance_z_threshold must be positive".to_string());
        }
        if self.spread_multiplier <= 1.0 {
            return Err("spread_multiplier must exceed 1".to_string());
        }
        if !(0.0..100.0).contains(&self.depth_drop_pct) || self.depth_drop_pct == 0.0 {
            return Err("depth_drop_pct must be in (0, 100)".to_string());
        }
        if self.spike_multiplier <= 1.0 {
            return Err("spike_multiplier must exceed 1".to_string());
        }
        if self.price_move_pct <= 0.0 {
            return Err("price_move_pct must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(DetectorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_bad_thresholds_rejected() {
        let mut c = DetectorConfig::default();
        c.imbalance_threshold = 0.0;
        assert!(c.validate().is_err());

        let mut c = DetectorConfig::default();
        c.spread_multiplier = 1.0;
        assert!(c.validate().is_err());

        let mut c = DetectorConfig::default();
        c.depth_drop_pct = 100.0;
        assert!(c.validate().is_err());
    }
}
