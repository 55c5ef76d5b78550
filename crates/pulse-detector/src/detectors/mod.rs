//! The detector family.
//!
//! One module per detector; each exposes a single `check` function
//! taking the market snapshot and the shared configuration.

pub mod aggressor;
pub mod front_running;
pub mod imbalance;
pub mod price_movement;
pub mod spread;
pub mod vacuum;
pub mod volume_spike;
pub mod withdrawal;

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::Utc;
    use pulse_state::StateSnapshot;

    /// A warmed-up, quiet snapshot that no detector should fire on.
    pub(crate) fn quiet_snapshot(market_id: &str) -> StateSnapshot {
        StateSnapshot {
            market_id: market_id.to_string(),
            updated_at: Utc::now(),
            book_samples: 100,
            trade_samples: 50,
            warmed_up: true,
            mid_price: Some(0.50),
            spread: Some(0.02),
            micro_price: Some(0.50),
            micro_price_slope: 0.0,
            imbalance: 0.0,
            z_imbalance: 0.0,
            imbalance_window_mean: 0.0,
            z_spread: 0.0,
            spread_baseline: Some(0.02),
            depth_top: 1000.0,
            z_depth: 0.0,
            depth_baseline: Some(1000.0),
            bid_depth: 500.0,
            ask_depth: 500.0,
            bid_depth_baseline: Some(500.0),
            ask_depth_baseline: Some(500.0),
            net_flow: 0.0,
            z_flow: 0.0,
            window_trades: 20,
            volume_delta: 100.0,
            volume_delta_avg: 100.0,
            recent_mids: (0..20)
                .map(|i| {
                    (
                        Utc::now() - chrono::Duration::seconds(20 - i),
                        0.50,
                    )
                })
                .collect(),
        }
    }
}
