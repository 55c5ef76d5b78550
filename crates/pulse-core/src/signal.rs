//! Early-signal types emitted by the detector family.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The nine detection families (aggressive flow splits by side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    OrderbookImbalance,
    SpreadAnomaly,
    MarketMakerWithdrawal,
    LiquidityVacuum,
    AggressiveBuyer,
    AggressiveSeller,
    FrontRunning,
    CoordinatedCrossMarket,
    VolumeSpike,
    PriceMovement,
}

impl SignalType {
    pub const ALL: [SignalType; 10] = [
        Self::OrderbookImbalance,
        Self::SpreadAnomaly,
        Self::MarketMakerWithdrawal,
        Self::LiquidityVacuum,
        Self::AggressiveBuyer,
        Self::AggressiveSeller,
        Self::FrontRunning,
        Self::CoordinatedCrossMarket,
        Self::VolumeSpike,
        Self::PriceMovement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderbookImbalance => "orderbook_imbalance",
            Self::SpreadAnomaly => "spread_anomaly",
            Self::MarketMakerWithdrawal => "market_maker_withdrawal",
            Self::LiquidityVacuum => "liquidity_vacuum",
            Self::AggressiveBuyer => "aggressive_buyer",
            Self::AggressiveSeller => "aggressive_seller",
            Self::FrontRunning => "front_running",
            Self::CoordinatedCrossMarket => "coordinated_cross_market",
            Self::VolumeSpike => "volume_spike",
            Self::PriceMovement => "price_movement",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected price direction implied by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
            Self::Neutral => "neutral",
        }
    }

    /// Sign for pnl computation: +1 bullish, -1 bearish, 0 neutral.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Bullish => 1.0,
            Self::Bearish => -1.0,
            Self::Neutral => 0.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite-score tier for the front-running detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

/// Per-type signal payload.
///
/// Tagged by signal type so the notifier and the persistence layer can
/// pattern-match without consulting a side channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalMetadata {
    OrderbookImbalance {
        imbalance: f64,
        z_score: f64,
        bid_volume: f64,
        ask_volume: f64,
    },
    SpreadAnomaly {
        spread: f64,
        baseline_spread: f64,
        multiple: f64,
    },
    MarketMakerWithdrawal {
        baseline_depth: f64,
        current_depth: f64,
        drop_pct: f64,
    },
    LiquidityVacuum {
        bid_drop_pct: f64,
        ask_drop_pct: f64,
        spread_multiple: f64,
    },
    AggressiveFlow {
        net_flow: f64,
        flow_z_score: f64,
        trade_count: usize,
    },
    FrontRunning {
        imbalance: f64,
        micro_price_slope: f64,
        spread_multiple: f64,
        composite_score: f64,
        tier: ConfidenceTier,
    },
    CoordinatedCrossMarket {
        correlated_markets: Vec<String>,
        avg_correlation: f64,
        baseline_correlation: f64,
        avg_price_change_pct: f64,
        volume_multiple: f64,
        window_secs: u64,
        leak_start: Option<DateTime<Utc>>,
    },
    VolumeSpike {
        volume_delta: f64,
        baseline_delta: f64,
        multiple: f64,
    },
    PriceMovement {
        outcome_index: usize,
        change_pct: f64,
        window_secs: u64,
    },
}

/// A typed early signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarlySignal {
    /// Unique signal id.
    pub id: String,
    pub market_id: String,
    pub signal_type: SignalType,
    pub timestamp: DateTime<Utc>,
    /// Detection confidence in [0, 1].
    pub confidence: f64,
    pub direction: Direction,
    pub metadata: SignalMetadata,
}

impl EarlySignal {
    /// Create a signal with a fresh id; confidence is clamped to [0, 1].
    pub fn new(
        market_id: impl Into<String>,
        signal_type: SignalType,
        confidence: f64,
        direction: Direction,
        metadata: SignalMetadata,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            market_id: market_id.into(),
            signal_type,
            timestamp: Utc::now(),
            confidence: confidence.clamp(0.0, 1.0),
            direction,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_type_roundtrip() {
        for t in SignalType::ALL {
            assert_eq!(SignalType::parse(t.as_str()), Some(t));
        }
    }

    #[test]
    fn test_confidence_clamped() {
        let s = EarlySignal::new(
            "m1",
            SignalType::SpreadAnomaly,
            1.7,
            Direction::Neutral,
            SignalMetadata::SpreadAnomaly {
                spread: 0.06,
                baseline_spread: 0.02,
                multiple: 3.0,
            },
        );
        assert_eq!(s.confidence, 1.0);
        assert!(!s.id.is_empty());
    }

    #[test]
    fn test_metadata_tagged_serialization() {
        let s = EarlySignal::new(
            "m1",
            SignalType::OrderbookImbalance,
            0.8,
            Direction::Bullish,
            SignalMetadata::OrderbookImbalance {
                imbalance: 0.42,
                z_score: 3.1,
                bid_volume: 1000.0,
                ask_volume: 200.0,
            },
        );
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["signal_type"], "orderbook_imbalance");
        assert_eq!(json["metadata"]["type"], "orderbook_imbalance");
        let back: EarlySignal = serde_json::from_value(json).unwrap();
        match back.metadata {
            SignalMetadata::OrderbookImbalance { imbalance, .. } => {
                assert!((imbalance - 0.42).abs() < 1e-12)
            }
            _ => panic!("wrong metadata variant"),
        }
    }

    #[test]
    fn test_direction_sign() {
        assert_eq!(Direction::Bullish.sign(), 1.0);
        assert_eq!(Direction::Bearish.sign(), -1.0);
        assert_eq!(Direction::Neutral.sign(), 0.0);
    }
}
