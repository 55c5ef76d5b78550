//! Orderbook snapshots and trade ticks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single price level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub size: f64,
}

impl PriceLevel {
    pub fn new(price: f64, size: f64) -> Self {
        Self { price, size }
    }
}

/// Trade aggressor side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }

    /// Sign applied to trade size for flow accounting.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }
}

/// A single trade tick, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeTick {
    pub market_id: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub size: f64,
    pub side: TradeSide,
}

impl TradeTick {
    /// Size signed by aggressor side.
    pub fn signed_size(&self) -> f64 {
        self.size * self.side.sign()
    }
}

/// A point-in-time view of one market's book.
///
/// Bids are sorted descending by price, asks ascending. Produced by the
/// WebSocket decoder on every level update; only aggregates are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderbookSnapshot {
    pub market_id: String,
    pub asset_id: String,
    pub timestamp: DateTime<Utc>,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl OrderbookSnapshot {
    /// Construct a snapshot, sorting both sides into canonical order.
    pub fn new(
        market_id: String,
        asset_id: String,
        timestamp: DateTime<Utc>,
        mut bids: Vec<PriceLevel>,
        mut asks: Vec<PriceLevel>,
    ) -> Self {
        bids.sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(std::cmp::Ordering::Equal));
        asks.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));
        Self {
            market_id,
            asset_id,
            timestamp,
            bids,
            asks,
        }
    }

    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.first().copied()
    }

    /// `best_ask - best_bid`, undefined if either side is empty.
    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some(a.price - b.price),
            _ => None,
        }
    }

    /// Arithmetic mean of best bid and ask, undefined if either side empty.
    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some((a.price + b.price) / 2.0),
            _ => None,
        }
    }

    /// Volume-weighted micro-price using top-of-book sizes.
    ///
    /// `(ask_size * best_bid + bid_size * best_ask) / (bid_size + ask_size)`
    pub fn micro_price(&self) -> Option<f64> {
        let (bid, ask) = (self.best_bid()?, self.best_ask()?);
        let total = bid.size + ask.size;
        if total <= 0.0 {
            return self.mid_price();
        }
        Some((ask.size * bid.price + bid.size * ask.price) / total)
    }

    /// Summed size across the top `n` levels of one side.
    fn side_depth(levels: &[PriceLevel], n: usize) -> f64 {
        levels.iter().take(n).map(|l| l.size).sum()
    }

    pub fn bid_depth(&self, n: usize) -> f64 {
        Self::side_depth(&self.bids, n)
    }

    pub fn ask_depth(&self, n: usize) -> f64 {
        Self::side_depth(&self.asks, n)
    }

    /// Top-of-book depth: bid size + ask size at level 1.
    pub fn depth_at_top(&self) -> f64 {
        self.bid_depth(1) + self.ask_depth(1)
    }

    /// Volume imbalance across the top `n` levels.
    ///
    /// `(bid_vol - ask_vol) / (bid_vol + ask_vol)`, or 0 when the book
    /// carries no volume.
    pub fn imbalance(&self, n: usize) -> f64 {
        let bid_vol = self.bid_depth(n);
        let ask_vol = self.ask_depth(n);
        let total = bid_vol + ask_vol;
        if total <= 0.0 {
            return 0.0;
        }
        (bid_vol - ask_vol) / total
    }

    /// Whether both sides have at least one level.
    pub fn is_two_sided(&self) -> bool {
        !self.bids.is_empty() && !self.asks.is_empty()
    }
}
