//! Per-market state container and the sharded store.

use crate::error::StateResult;
use crate::ring::RingBuffer;
use crate::series::RollingSeries;
use crate::stats::least_squares_slope;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use pulse_core::{MarketId, OrderbookSnapshot, TradeTick};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Rolling-state configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Ring buffer capacity per series.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// EWMA smoothing factor.
    #[serde(default = "default_ewma_alpha")]
    pub ewma_alpha: f64,
    /// Samples required before z-scores are reported.
    #[serde(default = "default_min_sample_size")]
    pub min_sample_size: u64,
    /// Book levels used for the imbalance computation.
    #[serde(default = "default_imbalance_levels")]
    pub imbalance_levels: usize,
    /// Samples in the micro-price slope regression window.
    #[serde(default = "default_slope_window")]
    pub slope_window: usize,
    /// Trades in the flow-imbalance window.
    #[serde(default = "default_flow_window")]
    pub flow_window: usize,
}

fn default_buffer_capacity() -> usize {
    1000
}

fn default_ewma_alpha() -> f64 {
    0.1
}

fn default_min_sample_size() -> u64 {
    10
}

fn default_imbalance_levels() -> usize {
    5
}

fn default_slope_window() -> usize {
    20
}

fn default_flow_window() -> usize {
    30
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            ewma_alpha: default_ewma_alpha(),
            min_sample_size: default_min_sample_size(),
            imbalance_levels: default_imbalance_levels(),
            slope_window: default_slope_window(),
            flow_window: default_flow_window(),
        }
    }
}

/// Consistent read of one market's rolling state.
///
/// Detectors consume this; it is computed under the entry lock and then
/// owned by the caller, so detector work never holds the lock.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub market_id: MarketId,
    pub updated_at: DateTime<Utc>,
    pub book_samples: usize,
    pub trade_samples: usize,
    /// Whether `min_sample_size` book updates have been observed.
    pub warmed_up: bool,

    pub mid_price: Option<f64>,
    pub spread: Option<f64>,
    pub micro_price: Option<f64>,
    /// Least-squares slope of micro-price over the slope window.
    pub micro_price_slope: f64,

    pub imbalance: f64,
    pub z_imbalance: f64,
    /// Mean imbalance over the slope window (persistence input).
    pub imbalance_window_mean: f64,

    pub z_spread: f64,
    pub spread_baseline: Option<f64>,

    pub depth_top: f64,
    pub z_depth: f64,
    pub depth_baseline: Option<f64>,
    pub bid_depth: f64,
    pub ask_depth: f64,
    pub bid_depth_baseline: Option<f64>,
    pub ask_depth_baseline: Option<f64>,

    /// Net signed trade flow over the flow window.
    pub net_flow: f64,
    /// Z-score of the windowed net flow against per-trade flow moments.
    pub z_flow: f64,
    pub window_trades: usize,

    /// Latest per-refresh volume delta and its historical average.
    pub volume_delta: f64,
    pub volume_delta_avg: f64,

    /// The most recent (timestamp, mid) samples, oldest first.
    pub recent_mids: Vec<(DateTime<Utc>, f64)>,
}

/// Rolling state for a single market. One writer per market.
#[derive(Debug)]
pub struct PerMarketState {
    market_id: MarketId,
    config: StateConfig,

    mid: RollingSeries,
    spread: RollingSeries,
    depth_top: RollingSeries,
    bid_depth: RollingSeries,
    ask_depth: RollingSeries,
    imbalance: RollingSeries,
    micro: RollingSeries,
    flow: RollingSeries,
    volume_delta: RollingSeries,

    mid_times: RingBuffer<(DateTime<Utc>, f64)>,
    last_volume: Option<f64>,
    last_update: DateTime<Utc>,
}

impl PerMarketState {
    pub fn new(market_id: MarketId, config: StateConfig) -> Self {
        let cap = config.buffer_capacity;
        let alpha = config.ewma_alpha;
        Self {
            market_id,
            mid: RollingSeries::new(cap, alpha),
            spread: RollingSeries::new(cap, alpha),
            depth_top: RollingSeries::new(cap, alpha),
            bid_depth: RollingSeries::new(cap, alpha),
            ask_depth: RollingSeries::new(cap, alpha),
            imbalance: RollingSeries::new(cap, alpha),
            micro: RollingSeries::new(cap, alpha),
            flow: RollingSeries::new(cap, alpha),
            volume_delta: RollingSeries::new(cap, alpha),
            mid_times: RingBuffer::new(config.slope_window.max(2)),
            last_volume: None,
            last_update: Utc::now(),
            config,
        }
    }

    /// Ingest an orderbook update.
    ///
    /// Timestamps are clamped monotonic per market: an out-of-order frame
    /// is still ingested (its levels are newest-known), but the recorded
    /// update time never goes backwards.
    pub fn ingest_orderbook(&mut self, snapshot: &OrderbookSnapshot) {
        let ts = snapshot.timestamp.max(self.last_update);
        self.last_update = ts;

        if let Some(mid) = snapshot.mid_price() {
            self.mid.push(mid);
            self.mid_times.push((ts, mid));
        }
        if let Some(spread) = snapshot.spread() {
            self.spread.push(spread);
        }
        let n = self.config.imbalance_levels;
        self.bid_depth.push(snapshot.bid_depth(n));
        self.ask_depth.push(snapshot.ask_depth(n));
        self.depth_top.push(snapshot.depth_at_top());
        self.imbalance.push(snapshot.imbalance(n));
        if let Some(micro) = snapshot.micro_price() {
            self.micro.push(micro);
        }
    }

    /// Ingest a trade tick (signed by aggressor side).
    pub fn ingest_trade(&mut self, tick: &TradeTick) {
        self.last_update = tick.timestamp.max(self.last_update);
        self.flow.push(tick.signed_size());
    }

    /// Ingest the per-refresh cumulative volume reading.
    ///
    /// The series tracks deltas between refreshes, which is what the
    /// volume-spike detector consumes.
    pub fn ingest_volume(&mut self, total_volume: f64) {
        if let Some(prev) = self.last_volume {
            let delta = (total_volume - prev).max(0.0);
            self.volume_delta.push(delta);
        }
        self.last_volume = Some(total_volume);
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    /// Produce a consistent snapshot for detector consumption.
    pub fn snapshot(&self) -> StateSnapshot {
        let min = self.config.min_sample_size;
        let warmed_up = self.mid.len() as u64 >= min;

        let micro_tail = self.micro.tail(self.config.slope_window);
        let imb_tail = self.imbalance.tail(self.config.slope_window);
        let imbalance_window_mean = if imb_tail.is_empty() {
            0.0
        } else {
            imb_tail.iter().sum::<f64>() / imb_tail.len() as f64
        };

        let flow_tail = self.flow.tail(self.config.flow_window);
        let net_flow: f64 = flow_tail.iter().sum();
        // Z of the window total against per-trade moments, scaled by
        // sqrt(window) so a persistent one-sided flow stands out.
        let z_flow = if flow_tail.is_empty() {
            0.0
        } else {
            let per_trade = net_flow / flow_tail.len() as f64;
            self.flow.z_score(per_trade, min) * (flow_tail.len() as f64).sqrt()
        };

        StateSnapshot {
            market_id: self.market_id.clone(),
            updated_at: self.last_update,
            book_samples: self.mid.len(),
            trade_samples: self.flow.len(),
            warmed_up,
            mid_price: self.mid.last(),
            spread: self.spread.last(),
            micro_price: self.micro.last(),
            micro_price_slope: least_squares_slope(&micro_tail),
            imbalance: self.imbalance.last().unwrap_or(0.0),
            z_imbalance: self.imbalance.latest_z(min),
            imbalance_window_mean,
            z_spread: self.spread.latest_z(min),
            spread_baseline: self.spread.baseline(),
            depth_top: self.depth_top.last().unwrap_or(0.0),
            z_depth: self.depth_top.latest_z(min),
            depth_baseline: self.depth_top.baseline(),
            bid_depth: self.bid_depth.last().unwrap_or(0.0),
            ask_depth: self.ask_depth.last().unwrap_or(0.0),
            bid_depth_baseline: self.bid_depth.baseline(),
            ask_depth_baseline: self.ask_depth.baseline(),
            net_flow,
            z_flow,
            window_trades: flow_tail.len(),
            volume_delta: self.volume_delta.last().unwrap_or(0.0),
            volume_delta_avg: self.volume_delta.mean(),
            recent_mids: self.mid_times.iter().copied().collect(),
        }
    }
}

type StateEntry = Arc<RwLock<PerMarketState>>;

/// Sharded store of per-market state.
///
/// The map itself is concurrent; each entry is guarded so that the
/// single dispatcher writer serializes updates per market while
/// detectors and the correlator take read snapshots.
pub struct MarketStateStore {
    config: StateConfig,
    markets: DashMap<MarketId, StateEntry>,
}

impl MarketStateStore {
    pub fn new(config: StateConfig) -> Self {
        Self {
            config,
            markets: DashMap::new(),
        }
    }

    fn get_or_create(&self, market_id: &str) -> StateEntry {
        self.markets
            .entry(market_id.to_string())
            .or_insert_with(|| {
                debug!(market_id, "Creating per-market state");
                Arc::new(RwLock::new(PerMarketState::new(
                    market_id.to_string(),
                    self.config.clone(),
                )))
            })
            .clone()
    }

    /// Apply an orderbook update and return the post-update snapshot.
    pub fn ingest_orderbook(&self, snapshot: &OrderbookSnapshot) -> StateSnapshot {
        let entry = self.get_or_create(&snapshot.market_id);
        let mut state = entry.write();
        state.ingest_orderbook(snapshot);
        state.snapshot()
    }

    /// Apply a trade tick and return the post-update snapshot.
    pub fn ingest_trade(&self, tick: &TradeTick) -> StateSnapshot {
        let entry = self.get_or_create(&tick.market_id);
        let mut state = entry.write();
        state.ingest_trade(tick);
        state.snapshot()
    }

    /// Record the latest cumulative volume for a market.
    pub fn ingest_volume(&self, market_id: &str, total_volume: f64) -> StateSnapshot {
        let entry = self.get_or_create(market_id);
        let mut state = entry.write();
        state.ingest_volume(total_volume);
        state.snapshot()
    }

    /// Read a snapshot without mutating.
    pub fn snapshot(&self, market_id: &str) -> Option<StateSnapshot> {
        self.markets
            .get(market_id)
            .map(|entry| entry.read().snapshot())
    }

    /// All tracked market ids.
    pub fn market_ids(&self) -> Vec<MarketId> {
        self.markets.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    /// Drop state for markets no longer tracked.
    pub fn retain(&self, keep: impl Fn(&str) -> bool) -> StateResult<usize> {
        let before = self.markets.len();
        self.markets.retain(|id, _| keep(id));
        Ok(before - self.markets.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::{PriceLevel, TradeSide};

    fn book(market_id: &str, bid: (f64, f64), ask: (f64, f64)) -> OrderbookSnapshot {
        OrderbookSnapshot::new(
            market_id.to_string(),
            "asset".to_string(),
            Utc::now(),
            vec![PriceLevel::new(bid.0, bid.1)],
            vec![PriceLevel::new(ask.0, ask.1)],
        )
    }

    #[test]
    fn test_warm_up_gates_z_scores() {
        let store = MarketStateStore::new(StateConfig::default());
        let snap = store.ingest_orderbook(&book("m1", (0.45, 10.0), (0.50, 10.0)));
        assert!(!snap.warmed_up);
        assert_eq!(snap.z_imbalance, 0.0);
        assert_eq!(snap.z_spread, 0.0);
    }

    #[test]
    fn test_snapshot_after_updates() {
        let store = MarketStateStore::new(StateConfig::default());
        let mut snap = store.ingest_orderbook(&book("m1", (0.45, 10.0), (0.50, 10.0)));
        for _ in 0..20 {
            snap = store.ingest_orderbook(&book("m1", (0.45, 10.0), (0.50, 10.0)));
        }
        assert!(snap.warmed_up);
        assert_eq!(snap.book_samples, 21);
        assert!((snap.mid_price.unwrap() - 0.475).abs() < 1e-12);
        assert!((snap.spread.unwrap() - 0.05).abs() < 1e-12);
        assert_eq!(snap.imbalance, 0.0);
    }

    #[test]
    fn test_z_scores_bounded_under_stationary_input() {
        // Deterministic wobble around a fixed book; no z-score should
        // leave a +-10 band once warmed up.
        let store = MarketStateStore::new(StateConfig::default());
        let mut snap = None;
        for i in 0..200 {
            let jitter = ((i % 7) as f64 - 3.0) * 2.0;
            let s = store.ingest_orderbook(&book(
                "m1",
                (0.45, 100.0 + jitter),
                (0.50, 100.0 - jitter),
            ));
            if s.warmed_up {
                assert!(s.z_imbalance.abs() <= 10.0, "z_imbalance {}", s.z_imbalance);
                assert!(s.z_spread.abs() <= 10.0);
                assert!(s.z_depth.abs() <= 10.0);
            }
            snap = Some(s);
        }
        assert!(snap.unwrap().warmed_up);
    }

    #[test]
    fn test_imbalance_step_is_visible() {
        let store = MarketStateStore::new(StateConfig::default());
        for _ in 0..50 {
            store.ingest_orderbook(&book("m1", (0.45, 500.0), (0.50, 500.0)));
        }
        let snap = store.ingest_orderbook(&book("m1", (0.45, 1000.0), (0.50, 200.0)));
        assert!(snap.imbalance > 0.5);
        assert!(snap.z_imbalance > 2.0);
    }

    #[test]
    fn test_trade_flow_window() {
        let store = MarketStateStore::new(StateConfig::default());
        let mut snap = None;
        for i in 0..10 {
            let tick = TradeTick {
                market_id: "m1".to_string(),
                timestamp: Utc::now(),
                price: 0.47,
                size: 10.0,
                side: if i % 2 == 0 {
                    TradeSide::Buy
                } else {
                    TradeSide::Sell
                },
            };
            snap = Some(store.ingest_trade(&tick));
        }
        let snap = snap.unwrap();
        assert_eq!(snap.window_trades, 10);
        assert!(snap.net_flow.abs() < 1e-12);
    }

    #[test]
    fn test_volume_delta_series() {
        let store = MarketStateStore::new(StateConfig::default());
        store.ingest_volume("m1", 1000.0);
        let snap = store.ingest_volume("m1", 1500.0);
        assert!((snap.volume_delta - 500.0).abs() < 1e-12);
        // Decreasing totals clamp to zero rather than going negative.
        let snap = store.ingest_volume("m1", 1400.0);
        assert_eq!(snap.volume_delta, 0.0);
    }

    #[test]
    fn test_monotonic_update_time() {
        let store = MarketStateStore::new(StateConfig::default());
        let now = Utc::now();
        let mut early = book("m1", (0.45, 10.0), (0.50, 10.0));
        early.timestamp = now - chrono::Duration::seconds(60);
        store.ingest_orderbook(&book("m1", (0.45, 10.0), (0.50, 10.0)));
        let snap = store.ingest_orderbook(&early);
        assert!(snap.updated_at >= now - chrono::Duration::seconds(1));
    }

    #[test]
    fn test_retain_drops_untracked() {
        let store = MarketStateStore::new(StateConfig::default());
        store.ingest_volume("m1", 1.0);
        store.ingest_volume("m2", 1.0);
        let dropped = store.retain(|id| id == "m1").unwrap();
        assert_eq!(dropped, 1);
        assert!(store.snapshot("m2").is_none());
        assert!(store.snapshot("m1").is_some());
    }
}
