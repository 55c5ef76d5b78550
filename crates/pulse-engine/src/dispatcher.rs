//! The ingestion dispatcher.
//!
//! Consumes type-grouped frame batches from the WebSocket layer,
//! resolves asset ids through the registry, maintains local books,
//! applies per-market state updates (single writer: this task), runs
//! the detector fan-out on the updated market, and publishes signals.
//!
//! For multi-outcome markets, the primary (index 0) outcome's book
//! drives the rolling state and detectors; the complement books are
//! mirror images on a binary venue and would corrupt the series.

use crate::bus::SignalBus;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pulse_core::{EarlySignal, OrderbookSnapshot, TradeTick};
use pulse_detector::DetectorEngine;
use pulse_history::PriceHistoryTracker;
use pulse_perf::SignalPerformanceTracker;
use pulse_state::MarketStateStore;
use pulse_storage::{StorageOp, WriterHandle};
use pulse_telemetry::metrics;
use pulse_ws::{BookApplyOutcome, EventBatch, LocalBookStore, SubscriptionRegistry, WsEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Where emitted signals go: bus, persistence, performance tracking.
#[derive(Clone)]
pub struct SignalSink {
    pub bus: Arc<SignalBus>,
    pub writer: Option<WriterHandle>,
    pub perf: Arc<SignalPerformanceTracker>,
}

impl SignalSink {
    /// Emit one signal everywhere it needs to go.
    pub fn emit(&self, signal: EarlySignal, entry_price: Option<f64>, market_volume: f64) {
        metrics::SIGNALS_TOTAL
            .with_label_values(&[signal.signal_type.as_str(), signal.direction.as_str()])
            .inc();
        if let Some(writer) = &self.writer {
            writer.enqueue(StorageOp::InsertSignal(Box::new(signal.clone())));
        }
        if let Some(price) = entry_price {
            self.perf.track(&signal, price, market_volume);
        }
        self.bus.publish(signal);
    }
}

/// A REST book-reseed request (asset, market).
pub type ReseedRequest = (String, String);

/// Routes batches into per-market state and the detector fan-out.
pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    books: Arc<Mutex<LocalBookStore>>,
    state: Arc<MarketStateStore>,
    detectors: DetectorEngine,
    history: Arc<PriceHistoryTracker>,
    sink: SignalSink,
    reseed_tx: mpsc::Sender<ReseedRequest>,
    /// Cumulative volume per market, refreshed by discovery.
    volumes: Arc<Mutex<HashMap<String, f64>>>,
    /// Last persisted book time per market (down-sampling).
    last_book_persist: Mutex<HashMap<String, DateTime<Utc>>>,
    book_sample_secs: u64,
    trade_sample_every: u64,
    trade_counter: AtomicU64,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        books: Arc<Mutex<LocalBookStore>>,
        state: Arc<MarketStateStore>,
        detectors: DetectorEngine,
        history: Arc<PriceHistoryTracker>,
        sink: SignalSink,
        reseed_tx: mpsc::Sender<ReseedRequest>,
        volumes: Arc<Mutex<HashMap<String, f64>>>,
        book_sample_secs: u64,
        trade_sample_every: u64,
    ) -> Self {
        Self {
            registry,
            books,
            state,
            detectors,
            history,
            sink,
            reseed_tx,
            volumes,
            last_book_persist: Mutex::new(HashMap::new()),
            book_sample_secs,
            trade_sample_every: trade_sample_every.max(1),
            trade_counter: AtomicU64::new(0),
        }
    }

    /// Drain batches until the channel closes.
    pub async fn run(&self, mut batch_rx: mpsc::Receiver<EventBatch>) {
        while let Some(batch) = batch_rx.recv().await {
            for (kind, events) in batch {
                metrics::WS_FRAMES_TOTAL
                    .with_label_values(&[kind])
                    .inc_by(events.len() as f64);
                for event in events {
                    self.handle_event(event).await;
                }
            }
        }
        debug!("Batch channel closed; dispatcher stopping");
    }

    async fn handle_event(&self, event: WsEvent) {
        match event {
            WsEvent::BookSnapshot {
                asset_id,
                bids,
                asks,
                timestamp_ms,
            } => {
                let Some((market_id, outcome_index)) = self.resolve(&asset_id, "book") else {
                    return;
                };
                let ts = ts_or_now(timestamp_ms);
                let snapshot = {
                    let mut books = self.books.lock();
                    books.seed(&asset_id, &bids, &asks, ts);
                    books.snapshot(&asset_id, &market_id)
                };
                if outcome_index == 0 {
                    if let Some(snapshot) = snapshot {
                        self.apply_book(snapshot);
                    }
                }
            }
            WsEvent::PriceChange {
                asset_id,
                changes,
                timestamp_ms,
            } => {
                let Some((market_id, outcome_index)) = self.resolve(&asset_id, "price_change")
                else {
                    return;
                };
                let ts = ts_or_now(timestamp_ms);
                let (outcome, snapshot) = {
                    let mut books = self.books.lock();
                    let outcome = books.apply_delta(&asset_id, &changes, ts);
                    let snapshot = books.snapshot(&asset_id, &market_id);
                    (outcome, snapshot)
                };
                match outcome {
                    BookApplyOutcome::Applied => {
                        if outcome_index == 0 {
                            if let Some(snapshot) = snapshot {
                                self.apply_book(snapshot);
                            }
                        }
                    }
                    BookApplyOutcome::NeedsSnapshot | BookApplyOutcome::Corrupt => {
                        debug!(asset_id = %asset_id, ?outcome, "Requesting REST reseed");
                        if self.reseed_tx.try_send((asset_id, market_id)).is_err() {
                            warn!("Reseed queue full");
                        }
                    }
                }
            }
            WsEvent::Trade {
                asset_id,
                price,
                size,
                side,
                timestamp_ms,
            } => {
                let Some((market_id, outcome_index)) = self.resolve(&asset_id, "trade") else {
                    return;
                };
                if outcome_index != 0 {
                    return;
                }
                let tick = TradeTick {
                    market_id,
                    timestamp: ts_or_now(timestamp_ms),
                    price,
                    size,
                    side,
                };
                self.apply_trade(tick);
            }
            WsEvent::SubscriptionAck { .. } | WsEvent::Pong => {}
            WsEvent::Unknown { event_type } => {
                debug!(event_type = %event_type, "Ignoring unknown frame type");
            }
        }
    }

    /// Apply a primary-outcome book update: state, history, detectors,
    /// down-sampled persistence.
    fn apply_book(&self, snapshot: OrderbookSnapshot) {
        let market_id = snapshot.market_id.clone();
        let state_snap = self.state.ingest_orderbook(&snapshot);

        if let Some(mid) = state_snap.mid_price {
            let volume = self
                .volumes
                .lock()
                .get(&market_id)
                .copied()
                .unwrap_or(0.0);
            self.history
                .append(&market_id, snapshot.timestamp, mid, volume);
        }

        // Down-sampled book persistence.
        if let Some(writer) = &self.sink.writer {
            let mut last = self.last_book_persist.lock();
            let due = last
                .get(&market_id)
                .map(|&t| (snapshot.timestamp - t).num_seconds() >= self.book_sample_secs as i64)
                .unwrap_or(true);
            if due {
                last.insert(market_id.clone(), snapshot.timestamp);
                writer.enqueue(StorageOp::AppendOrderbook(Box::new(snapshot)));
            }
        }

        let volume = state_snap.volume_delta_avg;
        for signal in self.detectors.evaluate_update(&state_snap) {
            self.sink.emit(signal, state_snap.mid_price, volume);
        }
    }

    fn apply_trade(&self, tick: TradeTick) {
        let state_snap = self.state.ingest_trade(&tick);

        if let Some(writer) = &self.sink.writer {
            let n = self.trade_counter.fetch_add(1, Ordering::Relaxed);
            if n % self.trade_sample_every == 0 {
                writer.enqueue(StorageOp::AppendTrade(tick));
            }
        }

        for signal in self.detectors.evaluate_update(&state_snap) {
            self.sink.emit(signal, state_snap.mid_price, 0.0);
        }
    }

    fn resolve(&self, asset_id: &str, kind: &str) -> Option<(String, usize)> {
        match self.registry.resolve(asset_id) {
            Some(resolved) => Some(resolved),
            None => {
                metrics::WS_UNKNOWN_ASSET_TOTAL
                    .with_label_values(&[kind])
                    .inc();
                None
            }
        }
    }
}

fn ts_or_now(timestamp_ms: Option<i64>) -> DateTime<Utc> {
    timestamp_ms
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::PriceLevel;
    use pulse_detector::DetectorConfig;
    use pulse_history::HistoryConfig;
    use pulse_perf::PerfConfig;
    use pulse_state::StateConfig;

    fn dispatcher() -> (Dispatcher, Arc<SignalBus>, mpsc::Receiver<ReseedRequest>) {
        let registry = Arc::new(SubscriptionRegistry::new(500));
        registry.set_desired(&[
            ("tok-yes".to_string(), "mkt".to_string(), 0),
            ("tok-no".to_string(), "mkt".to_string(), 1),
        ]);
        let bus = Arc::new(SignalBus::new(256));
        let (reseed_tx, reseed_rx) = mpsc::channel(16);
        let sink = SignalSink {
            bus: bus.clone(),
            writer: None,
            perf: Arc::new(SignalPerformanceTracker::new(&PerfConfig::default())),
        };
        let d = Dispatcher::new(
            registry,
            Arc::new(Mutex::new(LocalBookStore::new())),
            Arc::new(MarketStateStore::new(StateConfig::default())),
            DetectorEngine::new(DetectorConfig::default()).unwrap(),
            Arc::new(PriceHistoryTracker::new(HistoryConfig::default())),
            sink,
            reseed_tx,
            Arc::new(Mutex::new(HashMap::new())),
            60,
            5,
        );
        (d, bus, reseed_rx)
    }

    fn book_event(asset: &str, bid_size: f64, ask_size: f64) -> WsEvent {
        WsEvent::BookSnapshot {
            asset_id: asset.to_string(),
            bids: (0..5)
                .map(|i| PriceLevel::new(0.45 - i as f64 * 0.01, bid_size / 5.0))
                .collect(),
            asks: (0..5)
                .map(|i| PriceLevel::new(0.50 + i as f64 * 0.01, ask_size / 5.0))
                .collect(),
            timestamp_ms: None,
        }
    }

    #[tokio::test]
    async fn test_imbalance_step_emits_exactly_one_imbalance_signal() {
        let (d, bus, _rx) = dispatcher();

        // 50 balanced updates, then one heavily bid book.
        for _ in 0..50 {
            d.handle_event(book_event("tok-yes", 500.0, 500.0)).await;
        }
        assert!(bus.is_empty());

        d.handle_event(book_event("tok-yes", 1000.0, 200.0)).await;

        let mut imbalance_signals = Vec::new();
        while !bus.is_empty() {
            let sig = bus.next().await.unwrap();
            if sig.signal_type == pulse_core::SignalType::OrderbookImbalance {
                imbalance_signals.push(sig);
            }
        }
        assert_eq!(imbalance_signals.len(), 1);
        let sig = &imbalance_signals[0];
        assert_eq!(sig.market_id, "mkt");
        assert_eq!(sig.direction, pulse_core::Direction::Bullish);
        assert!(sig.confidence >= 0.5, "confidence {}", sig.confidence);
    }

    #[tokio::test]
    async fn test_unknown_asset_dropped() {
        let (d, bus, _rx) = dispatcher();
        d.handle_event(book_event("ghost", 500.0, 500.0)).await;
        assert!(bus.is_empty());
    }

    #[tokio::test]
    async fn test_secondary_outcome_not_fed_to_state() {
        let (d, bus, _rx) = dispatcher();
        for _ in 0..50 {
            d.handle_event(book_event("tok-no", 500.0, 500.0)).await;
        }
        // A violent step on the complement book produces no signal.
        d.handle_event(book_event("tok-no", 1000.0, 50.0)).await;
        assert!(bus.is_empty());
    }

    #[tokio::test]
    async fn test_delta_without_seed_requests_reseed() {
        let (d, _bus, mut reseed_rx) = dispatcher();
        d.handle_event(WsEvent::PriceChange {
            asset_id: "tok-yes".to_string(),
            changes: vec![],
            timestamp_ms: None,
        })
        .await;
        let (asset, market) = reseed_rx.recv().await.unwrap();
        assert_eq!(asset, "tok-yes");
        assert_eq!(market, "mkt");
    }
}
