//! End-to-end pipeline tests: frames in, alerts and rows out.

use async_trait::async_trait;
use parking_lot::Mutex;
use pulse_core::{PriceLevel, SignalType};
use pulse_detector::{DetectorConfig, DetectorEngine};
use pulse_discovery::{DiscoveryConfig, MarketCatalog};
use pulse_engine::{Dispatcher, SignalBus, SignalSink};
use pulse_history::{HistoryConfig, PriceHistoryTracker};
use pulse_notifier::{
    DeliveryOutcome, EmbedPayload, NotifierConfig, NotifyResult, PrioritizedNotifier, WebhookSink,
};
use pulse_perf::{PerfConfig, SignalPerformanceTracker};
use pulse_state::{MarketStateStore, StateConfig};
use pulse_storage::{spawn_writer, Storage};
use pulse_ws::{LocalBookStore, SubscriptionRegistry, WsEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

struct RecordingSink {
    sent: AtomicU64,
}

#[async_trait]
impl WebhookSink for RecordingSink {
    async fn deliver(&self, _payload: &EmbedPayload) -> NotifyResult<()> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
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

/// Frames in, one imbalance alert out, rows persisted, performance
/// tracked.
#[tokio::test]
async fn test_imbalance_flows_to_notifier_and_storage() {
    let registry = Arc::new(SubscriptionRegistry::new(500));
    registry.set_desired(&[("tok-yes".to_string(), "mkt-1".to_string(), 0)]);

    let storage = Arc::new(Storage::open_in_memory().unwrap());
    let (writer, writer_join) = spawn_writer(storage.clone(), 1024);

    let perf = Arc::new(SignalPerformanceTracker::new(&PerfConfig::default()));
    let bus = Arc::new(SignalBus::new(256));
    let sink = SignalSink {
        bus: bus.clone(),
        writer: Some(writer.clone()),
        perf: perf.clone(),
    };

    let (reseed_tx, _reseed_rx) = mpsc::channel(16);
    let dispatcher = Dispatcher::new(
        registry,
        Arc::new(Mutex::new(LocalBookStore::new())),
        Arc::new(MarketStateStore::new(StateConfig::default())),
        DetectorEngine::new(DetectorConfig::default()).unwrap(),
        Arc::new(PriceHistoryTracker::new(HistoryConfig::default())),
        sink,
        reseed_tx,
        Arc::new(Mutex::new(HashMap::new())),
        60,
        1,
    );

    let (batch_tx, batch_rx) = mpsc::channel(64);
    let run = tokio::spawn(async move { dispatcher.run(batch_rx).await });

    // 50 balanced books, then one heavy-bid book.
    for _ in 0..50 {
        batch_tx
            .send(vec![("book", vec![book_event("tok-yes", 500.0, 500.0)])])
            .await
            .unwrap();
    }
    batch_tx
        .send(vec![("book", vec![book_event("tok-yes", 1000.0, 200.0)])])
        .await
        .unwrap();
    drop(batch_tx);
    run.await.unwrap();

    // The notifier delivers it.
    let webhook = Arc::new(RecordingSink {
        sent: AtomicU64::new(0),
    });
    let notifier = PrioritizedNotifier::with_sink(
        &NotifierConfig::default(),
        perf.posteriors(),
        Some(webhook.clone()),
    );

    bus.close();
    let mut delivered = 0;
    let mut imbalance_seen = 0;
    while let Some(signal) = bus.next().await {
        if signal.signal_type == SignalType::OrderbookImbalance {
            imbalance_seen += 1;
        }
        if matches!(
            notifier.handle(&signal).await,
            DeliveryOutcome::Delivered(_)
        ) {
            delivered += 1;
        }
    }
    assert_eq!(imbalance_seen, 1);
    assert!(delivered >= 1);
    assert_eq!(webhook.sent.load(Ordering::SeqCst) as i32, delivered);

    // Performance tracking opened a record per emitted signal.
    assert!(perf.open_records() >= 1);

    // Storage captured the signal row.
    drop(writer);
    writer_join.await.unwrap();
    let rows = storage
        .query("SELECT signal_type FROM signals WHERE signal_type = 'orderbook_imbalance'")
        .unwrap();
    assert_eq!(rows.len(), 1);
}

/// A blacklisted question never reaches the subscription registry, so
/// its frames are dropped on arrival.
#[tokio::test]
async fn test_blacklisted_market_never_subscribed_or_processed() {
    let mut catalog = MarketCatalog::new(DiscoveryConfig::default());
    let raw: pulse_rest::RawMarket = serde_json::from_value(serde_json::json!({
        "conditionId": "0xbtc",
        "question": "Will BTC hit $100k by December?",
        "outcomes": ["Yes", "No"],
        "outcomePrices": ["0.5", "0.5"],
        "volumeNum": 2_000_000.0,
        "active": true,
        "closed": false,
        "clobTokenIds": ["btc-yes", "btc-no"]
    }))
    .unwrap();
    catalog.apply(vec![raw], chrono::Utc::now());

    // Tier is IGNORED and no subscription targets exist.
    assert_eq!(
        catalog.get("0xbtc").unwrap().tier,
        pulse_core::MarketTier::Ignored
    );
    let targets = catalog.subscription_targets();
    assert!(targets.is_empty());

    // Frames keyed by its asset ids bounce off the registry.
    let registry = Arc::new(SubscriptionRegistry::new(500));
    registry.set_desired(&targets);
    assert!(registry.resolve("btc-yes").is_none());
    assert_eq!(registry.take_unknown_count(), 1);
}
