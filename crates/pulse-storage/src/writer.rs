//! The background writer task.
//!
//! The hot path enqueues operations without blocking; a dedicated
//! blocking task drains the queue. Overflow drops the operation and
//! counts it, per the resource-error policy.

use crate::store::{Storage, SystemAlertRow};
use pulse_core::{EarlySignal, Market, OrderbookSnapshot, TradeTick};
use pulse_perf::SignalPerformanceRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// One queued write.
#[derive(Debug)]
pub enum StorageOp {
    UpsertMarket(Box<Market>),
    AppendPrice {
        market_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
        outcome_index: usize,
        price: f64,
        volume: f64,
    },
    AppendOrderbook(Box<OrderbookSnapshot>),
    AppendTrade(TradeTick),
    InsertSignal(Box<EarlySignal>),
    UpdatePerformance(Box<SignalPerformanceRecord>),
    InsertAlert(SystemAlertRow),
}

/// Non-blocking enqueue handle for the hot path.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<StorageOp>,
    dropped: Arc<AtomicU64>,
}

impl WriterHandle {
    /// Best-effort enqueue: a full queue drops the op and counts it.
    pub fn enqueue(&self, op: StorageOp) {
        if self.tx.try_send(op).is_err() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped % 1000 == 1 {
                warn!(dropped, "Storage queue full; dropping writes");
            }
        }
    }

    /// Total writes dropped due to backpressure.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Spawn the writer task; dropping the returned handle (all clones)
/// closes the queue and lets the task exit after a final drain.
pub fn spawn_writer(
    storage: Arc<Storage>,
    queue_capacity: usize,
) -> (WriterHandle, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<StorageOp>(queue_capacity.max(1));
    let handle = WriterHandle {
        tx,
        dropped: Arc::new(AtomicU64::new(0)),
    };

    let join = tokio::task::spawn_blocking(move || {
        info!("Storage writer running");
        while let Some(op) = rx.blocking_recv() {
            let result = match op {
                StorageOp::UpsertMarket(m) => storage.upsert_market(&m),
                StorageOp::AppendPrice {
                    market_id,
                    timestamp,
                    outcome_index,
                    price,
                    volume,
                } => storage.append_price(&market_id, timestamp, outcome_index, price, volume),
                StorageOp::AppendOrderbook(s) => storage.append_orderbook_snapshot(&s),
                StorageOp::AppendTrade(t) => storage.append_trade_tick(&t),
                StorageOp::InsertSignal(s) => storage.insert_signal(&s),
                StorageOp::UpdatePerformance(r) => storage.update_signal_performance(&r),
                StorageOp::InsertAlert(a) => storage.insert_system_alert(&a),
            };
            if let Err(e) = result {
                // Storage being down must not take the pipeline with it.
                error!(error = %e, "Storage write failed");
            }
        }
        info!("Storage writer drained and stopped");
    });

    (handle, join)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::TradeSide;

    #[tokio::test]
    async fn test_writer_drains_queue() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let (handle, join) = spawn_writer(storage.clone(), 64);

        for i in 0..10 {
            handle.enqueue(StorageOp::AppendTrade(TradeTick {
                market_id: format!("m{}", i % 2),
                timestamp: chrono::Utc::now(),
                price: 0.5,
                size: 1.0,
                side: TradeSide::Buy,
            }));
        }
        drop(handle);
        join.await.unwrap();

        let rows = storage.query("SELECT COUNT(*) AS n FROM trade_ticks").unwrap();
        assert_eq!(rows[0]["n"], 10);
    }

    #[tokio::test]
    async fn test_overflow_drops_and_counts() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        // Capacity 1 with a task that never gets scheduled before the
        // burst: at least some ops must be dropped, none may block.
        let (handle, join) = spawn_writer(storage, 1);
        for _ in 0..50 {
            handle.enqueue(StorageOp::AppendTrade(TradeTick {
                market_id: "m".to_string(),
                timestamp: chrono::Utc::now(),
                price: 0.5,
                size: 1.0,
                side: TradeSide::Buy,
            }));
        }
        assert!(handle.dropped_count() > 0);
        drop(handle);
        join.await.unwrap();
    }
}
