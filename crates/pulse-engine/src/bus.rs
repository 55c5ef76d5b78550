//! The bounded signal bus.
//!
//! Detectors publish, the notifier consumes. Backpressure is explicit:
//! a full bus evicts the oldest low-confidence entry before accepting
//! a new one, and the eviction is counted. If nothing is evictable the
//! incoming signal itself is dropped.

use parking_lot::Mutex;
use pulse_core::EarlySignal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;
use tracing::warn;

/// Confidence below this counts as LOW for eviction purposes.
const LOW_CONFIDENCE: f64 = 0.55;

/// Bounded multi-producer single-consumer signal queue.
pub struct SignalBus {
    capacity: usize,
    queue: Mutex<VecDeque<EarlySignal>>,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl SignalBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Publish a signal; returns false when it (or a victim) was
    /// dropped to make room and nothing was enqueued.
    pub fn publish(&self, signal: EarlySignal) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let accepted = {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity {
                // Evict the oldest LOW entry.
                match queue.iter().position(|s| s.confidence < LOW_CONFIDENCE) {
                    Some(pos) => {
                        queue.remove(pos);
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        queue.push_back(signal);
                        true
                    }
                    None => {
                        // Everything queued outranks the newcomer only
                        // if the newcomer is itself low.
                        if signal.confidence < LOW_CONFIDENCE {
                            self.dropped.fetch_add(1, Ordering::Relaxed);
                            false
                        } else {
                            queue.pop_front();
                            self.dropped.fetch_add(1, Ordering::Relaxed);
                            queue.push_back(signal);
                            true
                        }
                    }
                }
            } else {
                queue.push_back(signal);
                true
            }
        };
        if accepted {
            self.notify.notify_one();
        } else {
            warn!("Signal bus full; low-priority signal dropped");
        }
        accepted
    }

    /// Await the next signal; None once closed and drained.
    pub async fn next(&self) -> Option<EarlySignal> {
        loop {
            if let Some(signal) = self.queue.lock().pop_front() {
                return Some(signal);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Close the bus; consumers drain what remains and stop.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Signals dropped under backpressure.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::{Direction, SignalMetadata, SignalType};

    fn signal(confidence: f64) -> EarlySignal {
        EarlySignal::new(
            "m1",
            SignalType::SpreadAnomaly,
            confidence,
            Direction::Neutral,
            SignalMetadata::SpreadAnomaly {
                spread: 0.05,
                baseline_spread: 0.02,
                multiple: 2.5,
            },
        )
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let bus = SignalBus::new(10);
        bus.publish(signal(0.9));
        bus.publish(signal(0.8));
        assert_eq!(bus.next().await.unwrap().confidence, 0.9);
        assert_eq!(bus.next().await.unwrap().confidence, 0.8);
    }

    #[tokio::test]
    async fn test_overflow_evicts_oldest_low() {
        let bus = SignalBus::new(3);
        bus.publish(signal(0.4)); // low, oldest
        bus.publish(signal(0.9));
        bus.publish(signal(0.5)); // low
        assert!(bus.publish(signal(0.95)));
        assert_eq!(bus.dropped_count(), 1);

        // The 0.4 entry is gone.
        let first = bus.next().await.unwrap();
        assert_eq!(first.confidence, 0.9);
    }

    #[tokio::test]
    async fn test_full_of_high_drops_incoming_low() {
        let bus = SignalBus::new(2);
        bus.publish(signal(0.9));
        bus.publish(signal(0.95));
        assert!(!bus.publish(signal(0.3)));
        assert_eq!(bus.len(), 2);
        assert_eq!(bus.dropped_count(), 1);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let bus = SignalBus::new(10);
        bus.publish(signal(0.9));
        bus.close();
        assert!(bus.next().await.is_some());
        assert!(bus.next().await.is_none());
        // Publishing after close is refused.
        assert!(!bus.publish(signal(0.9)));
    }
}
