//! Local book maintenance for delta frames.
//!
//! The venue may push full snapshots or level deltas for the same
//! asset. Deltas are applied to the locally held book; a delta for an
//! unseeded asset, or one that leaves the book badly crossed, asks the
//! caller to reseed from a REST snapshot.

use crate::message::LevelChange;
use chrono::{DateTime, Utc};
use pulse_core::{OrderbookSnapshot, PriceLevel, TradeSide};
use std::collections::{BTreeMap, HashMap};

/// Price key with stable ordering for f64 prices in [0, 1].
///
/// Prices are quantized to a tenth of a basis point, comfortably below
/// any venue tick.
fn key(price: f64) -> i64 {
    (price * 1_000_000.0).round() as i64
}

/// Result of applying a delta.
#[derive(Debug, PartialEq, Eq)]
pub enum BookApplyOutcome {
    /// Book updated; a fresh snapshot is available.
    Applied,
    /// No local book for this asset; seed it from REST first.
    NeedsSnapshot,
    /// The applied delta produced a nonsense book; reseed from REST.
    Corrupt,
}

#[derive(Debug, Default)]
struct LocalBook {
    bids: BTreeMap<i64, f64>,
    asks: BTreeMap<i64, f64>,
    last_update: Option<DateTime<Utc>>,
}

impl LocalBook {
    fn replace(&mut self, bids: &[PriceLevel], asks: &[PriceLevel], ts: DateTime<Utc>) {
        self.bids = bids.iter().map(|l| (key(l.price), l.size)).collect();
        self.asks = asks.iter().map(|l| (key(l.price), l.size)).collect();
        self.last_update = Some(ts);
    }

    fn apply(&mut self, changes: &[LevelChange], ts: DateTime<Utc>) {
        for c in changes {
            let side = match c.side {
                TradeSide::Buy => &mut self.bids,
                TradeSide::Sell => &mut self.asks,
            };
            if c.size <= 0.0 {
                side.remove(&key(c.price));
            } else {
                side.insert(key(c.price), c.size);
            }
        }
        self.last_update = Some(ts);
    }

    /// Best bid must not exceed best ask by more than one quantum;
    /// transiently touching books are tolerated.
    fn is_sane(&self) -> bool {
        match (self.bids.keys().next_back(), self.asks.keys().next()) {
            (Some(&bid), Some(&ask)) => bid <= ask,
            _ => true,
        }
    }

    fn snapshot(&self, market_id: &str, asset_id: &str) -> OrderbookSnapshot {
        OrderbookSnapshot::new(
            market_id.to_string(),
            asset_id.to_string(),
            self.last_update.unwrap_or_else(Utc::now),
            self.bids
                .iter()
                .map(|(&k, &s)| PriceLevel::new(k as f64 / 1_000_000.0, s))
                .collect(),
            self.asks
                .iter()
                .map(|(&k, &s)| PriceLevel::new(k as f64 / 1_000_000.0, s))
                .collect(),
        )
    }
}

/// Books for every subscribed asset.
#[derive(Debug, Default)]
pub struct LocalBookStore {
    books: HashMap<String, LocalBook>,
}

impl LocalBookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace an asset's book from a full snapshot.
    pub fn seed(
        &mut self,
        asset_id: &str,
        bids: &[PriceLevel],
        asks: &[PriceLevel],
        ts: DateTime<Utc>,
    ) {
        self.books
            .entry(asset_id.to_string())
            .or_default()
            .replace(bids, asks, ts);
    }

    /// Apply a delta to an asset's book.
    pub fn apply_delta(
        &mut self,
        asset_id: &str,
        changes: &[LevelChange],
        ts: DateTime<Utc>,
    ) -> BookApplyOutcome {
        let Some(book) = self.books.get_mut(asset_id) else {
            return BookApplyOutcome::NeedsSnapshot;
        };
        if book.last_update.is_none() {
            return BookApplyOutcome::NeedsSnapshot;
        }
        book.apply(changes, ts);
        if !book.is_sane() {
            self.books.remove(asset_id);
            return BookApplyOutcome::Corrupt;
        }
        BookApplyOutcome::Applied
    }

    /// Current snapshot for an asset, labeled with its market id.
    pub fn snapshot(&self, asset_id: &str, market_id: &str) -> Option<OrderbookSnapshot> {
        let book = self.books.get(asset_id)?;
        book.last_update?;
        Some(book.snapshot(market_id, asset_id))
    }

    /// Drop books for assets no longer subscribed.
    pub fn retain(&mut self, keep: impl Fn(&str) -> bool) {
        self.books.retain(|id, _| keep(id));
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(pairs: &[(f64, f64)]) -> Vec<PriceLevel> {
        pairs.iter().map(|&(p, s)| PriceLevel::new(p, s)).collect()
    }

    #[test]
    fn test_delta_before_snapshot_needs_seed() {
        let mut store = LocalBookStore::new();
        let out = store.apply_delta(
            "a",
            &[LevelChange {
                price: 0.45,
                size: 10.0,
                side: TradeSide::Buy,
            }],
            Utc::now(),
        );
        assert_eq!(out, BookApplyOutcome::NeedsSnapshot);
    }

    #[test]
    fn test_seed_then_delta() {
        let mut store = LocalBookStore::new();
        store.seed(
            "a",
            &levels(&[(0.45, 100.0), (0.44, 50.0)]),
            &levels(&[(0.47, 80.0)]),
            Utc::now(),
        );
        let out = store.apply_delta(
            "a",
            &[
                // Remove the 0.45 bid, add a deeper ask.
                LevelChange {
                    price: 0.45,
                    size: 0.0,
                    side: TradeSide::Buy,
                },
                LevelChange {
                    price: 0.48,
                    size: 40.0,
                    side: TradeSide::Sell,
                },
            ],
            Utc::now(),
        );
        assert_eq!(out, BookApplyOutcome::Applied);
        let snap = store.snapshot("a", "m1").unwrap();
        assert_eq!(snap.best_bid().unwrap().price, 0.44);
        assert_eq!(snap.asks.len(), 2);
    }

    #[test]
    fn test_crossed_book_reports_corrupt() {
        let mut store = LocalBookStore::new();
        store.seed("a", &levels(&[(0.45, 100.0)]), &levels(&[(0.47, 80.0)]), Utc::now());
        let out = store.apply_delta(
            "a",
            &[LevelChange {
                price: 0.60,
                size: 10.0,
                side: TradeSide::Buy,
            }],
            Utc::now(),
        );
        assert_eq!(out, BookApplyOutcome::Corrupt);
        // The corrupt book is discarded so the next delta reseeds.
        assert_eq!(
            store.apply_delta("a", &[], Utc::now()),
            BookApplyOutcome::NeedsSnapshot
        );
    }

    #[test]
    fn test_snapshot_sorted_sides() {
        let mut store = LocalBookStore::new();
        store.seed(
            "a",
            &levels(&[(0.40, 1.0), (0.45, 2.0), (0.42, 3.0)]),
            &levels(&[(0.50, 1.0), (0.47, 2.0)]),
            Utc::now(),
        );
        let snap = store.snapshot("a", "m1").unwrap();
        assert_eq!(snap.best_bid().unwrap().price, 0.45);
        assert_eq!(snap.best_ask().unwrap().price, 0.47);
    }
}
