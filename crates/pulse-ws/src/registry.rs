//! Subscription registry: the assetId <-> marketId resolution map.
//!
//! Frames are keyed by asset id, so this map is the authoritative
//! routing table. One mutex guards both directions. The registry also
//! owns the per-socket subscription cap, discovered at runtime by
//! shrinking on venue rejections.

use parking_lot::Mutex;
use pulse_core::{AssetId, MarketId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Subscription lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Pending,
    Active,
    Failed,
}

#[derive(Debug, Clone)]
struct Subscription {
    market_id: MarketId,
    outcome_index: usize,
    state: SubscriptionState,
}

/// Result of diffing the desired set against the current one.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionDiff {
    pub added: Vec<AssetId>,
    pub removed: Vec<AssetId>,
}

impl SubscriptionDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Default)]
struct Inner {
    /// asset -> (market, outcome index, state)
    subscriptions: HashMap<AssetId, Subscription>,
}

/// The registry. Shared across the connection and the dispatcher.
pub struct SubscriptionRegistry {
    inner: Mutex<Inner>,
    /// Per-socket subscription chunk size; halved on rejection.
    chunk_size: AtomicU64,
    /// Discovered hard cap, once a rejection has taught us one.
    discovered_cap: AtomicU64,
    /// Frames dropped because the asset was unknown.
    unknown_assets: AtomicU64,
}

impl SubscriptionRegistry {
    /// `cap_hint` seeds the chunk size until the venue teaches us better.
    pub fn new(cap_hint: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            chunk_size: AtomicU64::new(cap_hint.max(1) as u64),
            discovered_cap: AtomicU64::new(0),
            unknown_assets: AtomicU64::new(0),
        }
    }

    /// Replace the desired asset set, returning what changed.
    ///
    /// New assets enter `Pending`; removed assets are dropped outright.
    pub fn set_desired(&self, targets: &[(AssetId, MarketId, usize)]) -> SubscriptionDiff {
        let mut inner = self.inner.lock();
        let mut diff = SubscriptionDiff::default();

        let desired: HashMap<&str, (&str, usize)> = targets
            .iter()
            .map(|(a, m, i)| (a.as_str(), (m.as_str(), *i)))
            .collect();

        inner.subscriptions.retain(|asset, _| {
            let keep = desired.contains_key(asset.as_str());
            if !keep {
                diff.removed.push(asset.clone());
            }
            keep
        });

        for (asset, (market, outcome_index)) in desired {
            if !inner.subscriptions.contains_key(asset) {
                inner.subscriptions.insert(
                    asset.to_string(),
                    Subscription {
                        market_id: market.to_string(),
                        outcome_index,
                        state: SubscriptionState::Pending,
                    },
                );
                diff.added.push(asset.to_string());
            }
        }

        if !diff.is_empty() {
            info!(
                added = diff.added.len(),
                removed = diff.removed.len(),
                total = inner.subscriptions.len(),
                "Subscription set changed"
            );
        }
        diff
    }

    /// Resolve an inbound frame's asset id; unknown assets are counted.
    pub fn resolve(&self, asset_id: &str) -> Option<(MarketId, usize)> {
        let inner = self.inner.lock();
        match inner.subscriptions.get(asset_id) {
            Some(sub) => Some((sub.market_id.clone(), sub.outcome_index)),
            None => {
                drop(inner);
                self.unknown_assets.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// All asset ids in the desired set, for (re)subscription.
    pub fn desired_assets(&self) -> Vec<AssetId> {
        self.inner.lock().subscriptions.keys().cloned().collect()
    }

    /// Assets still awaiting an ack.
    pub fn pending_assets(&self) -> Vec<AssetId> {
        self.inner
            .lock()
            .subscriptions
            .iter()
            .filter(|(_, s)| s.state == SubscriptionState::Pending)
            .map(|(a, _)| a.clone())
            .collect()
    }

    /// Mark a chunk of assets as active after a successful publish.
    pub fn mark_active(&self, assets: &[AssetId]) {
        let mut inner = self.inner.lock();
        for asset in assets {
            if let Some(sub) = inner.subscriptions.get_mut(asset) {
                sub.state = SubscriptionState::Active;
            }
        }
    }

    /// Mark a chunk failed (rejected batch).
    pub fn mark_failed(&self, assets: &[AssetId]) {
        let mut inner = self.inner.lock();
        for asset in assets {
            if let Some(sub) = inner.subscriptions.get_mut(asset) {
                sub.state = SubscriptionState::Failed;
            }
        }
    }

    /// Reset every subscription to pending (on reconnect).
    pub fn reset_to_pending(&self) {
        let mut inner = self.inner.lock();
        for sub in inner.subscriptions.values_mut() {
            sub.state = SubscriptionState::Pending;
        }
        debug!(total = inner.subscriptions.len(), "Subscriptions reset to pending");
    }

    pub fn state_of(&self, asset_id: &str) -> Option<SubscriptionState> {
        self.inner
            .lock()
            .subscriptions
            .get(asset_id)
            .map(|s| s.state)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().subscriptions.is_empty()
    }

    /// Current chunk size for subscribe batches.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.load(Ordering::Relaxed) as usize
    }

    /// The venue rejected a batch of `attempted` assets: halve the
    /// chunk size and remember the discovered cap.
    pub fn record_rejection(&self, attempted: usize) {
        let current = self.chunk_size.load(Ordering::Relaxed);
        let next = (current / 2).max(1);
        self.chunk_size.store(next, Ordering::Relaxed);
        self.discovered_cap.store(next, Ordering::Relaxed);
        warn!(
            attempted,
            new_chunk = next,
            "Subscribe batch rejected; shrinking chunk size"
        );
    }

    /// Cap learned from rejections, if any.
    pub fn discovered_cap(&self) -> Option<usize> {
        match self.discovered_cap.load(Ordering::Relaxed) {
            0 => None,
            v => Some(v as usize),
        }
    }

    /// Unknown-asset frame count since last read-and-reset.
    pub fn take_unknown_count(&self) -> u64 {
        self.unknown_assets.swap(0, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(ids: &[&str]) -> Vec<(AssetId, MarketId, usize)> {
        ids.iter()
            .enumerate()
            .map(|(i, a)| (a.to_string(), format!("m-{a}"), i % 2))
            .collect()
    }

    #[test]
    fn test_diff_add_remove() {
        let reg = SubscriptionRegistry::new(500);
        let diff = reg.set_desired(&targets(&["a", "b", "c"]));
        assert_eq!(diff.added.len(), 3);
        assert!(diff.removed.is_empty());

        let diff = reg.set_desired(&targets(&["b", "c", "d"]));
        assert_eq!(diff.added, vec!["d".to_string()]);
        assert_eq!(diff.removed, vec!["a".to_string()]);
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn test_no_duplicate_subscriptions() {
        let reg = SubscriptionRegistry::new(500);
        reg.set_desired(&targets(&["a", "b"]));
        let diff = reg.set_desired(&targets(&["a", "b"]));
        assert!(diff.is_empty());
    }

    #[test]
    fn test_resolution_and_unknown_counter() {
        let reg = SubscriptionRegistry::new(500);
        reg.set_desired(&[("tok".to_string(), "mkt".to_string(), 1)]);
        assert_eq!(reg.resolve("tok"), Some(("mkt".to_string(), 1)));
        assert_eq!(reg.resolve("ghost"), None);
        assert_eq!(reg.resolve("ghost"), None);
        assert_eq!(reg.take_unknown_count(), 2);
        assert_eq!(reg.take_unknown_count(), 0);
    }

    #[test]
    fn test_state_machine() {
        let reg = SubscriptionRegistry::new(500);
        reg.set_desired(&targets(&["a"]));
        assert_eq!(reg.state_of("a"), Some(SubscriptionState::Pending));

        reg.mark_active(&["a".to_string()]);
        assert_eq!(reg.state_of("a"), Some(SubscriptionState::Active));

        reg.reset_to_pending();
        assert_eq!(reg.state_of("a"), Some(SubscriptionState::Pending));

        reg.mark_failed(&["a".to_string()]);
        assert_eq!(reg.state_of("a"), Some(SubscriptionState::Failed));
    }

    #[test]
    fn test_cap_discovery() {
        let reg = SubscriptionRegistry::new(1000);
        assert_eq!(reg.chunk_size(), 1000);
        assert_eq!(reg.discovered_cap(), None);

        reg.record_rejection(1000);
        assert_eq!(reg.chunk_size(), 500);
        assert_eq!(reg.discovered_cap(), Some(500));

        reg.record_rejection(500);
        assert_eq!(reg.chunk_size(), 250);
    }
}
