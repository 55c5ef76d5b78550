//! Market catalog: the output of each discovery cycle.

use crate::categorizer::categorize;
use crate::config::DiscoveryConfig;
use crate::error::DiscoveryResult;
use crate::tier::TierAssigner;
use chrono::{DateTime, Duration, Utc};
use pulse_core::{Market, MarketTier};
use pulse_rest::{RawMarket, VenueRestClient};
use std::collections::HashMap;
use tracing::{debug, info};

/// Summary of one catalog refresh.
#[derive(Debug, Default, Clone)]
pub struct CatalogDiff {
    pub discovered: usize,
    pub added: usize,
    pub updated: usize,
    pub gc_removed: usize,
    pub active: usize,
    pub watchlist: usize,
    pub ignored: usize,
}

/// The current market universe, refreshed each cycle.
///
/// A REST failure leaves the previous set untouched; the caller keeps
/// routing against stale tiers until the next successful refresh.
pub struct MarketCatalog {
    config: DiscoveryConfig,
    assigner: TierAssigner,
    markets: HashMap<String, Market>,
    last_refresh: Option<DateTime<Utc>>,
}

impl MarketCatalog {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            assigner: TierAssigner::new(config.clone()),
            config,
            markets: HashMap::new(),
            last_refresh: None,
        }
    }

    /// Run one refresh cycle against the venue.
    pub async fn refresh(&mut self, client: &VenueRestClient) -> DiscoveryResult<CatalogDiff> {
        let raw = client.list_event_markets().await?;
        Ok(self.apply(raw, Utc::now()))
    }

    /// Normalize, categorize, tier, merge, and GC. Pure given inputs.
    pub fn apply(&mut self, raw: Vec<RawMarket>, now: DateTime<Utc>) -> CatalogDiff {
        let mut diff = CatalogDiff::default();

        // Deduplicate by market id; events can repeat markets.
        let mut seen: HashMap<String, Market> = HashMap::new();
        for r in raw {
            let Some(mut market) = r.normalize(now) else {
                continue;
            };
            if market.volume < self.config.min_volume_threshold {
                continue;
            }

            let cat = categorize(&market.question);
            market.category = cat.category;
            market.category_score = cat.score;
            market.is_blacklisted = cat.blacklisted;
            self.assigner.assign(&mut market, now);

            seen.insert(market.id.clone(), market);
        }
        diff.discovered = seen.len();

        // Trim to the tracking cap by opportunity score, never trimming
        // ACTIVE markets before WATCHLIST ones.
        let mut ordered: Vec<Market> = seen.into_values().collect();
        ordered.sort_by(|a, b| {
            (b.tier == MarketTier::Active)
                .cmp(&(a.tier == MarketTier::Active))
                .then(
                    b.opportunity
                        .total
                        .partial_cmp(&a.opportunity.total)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });
        for market in ordered.iter_mut().skip(self.config.max_markets_to_track) {
            if market.tier.is_subscribed() {
                market.tier = MarketTier::Ignored;
            }
        }

        for market in ordered {
            match market.tier {
                MarketTier::Active => diff.active += 1,
                MarketTier::Watchlist => diff.watchlist += 1,
                MarketTier::Ignored => diff.ignored += 1,
            }
            match self.markets.insert(market.id.clone(), market) {
                Some(_) => diff.updated += 1,
                None => diff.added += 1,
            }
        }

        diff.gc_removed = self.gc(now);
        self.last_refresh = Some(now);

        info!(
            discovered = diff.discovered,
            active = diff.active,
            watchlist = diff.watchlist,
            ignored = diff.ignored,
            gc_removed = diff.gc_removed,
            "Catalog refreshed"
        );
        diff
    }

    /// Drop closed markets older than the retention window.
    fn gc(&mut self, now: DateTime<Utc>) -> usize {
        let retention = Duration::hours(self.config.gc_retention_hours as i64);
        let before = self.markets.len();
        self.markets
            .retain(|_, m| !(m.closed && now - m.refreshed_at > retention));
        let removed = before - self.markets.len();
        if removed > 0 {
            debug!(removed, "Garbage-collected closed markets");
        }
        removed
    }

    pub fn get(&self, market_id: &str) -> Option<&Market> {
        self.markets.get(market_id)
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.last_refresh
    }

    /// Open markets that were not part of the refresh at `cutoff` —
    /// they dropped out of the venue's active feed and need an
    /// individual re-fetch to observe closure or resolution.
    pub fn vanished(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        self.markets
            .values()
            .filter(|m| !m.closed && m.refreshed_at < cutoff)
            .map(|m| m.id.clone())
            .collect()
    }

    /// Markets in subscribed tiers (ACTIVE plus WATCHLIST).
    pub fn monitored(&self) -> impl Iterator<Item = &Market> {
        self.markets.values().filter(|m| m.tier.is_subscribed())
    }

    /// All markets.
    pub fn all(&self) -> impl Iterator<Item = &Market> {
        self.markets.values()
    }

    /// (asset_id, market_id, outcome_index) for every monitored market.
    pub fn subscription_targets(&self) -> Vec<(String, String, usize)> {
        self.monitored()
            .flat_map(|m| {
                m.asset_ids
                    .iter()
                    .enumerate()
                    .map(|(i, a)| (a.clone(), m.id.clone(), i))
            })
            .collect()
    }
}
