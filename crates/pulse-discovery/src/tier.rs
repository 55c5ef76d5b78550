//! Tier assignment and opportunity scoring.

use crate::config::DiscoveryConfig;
use chrono::{DateTime, Utc};
use pulse_core::{Market, MarketTier, OpportunityScore, TierDecision};

/// Opportunity-score weights (sum to 1).
const W_VOLUME: f64 = 0.35;
const W_EDGE: f64 = 0.25;
const W_CATALYST: f64 = 0.20;
const W_QUALITY: f64 = 0.20;

/// Assigns monitoring tiers from category, volume, and activity.
pub struct TierAssigner {
    config: DiscoveryConfig,
}

impl TierAssigner {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Assign a tier and opportunity score; mutates the market in place.
    pub fn assign(&self, market: &mut Market, now: DateTime<Utc>) -> TierDecision {
        let opportunity = self.score(market, now);
        market.opportunity = opportunity;

        let decision = self.decide(market, now);
        market.tier = decision.tier;
        decision
    }

    fn decide(&self, market: &Market, now: DateTime<Utc>) -> TierDecision {
        let decided_at = now;
        if market.is_blacklisted {
            return TierDecision {
                tier: MarketTier::Ignored,
                reason: "blacklisted question".to_string(),
                priority: 100,
                decided_at,
            };
        }
        if market.closed || !market.active {
            return TierDecision {
                tier: MarketTier::Ignored,
                reason: "market not active".to_string(),
                priority: 100,
                decided_at,
            };
        }
        let Some(category) = market.category else {
            return TierDecision {
                tier: MarketTier::Ignored,
                reason: "no category match".to_string(),
                priority: 90,
                decided_at,
            };
        };

        let floor = self.config.floor_for(category);
        if market.volume >= floor {
            return TierDecision {
                tier: MarketTier::Active,
                reason: format!("{category} volume {:.0} >= floor {floor:.0}", market.volume),
                priority: 10,
                decided_at,
            };
        }

        // WATCHLIST: looser volume with a recent-activity indicator.
        let watch_floor = floor * self.config.watchlist_volume_fraction;
        let closes_soon = market
            .time_to_close(now)
            .is_some_and(|d| d.num_days() <= self.config.watchlist_max_days_to_close && d.num_seconds() > 0);
        let recent_volume = market
            .volume_24hr
            .is_some_and(|v| v >= self.config.watchlist_min_volume_24hr);
        if market.volume >= watch_floor && (closes_soon || recent_volume) {
            return TierDecision {
                tier: MarketTier::Watchlist,
                reason: format!(
                    "{category} volume {:.0} >= watch floor {watch_floor:.0}, {}",
                    market.volume,
                    if closes_soon { "closes soon" } else { "recent volume" }
                ),
                priority: 30,
                decided_at,
            };
        }

        TierDecision {
            tier: MarketTier::Ignored,
            reason: format!("{category} volume {:.0} below floor {floor:.0}", market.volume),
            priority: 80,
            decided_at,
        }
    }

    fn score(&self, market: &Market, now: DateTime<Utc>) -> OpportunityScore {
        // log-scaled volume: $1M lands near 100.
        let volume = (100.0 * (1.0 + market.volume).log10() / 6.0).clamp(0.0, 100.0);

        // Price-sum deviation from 1 is tradeable edge.
        let edge = (market.price_sum_deviation() * 2_000.0).clamp(0.0, 100.0);

        // Catalyst proximity: inside a week scores full, fading to zero
        // at ninety days; unknown end dates sit in the middle-low range.
        let catalyst = match market.time_to_close(now) {
            Some(d) if d.num_seconds() <= 0 => 0.0,
            Some(d) => {
                let days = d.num_seconds() as f64 / 86_400.0;
                if days <= 7.0 {
                    100.0
                } else {
                    (100.0 * (90.0 - days) / 83.0).clamp(0.0, 100.0)
                }
            }
            None => 30.0,
        };

        let mut quality = 0.0;
        if market.is_subscribable() {
            quality += 60.0;
        }
        if market.active {
            quality += 20.0;
        }
        // Degenerate prices (pinned near 0/1) leave no room to move.
        let max_price = market
            .outcome_prices
            .iter()
            .fold(0.0_f64, |acc, p| acc.max(*p));
        if (0.05..=0.95).contains(&max_price) {
            quality += 20.0;
        }

        OpportunityScore {
            total: (W_VOLUME * volume + W_EDGE * edge + W_CATALYST * catalyst + W_QUALITY * quality)
                .clamp(0.0, 100.0),
            volume,
            edge,
            catalyst,
            quality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pulse_core::Category;

    fn market(category: Option<Category>, volume: f64) -> Market {
        Market {
            id: "m1".to_string(),
            question: "q".to_string(),
            outcomes: vec!["Yes".to_string(), "No".to_string()],
            outcome_prices: vec![0.6, 0.4],
            volume,
            volume_24hr: None,
            active: true,
            closed: false,
            end_date: None,
            created_at: None,
            asset_ids: vec!["a".to_string(), "b".to_string()],
            category,
            category_score: 1.5,
            is_blacklisted: false,
            tier: MarketTier::Ignored,
            opportunity: OpportunityScore::default(),
            refreshed_at: Utc::now(),
        }
    }

    fn assigner() -> TierAssigner {
        TierAssigner::new(DiscoveryConfig::default())
    }

    #[test]
    fn test_active_above_category_floor() {
        let mut m = market(Some(Category::Earnings), 2_500.0);
        let d = assigner().assign(&mut m, Utc::now());
        assert_eq!(d.tier, MarketTier::Active);
        assert_eq!(m.tier, MarketTier::Active);
    }

    #[test]
    fn test_politics_floor_is_higher() {
        let mut m = market(Some(Category::Politics), 2_500.0);
        let d = assigner().assign(&mut m, Utc::now());
        assert_ne!(d.tier, MarketTier::Active);
    }

    #[test]
    fn test_watchlist_needs_activity_indicator() {
        // Above the watch floor but with no activity signal: ignored.
        let mut m = market(Some(Category::Politics), 5_000.0);
        let d = assigner().assign(&mut m, Utc::now());
        assert_eq!(d.tier, MarketTier::Ignored);

        // Same volume, closing within two weeks: watchlist.
        let mut m = market(Some(Category::Politics), 5_000.0);
        m.end_date = Some(Utc::now() + Duration::days(10));
        let d = assigner().assign(&mut m, Utc::now());
        assert_eq!(d.tier, MarketTier::Watchlist);

        // Or with recent 24h volume: watchlist.
        let mut m = market(Some(Category::Politics), 5_000.0);
        m.volume_24hr = Some(800.0);
        let d = assigner().assign(&mut m, Utc::now());
        assert_eq!(d.tier, MarketTier::Watchlist);
    }

    #[test]
    fn test_uncategorized_ignored() {
        let mut m = market(None, 1_000_000.0);
        let d = assigner().assign(&mut m, Utc::now());
        assert_eq!(d.tier, MarketTier::Ignored);
        assert!(d.reason.contains("category"));
    }

    #[test]
    fn test_blacklisted_ignored() {
        let mut m = market(Some(Category::Fed), 1_000_000.0);
        m.is_blacklisted = true;
        let d = assigner().assign(&mut m, Utc::now());
        assert_eq!(d.tier, MarketTier::Ignored);
    }

    #[test]
    fn test_opportunity_score_bounds() {
        let mut m = market(Some(Category::Fed), 1_000_000.0);
        m.end_date = Some(Utc::now() + Duration::days(3));
        assigner().assign(&mut m, Utc::now());
        assert!(m.opportunity.total > 0.0);
        assert!(m.opportunity.total <= 100.0);
        assert_eq!(m.opportunity.catalyst, 100.0);
        assert!(m.opportunity.quality >= 80.0);
    }

    #[test]
    fn test_unsubscribable_market_scores_lower_quality() {
        let mut with = market(Some(Category::Fed), 10_000.0);
        let mut without = market(Some(Category::Fed), 10_000.0);
        without.asset_ids.clear();
        let a = assigner();
        a.assign(&mut with, Utc::now());
        a.assign(&mut without, Utc::now());
        assert!(with.opportunity.quality > without.opportunity.quality);
    }
}
