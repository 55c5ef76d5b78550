//! Market entity, category enum, and tier assignment types.

use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monitoring tier assigned to each market on every discovery refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketTier {
    /// Fully monitored: subscribed, all detectors active.
    Active,
    /// Lightly monitored: subscribed, promoted on activity.
    Watchlist,
    /// Not monitored this cycle.
    Ignored,
}

impl MarketTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Watchlist => "WATCHLIST",
            Self::Ignored => "IGNORED",
        }
    }

    /// Whether markets in this tier get a WebSocket subscription.
    pub fn is_subscribed(&self) -> bool {
        matches!(self, Self::Active | Self::Watchlist)
    }
}

impl std::fmt::Display for MarketTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event category assigned by the keyword categorizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Politics,
    Fed,
    Earnings,
    CeoChanges,
    Mergers,
    SportsAwards,
    CourtCases,
    HollywoodAwards,
    EconomicData,
    WorldEvents,
    Macro,
    CryptoEvents,
    Pardons,
}

impl Category {
    /// All categories, in scoring order.
    pub const ALL: [Category; 13] = [
        Self::Politics,
        Self::Fed,
        Self::Earnings,
        Self::CeoChanges,
        Self::Mergers,
        Self::SportsAwards,
        Self::CourtCases,
        Self::HollywoodAwards,
        Self::EconomicData,
        Self::WorldEvents,
        Self::Macro,
        Self::CryptoEvents,
        Self::Pardons,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Politics => "politics",
            Self::Fed => "fed",
            Self::Earnings => "earnings",
            Self::CeoChanges => "ceo_changes",
            Self::Mergers => "mergers",
            Self::SportsAwards => "sports_awards",
            Self::CourtCases => "court_cases",
            Self::HollywoodAwards => "hollywood_awards",
            Self::EconomicData => "economic_data",
            Self::WorldEvents => "world_events",
            Self::Macro => "macro",
            Self::CryptoEvents => "crypto_events",
            Self::Pardons => "pardons",
        }
    }

    /// Parse from the persisted string form.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == s)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weighted opportunity sub-scores, each normalized to [0, 100].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OpportunityScore {
    /// Weighted total in [0, 100].
    pub total: f64,
    /// Volume relative to the tracked universe.
    pub volume: f64,
    /// Price-sum deviation and spread tightness edge.
    pub edge: f64,
    /// Proximity to the market's end date.
    pub catalyst: f64,
    /// Subscribability and book quality.
    pub quality: f64,
}

/// Outcome of a tier assignment, kept for persistence and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierDecision {
    pub tier: MarketTier,
    /// Human-readable reason ("volume below politics floor", etc).
    pub reason: String,
    /// Lower is more urgent when trimming to `max_markets_to_track`.
    pub priority: u32,
    pub decided_at: DateTime<Utc>,
}

/// A tracked prediction market.
///
/// Created on first discovery, mutated on every REST refresh. The tier is
/// recomputed each refresh; closed markets are garbage-collected after the
/// retention window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    /// Stable condition identifier (opaque).
    pub id: String,
    pub question: String,
    /// Ordered outcome names, length >= 2.
    pub outcomes: Vec<String>,
    /// Parallel to `outcomes`, each in [0, 1].
    pub outcome_prices: Vec<f64>,
    /// Lifetime volume in venue units, >= 0.
    pub volume: f64,
    /// Trailing 24h volume when the venue reports it.
    pub volume_24hr: Option<f64>,
    pub active: bool,
    pub closed: bool,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    /// Per-outcome token ids used as subscription keys.
    /// Empty means the market cannot be subscribed.
    pub asset_ids: Vec<String>,
    pub category: Option<Category>,
    pub category_score: f64,
    pub is_blacklisted: bool,
    pub tier: MarketTier,
    pub opportunity: OpportunityScore,
    /// Last time the discovery loop refreshed this market.
    pub refreshed_at: DateTime<Utc>,
}

impl Market {
    /// Validate the normalization invariants.
    ///
    /// - `outcome_prices` is parallel to `outcomes`
    /// - `asset_ids` is empty or parallel to `outcomes`
    /// - `closed` implies not `active`
    pub fn validate(&self) -> Result<()> {
        if self.outcomes.len() < 2 {
            return Err(CoreError::InvalidMarket(format!(
                "market {} has {} outcomes",
                self.id,
                self.outcomes.len()
            )));
        }
        if self.outcome_prices.len() != self.outcomes.len() {
            return Err(CoreError::InvalidMarket(format!(
                "market {}: {} prices for {} outcomes",
                self.id,
                self.outcome_prices.len(),
                self.outcomes.len()
            )));
        }
        if !self.asset_ids.is_empty() && self.asset_ids.len() != self.outcomes.len() {
            return Err(CoreError::InvalidMarket(format!(
                "market {}: {} asset ids for {} outcomes",
                self.id,
                self.asset_ids.len(),
                self.outcomes.len()
            )));
        }
        if self.closed && self.active {
            return Err(CoreError::InvalidMarket(format!(
                "market {} is closed but active",
                self.id
            )));
        }
        Ok(())
    }

    /// Deviation of the outcome-price sum from 1.0.
    ///
    /// Healthy binary markets sum to ~1; the deviation itself is a
    /// detector input, not an error.
    pub fn price_sum_deviation(&self) -> f64 {
        (self.outcome_prices.iter().sum::<f64>() - 1.0).abs()
    }

    /// Whether the market has the asset ids needed for subscription.
    pub fn is_subscribable(&self) -> bool {
        !self.asset_ids.is_empty()
    }

    /// Age since creation, if the venue reported `created_at`.
    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.created_at.map(|c| now - c)
    }

    /// Time remaining until the market closes, if known.
    pub fn time_to_close(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.end_date.map(|e| e - now)
    }
}
