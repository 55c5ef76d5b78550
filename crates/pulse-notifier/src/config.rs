//! Notifier configuration.

use serde::{Deserialize, Serialize};

/// Alert delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Webhook URL; absence disables delivery entirely.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Global alerts per 60s window.
    #[serde(default = "default_discord_rate_limit")]
    pub discord_rate_limit: u32,
    /// Per-market alert cooldown.
    #[serde(default = "default_per_market_cooldown_ms")]
    pub per_market_cooldown_ms: u64,
    /// Dedup window for (market, signal type) pairs.
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,
    /// Posterior samples required before it reweights scores.
    #[serde(default = "default_min_posterior_samples")]
    pub min_posterior_samples: u64,
    /// Webhook request timeout.
    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,
}

fn default_discord_rate_limit() -> u32 {
    10
}

fn default_per_market_cooldown_ms() -> u64 {
    60_000
}

fn default_dedup_window_ms() -> u64 {
    60_000
}

fn default_min_posterior_samples() -> u64 {
    10
}

fn default_webhook_timeout_secs() -> u64 {
    5
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            discord_rate_limit: default_discord_rate_limit(),
            per_market_cooldown_ms: default_per_market_cooldown_ms(),
            dedup_window_ms: default_dedup_window_ms(),
            min_posterior_samples: default_min_posterior_samples(),
            webhook_timeout_secs: default_webhook_timeout_secs(),
        }
    }
}
