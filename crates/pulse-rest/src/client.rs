//! HTTP client for the venue's REST surface.

use crate::error::{RestError, RestResult};
use crate::models::{RawEvent, RawMarket, RawOrderbook, RawTrade};
use crate::rate_limit::RequestLimiter;
use chrono::{Duration as ChronoDuration, Utc};
use pulse_core::{OrderbookSnapshot, TradeTick};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// REST client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    /// Events/markets host (discovery).
    #[serde(default = "default_gamma_url")]
    pub gamma_url: String,
    /// Orderbook/trades host.
    #[serde(default = "default_clob_url")]
    pub clob_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Requests allowed per window per host.
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    /// Events page size.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Hard cap on events fetched per refresh cycle.
    #[serde(default = "default_max_events")]
    pub max_events: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}

fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    12
}

fn default_rate_limit_requests() -> u32 {
    100
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

fn default_page_size() -> usize {
    1000
}

fn default_max_events() -> usize {
    5000
}

fn default_max_retries() -> u32 {
    3
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            gamma_url: default_gamma_url(),
            clob_url: default_clob_url(),
            request_timeout_secs: default_request_timeout_secs(),
            rate_limit_requests: default_rate_limit_requests(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            page_size: default_page_size(),
            max_events: default_max_events(),
            max_retries: default_max_retries(),
        }
    }
}

/// Backoff cap between retries.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Client for the venue's REST endpoints.
pub struct VenueRestClient {
    http: reqwest::Client,
    config: RestConfig,
    limiter: RequestLimiter,
}

impl VenueRestClient {
    pub fn new(config: RestConfig) -> RestResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent("pulse/0.1")
            .build()
            .map_err(|e| RestError::Transport(e.to_string()))?;
        let limiter = RequestLimiter::new(config.rate_limit_requests, config.rate_limit_window_secs);
        Ok(Self {
            http,
            config,
            limiter,
        })
    }

    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    /// Page the events endpoint (active, open, by descending volume) up
    /// to the configured cap, flattening embedded markets.
    pub async fn list_event_markets(&self) -> RestResult<Vec<RawMarket>> {
        let mut markets = Vec::new();
        let mut offset = 0usize;

        while offset < self.config.max_events {
            let limit = self.config.page_size.min(self.config.max_events - offset);
            let url = format!(
                "{}/events?active=true&closed=false&order=volume&ascending=false&limit={}&offset={}",
                self.config.gamma_url, limit, offset
            );
            let events: Vec<RawEvent> = self.get_with_retry(&url).await?;
            let page_len = events.len();
            for event in events {
                markets.extend(event.markets);
            }
            debug!(offset, page_len, total = markets.len(), "Fetched events page");
            if page_len < limit {
                break;
            }
            offset += page_len;
        }

        info!(markets = markets.len(), "Event listing complete");
        Ok(markets)
    }

    /// Fetch a single market by condition id, falling back to the paged
    /// markets listing when the filter is unsupported.
    pub async fn fetch_market(&self, condition_id: &str) -> RestResult<Option<RawMarket>> {
        let url = format!(
            "{}/markets?condition_id={}&limit=1",
            self.config.gamma_url, condition_id
        );
        match self.get_with_retry::<Vec<RawMarket>>(&url).await {
            Ok(rows) => Ok(rows.into_iter().next()),
            Err(e) if e.class() == pulse_core::ErrorClass::Permanent => {
                warn!(condition_id, error = %e, "Market filter unsupported, paging");
                let url = format!("{}/markets?limit=500", self.config.gamma_url);
                let rows: Vec<RawMarket> = self.get_with_retry(&url).await?;
                Ok(rows
                    .into_iter()
                    .find(|m| m.market_id() == Some(condition_id)))
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch a book snapshot for one asset.
    pub async fn fetch_orderbook(
        &self,
        market_id: &str,
        asset_id: &str,
    ) -> RestResult<OrderbookSnapshot> {
        let url = format!("{}/book?token_id={}", self.config.clob_url, asset_id);
        let raw: RawOrderbook = self.get_with_retry(&url).await?;
        Ok(raw.into_snapshot(market_id.to_string(), asset_id.to_string()))
    }

    /// Fetch recent trades for a market.
    pub async fn fetch_trades(&self, market_id: &str, limit: usize) -> RestResult<Vec<TradeTick>> {
        let url = format!(
            "{}/trades?market={}&limit={}",
            self.config.clob_url, market_id, limit
        );
        let raw: Vec<RawTrade> = self.get_with_retry(&url).await?;
        Ok(raw
            .into_iter()
            .map(|t| t.into_tick(market_id.to_string()))
            .collect())
    }

    /// GET with rate limiting, classification, and capped backoff.
    async fn get_with_retry<T: DeserializeOwned>(&self, url: &str) -> RestResult<T> {
        let mut attempt = 0u32;
        loop {
            self.limiter.acquire().await;
            match self.get_once(url).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = backoff_delay(attempt);
                    warn!(url, attempt, delay_ms = delay.as_millis(), error = %e, "Retrying request");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &str) -> RestResult<T> {
        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                RestError::Timeout {
                    timeout_secs: self.config.request_timeout_secs,
                }
            } else {
                RestError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let reset_at = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<i64>().ok())
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs));
            return Err(RestError::RateLimited { reset_at });
        }
        if !status.is_success() {
            return Err(RestError::Upstream {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| RestError::Transport(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| {
            RestError::Parse(format!(
                "{e}; body head: {}",
                body.chars().take(200).collect::<String>()
            ))
        })
    }
}

/// Exponential backoff: 1s, 2s, 4s, ... capped at 30s.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(5);
    let delay = Duration::from_secs(1u64 << exp);
    delay.min(MAX_BACKOFF)
}
