//! Webhook sink: embed payloads and HTTP delivery.

use crate::error::{NotifyError, NotifyResult};
use crate::scorer::AlertPriority;
use async_trait::async_trait;
use chrono::Utc;
use pulse_core::{EarlySignal, SignalMetadata};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, warn};

/// One embed field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// Outbound webhook payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedPayload {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub footer: EmbedFooter,
    pub timestamp: String,
}

impl EmbedPayload {
    /// Build an embed for a scored signal.
    pub fn for_signal(signal: &EarlySignal, priority: AlertPriority, adjusted_score: f64) -> Self {
        let mut fields = vec![
            EmbedField {
                name: "Market".to_string(),
                value: signal.market_id.clone(),
                inline: true,
            },
            EmbedField {
                name: "Direction".to_string(),
                value: signal.direction.to_string(),
                inline: true,
            },
            EmbedField {
                name: "Confidence".to_string(),
                value: format!("{:.0}%", signal.confidence * 100.0),
                inline: true,
            },
        ];

        match &signal.metadata {
            SignalMetadata::OrderbookImbalance { imbalance, z_score, .. } => {
                fields.push(EmbedField {
                    name: "Imbalance".to_string(),
                    value: format!("{imbalance:+.2} (z={z_score:+.1})"),
                    inline: true,
                });
            }
            SignalMetadata::SpreadAnomaly { multiple, .. } => {
                fields.push(EmbedField {
                    name: "Spread".to_string(),
                    value: format!("{multiple:.1}x baseline"),
                    inline: true,
                });
            }
            SignalMetadata::MarketMakerWithdrawal { drop_pct, .. } => {
                fields.push(EmbedField {
                    name: "Depth drop".to_string(),
                    value: format!("{drop_pct:.0}%"),
                    inline: true,
                });
            }
            SignalMetadata::CoordinatedCrossMarket {
                correlated_markets,
                avg_correlation,
                ..
            } => {
                fields.push(EmbedField {
                    name: "Cluster".to_string(),
                    value: format!(
                        "{} markets, avg r={avg_correlation:.2}",
                        correlated_markets.len()
                    ),
                    inline: true,
                });
            }
            _ => {}
        }

        Self {
            title: format!("[{priority}] {}", signal.signal_type),
            description: format!(
                "{} signal on market {} (score {:.2})",
                signal.signal_type, signal.market_id, adjusted_score
            ),
            color: priority.color(),
            fields,
            footer: EmbedFooter {
                text: "pulse surveillance".to_string(),
            },
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Abstraction over the delivery transport.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn deliver(&self, payload: &EmbedPayload) -> NotifyResult<()>;

    /// Whether delivery has been permanently disabled.
    fn is_disabled(&self) -> bool {
        false
    }
}

/// Discord-compatible webhook over reqwest.
pub struct DiscordWebhook {
    http: reqwest::Client,
    url: String,
    disabled: AtomicBool,
}

impl DiscordWebhook {
    pub fn new(url: String, timeout_secs: u64) -> NotifyResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url,
            disabled: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl WebhookSink for DiscordWebhook {
    async fn deliver(&self, payload: &EmbedPayload) -> NotifyResult<()> {
        if self.disabled.load(Ordering::Relaxed) {
            return Err(NotifyError::DeliveryDisabled);
        }

        let body = serde_json::json!({ "embeds": [payload] });
        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            // Honor Retry-After once, then retry.
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            warn!(retry_after, "Webhook rate limited");
            tokio::time::sleep(Duration::from_secs(retry_after)).await;

            let retry = self
                .http
                .post(&self.url)
                .json(&body)
                .send()
                .await
                .map_err(|e| NotifyError::Transport(e.to_string()))?;
            if retry.status().is_success() {
                return Ok(());
            }
            return Err(NotifyError::WebhookRateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !status.is_success() {
            let err = NotifyError::WebhookStatus {
                status: status.as_u16(),
            };
            if err.disables_delivery() {
                error!(status = status.as_u16(), "Webhook rejected; disabling delivery");
                self.disabled.store(true, Ordering::Relaxed);
            }
            return Err(err);
        }
        Ok(())
    }

    fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }
}
