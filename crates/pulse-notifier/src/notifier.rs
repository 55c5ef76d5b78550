//! The prioritized notifier loop.

use crate::config::NotifierConfig;
use crate::error::NotifyResult;
use crate::limits::{AlertLimits, FilterReason};
use crate::scorer::{AlertPriority, AlertScorer};
use crate::webhook::{DiscordWebhook, EmbedPayload, WebhookSink};
use chrono::Utc;
use parking_lot::Mutex;
use pulse_core::EarlySignal;
use pulse_perf::PosteriorStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to one signal.
#[derive(Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered(AlertPriority),
    Filtered(FilterReason),
    Failed,
}

/// Delivery counters.
#[derive(Debug, Default, Clone)]
pub struct NotifierStats {
    pub delivered: u64,
    pub failed: u64,
    pub filtered: HashMap<FilterReason, u64>,
}

impl NotifierStats {
    pub fn filtered_total(&self) -> u64 {
        self.filtered.values().sum()
    }
}

/// Consumes the signal bus and delivers prioritized alerts.
pub struct PrioritizedNotifier {
    scorer: AlertScorer,
    limits: AlertLimits,
    sink: Option<Arc<dyn WebhookSink>>,
    stats: Mutex<NotifierStats>,
}

impl PrioritizedNotifier {
    /// Build with the configured webhook; no URL means no delivery.
    pub fn new(config: &NotifierConfig, posteriors: Arc<PosteriorStore>) -> NotifyResult<Self> {
        let sink: Option<Arc<dyn WebhookSink>> = match &config.webhook_url {
            Some(url) if !url.is_empty() => Some(Arc::new(DiscordWebhook::new(
                url.clone(),
                config.webhook_timeout_secs,
            )?)),
            _ => None,
        };
        Ok(Self::with_sink(config, posteriors, sink))
    }

    /// Build with an explicit sink (tests inject a mock here).
    pub fn with_sink(
        config: &NotifierConfig,
        posteriors: Arc<PosteriorStore>,
        sink: Option<Arc<dyn WebhookSink>>,
    ) -> Self {
        Self {
            scorer: AlertScorer::new(posteriors, config),
            limits: AlertLimits::new(
                config.discord_rate_limit,
                config.per_market_cooldown_ms,
                config.dedup_window_ms,
            ),
            sink,
            stats: Mutex::new(NotifierStats::default()),
        }
    }

    /// Score, reserve, and deliver one signal.
    pub async fn handle(&self, signal: &EarlySignal) -> DeliveryOutcome {
        let now = Utc::now();

        let score = self.scorer.score(signal, now);
        let Some(priority) = AlertPriority::from_score(score) else {
            return self.filtered(FilterReason::BelowThreshold);
        };

        let Some(sink) = &self.sink else {
            return self.filtered(FilterReason::DeliveryDisabled);
        };
        if sink.is_disabled() {
            return self.filtered(FilterReason::DeliveryDisabled);
        }

        let reservation =
            match self
                .limits
                .try_reserve(&signal.market_id, signal.signal_type, priority, now)
            {
                Ok(r) => r,
                Err(reason) => return self.filtered(reason),
            };

        let payload = EmbedPayload::for_signal(signal, priority, score);
        match sink.deliver(&payload).await {
            Ok(()) => {
                self.scorer.record_delivery(signal, now);
                self.stats.lock().delivered += 1;
                info!(
                    market_id = %signal.market_id,
                    signal_type = %signal.signal_type,
                    %priority,
                    score,
                    "Alert delivered"
                );
                DeliveryOutcome::Delivered(priority)
            }
            Err(e) => {
                // Roll the slot back so it can be reused.
                self.limits.release(reservation);
                self.stats.lock().failed += 1;
                warn!(error = %e, "Alert delivery failed; slot released");
                DeliveryOutcome::Failed
            }
        }
    }

    pub fn stats(&self) -> NotifierStats {
        self.stats.lock().clone()
    }

    fn filtered(&self, reason: FilterReason) -> DeliveryOutcome {
        *self.stats.lock().filtered.entry(reason).or_insert(0) += 1;
        debug!(reason = reason.as_str(), "Signal filtered");
        DeliveryOutcome::Filtered(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyError;
    use crate::webhook::EmbedField;
    use async_trait::async_trait;
    use pulse_core::{Direction, SignalMetadata, SignalType};
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingSink {
        delivered: AtomicU64,
        /// Fail this many deliveries before succeeding.
        fail_first: AtomicU64,
    }

    impl CountingSink {
        fn new(fail_first: u64) -> Arc<Self> {
            Arc::new(Self {
                delivered: AtomicU64::new(0),
                fail_first: AtomicU64::new(fail_first),
            })
        }
    }

    #[async_trait]
    impl WebhookSink for CountingSink {
        async fn deliver(&self, _payload: &EmbedPayload) -> NotifyResult<()> {
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(NotifyError::WebhookStatus { status: 500 });
            }
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn signal(market: &str, signal_type: SignalType, confidence: f64) -> EarlySignal {
        EarlySignal::new(
            market,
            signal_type,
            confidence,
            Direction::Bullish,
            SignalMetadata::VolumeSpike {
                volume_delta: 500.0,
                baseline_delta: 100.0,
                multiple: 5.0,
            },
        )
    }

    fn notifier(sink: Arc<dyn WebhookSink>) -> PrioritizedNotifier {
        PrioritizedNotifier::with_sink(
            &NotifierConfig::default(),
            Arc::new(PosteriorStore::new(0.25)),
            Some(sink),
        )
    }

    #[tokio::test]
    async fn test_global_rate_limit_filters_excess() {
        let sink = CountingSink::new(0);
        let n = notifier(sink.clone());

        // 20 medium-priority signals across 20 markets; the global cap
        // of 10 lets exactly 10 through.
        let mut delivered = 0;
        let mut limited = 0;
        for i in 0..20 {
            // Alternate types so the noise brake doesn't drop priority.
            let t = if i % 2 == 0 {
                SignalType::VolumeSpike
            } else {
                SignalType::SpreadAnomaly
            };
            match n.handle(&signal(&format!("m{i}"), t, 0.65)).await {
                DeliveryOutcome::Delivered(_) => delivered += 1,
                DeliveryOutcome::Filtered(FilterReason::GlobalRateLimit) => limited += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(delivered, 10);
        assert_eq!(limited, 10);
        assert_eq!(sink.delivered.load(Ordering::SeqCst), 10);
        assert_eq!(
            n.stats().filtered.get(&FilterReason::GlobalRateLimit),
            Some(&10)
        );
    }

    #[tokio::test]
    async fn test_low_score_dropped_before_rate_limit() {
        let sink = CountingSink::new(0);
        let n = notifier(sink.clone());
        let outcome = n.handle(&signal("m1", SignalType::VolumeSpike, 0.1)).await;
        assert_eq!(
            outcome,
            DeliveryOutcome::Filtered(FilterReason::BelowThreshold)
        );
        assert_eq!(sink.delivered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_delivery_releases_slot() {
        let sink = CountingSink::new(1);
        let cfg = NotifierConfig {
            discord_rate_limit: 1,
            ..Default::default()
        };
        let n =
            PrioritizedNotifier::with_sink(&cfg, Arc::new(PosteriorStore::new(0.25)), Some(sink.clone()));

        let outcome = n.handle(&signal("m1", SignalType::VolumeSpike, 0.8)).await;
        assert_eq!(outcome, DeliveryOutcome::Failed);

        // Slot, cooldown, and dedup all rolled back: the retry lands.
        let outcome = n.handle(&signal("m1", SignalType::VolumeSpike, 0.8)).await;
        assert!(matches!(outcome, DeliveryOutcome::Delivered(_)));
        assert_eq!(sink.delivered.load(Ordering::SeqCst), 1);
        assert_eq!(n.stats().failed, 1);
        assert_eq!(n.stats().delivered, 1);
    }

    #[tokio::test]
    async fn test_dedup_within_window() {
        let sink = CountingSink::new(0);
        let n = notifier(sink.clone());
        let first = n.handle(&signal("m1", SignalType::VolumeSpike, 0.95)).await;
        assert!(matches!(first, DeliveryOutcome::Delivered(_)));
        // Same (market, type) again inside 60s: duplicate, even though
        // the first was CRITICAL.
        let second = n.handle(&signal("m1", SignalType::VolumeSpike, 0.95)).await;
        assert_eq!(second, DeliveryOutcome::Filtered(FilterReason::Duplicate));
    }

    #[tokio::test]
    async fn test_no_webhook_means_no_delivery() {
        let n = PrioritizedNotifier::with_sink(
            &NotifierConfig::default(),
            Arc::new(PosteriorStore::new(0.25)),
            None,
        );
        let outcome = n.handle(&signal("m1", SignalType::VolumeSpike, 0.9)).await;
        assert_eq!(
            outcome,
            DeliveryOutcome::Filtered(FilterReason::DeliveryDisabled)
        );
    }

    #[test]
    fn test_embed_field_serializes_inline_flag() {
        let f = EmbedField {
            name: "n".to_string(),
            value: "v".to_string(),
            inline: true,
        };
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["inline"], true);
    }
}
