//! Cross-market coordinated-movement detector.

use crate::config::CorrelationConfig;
use crate::tracker::PriceHistoryTracker;
use chrono::{DateTime, Duration, Utc};
use pulse_core::{Category, Direction, EarlySignal, MarketId, SignalMetadata, SignalType};
use tracing::debug;

/// Per-market input to a correlation cycle.
#[derive(Debug, Clone)]
pub struct CorrelationCandidate {
    pub market_id: MarketId,
    pub category: Option<Category>,
    pub volume: f64,
}

/// Aggregates computed for one cluster over one window.
#[derive(Debug)]
struct ClusterStats {
    avg_correlation: f64,
    avg_abs_change_pct: f64,
    avg_signed_change_pct: f64,
    avg_volume_multiple: f64,
    member_ids: Vec<MarketId>,
}

/// Emits one `coordinated_cross_market` signal per category cluster per
/// cycle when pairwise correlation and price movement both confirm.
pub struct CrossMarketCorrelationDetector {
    config: CorrelationConfig,
}

impl CrossMarketCorrelationDetector {
    pub fn new(config: CorrelationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    /// Run one detection cycle over the monitored universe.
    pub fn evaluate(
        &self,
        candidates: &[CorrelationCandidate],
        tracker: &PriceHistoryTracker,
    ) -> Vec<EarlySignal> {
        let filtered = self.prefilter(candidates, tracker);
        if filtered.len() < self.config.min_markets {
            return Vec::new();
        }

        // Cluster by category; uncategorized markets don't cluster.
        let mut clusters: std::collections::HashMap<Category, Vec<&CorrelationCandidate>> =
            std::collections::HashMap::new();
        for c in &filtered {
            if let Some(cat) = c.category {
                clusters.entry(cat).or_default().push(*c);
            }
        }

        let mut signals = Vec::new();
        for (category, members) in clusters {
            if members.len() < self.config.min_markets {
                continue;
            }
            if let Some(signal) = self.evaluate_cluster(category, &members, tracker) {
                signals.push(signal);
            }
        }
        signals
    }

    /// Keep markets with history and a meaningful 1h move, capped to the
    /// top movers so the pair count stays bounded.
    fn prefilter<'a>(
        &self,
        candidates: &'a [CorrelationCandidate],
        tracker: &PriceHistoryTracker,
    ) -> Vec<&'a CorrelationCandidate> {
        let hour = Duration::hours(1);
        let mut movers: Vec<(&CorrelationCandidate, f64)> = candidates
            .iter()
            .filter(|c| {
                tracker.has_sufficient_history(&c.market_id, self.config.min_aligned_samples)
            })
            .filter_map(|c| {
                let change = tracker.price_change_pct(&c.market_id, hour)?;
                (change.abs() > self.config.prefilter_change_pct).then_some((c, change.abs()))
            })
            .collect();
        movers.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        movers.truncate(self.config.max_candidates);
        movers.into_iter().map(|(c, _)| c).collect()
    }

    fn evaluate_cluster(
        &self,
        category: Category,
        members: &[&CorrelationCandidate],
        tracker: &PriceHistoryTracker,
    ) -> Option<EarlySignal> {
        let baseline = self.config.baseline_for(Some(category));

        for &window_secs in &self.config.windows_secs {
            let window = Duration::seconds(window_secs as i64);
            let Some(stats) = self.cluster_stats(members, tracker, window) else {
                continue;
            };

            if stats.avg_correlation < self.config.min_correlation
                || stats.avg_abs_change_pct < self.config.min_price_change_pct
            {
                continue;
            }

            let mut confidence: f64 = 0.5;
            if stats.avg_correlation >= 0.8 {
                confidence += 0.2;
            }
            if stats.avg_abs_change_pct >= 5.0 {
                confidence += 0.2;
            }
            if stats.avg_volume_multiple >= self.config.volume_confirmation_threshold {
                confidence += 0.15;
            }
            if stats.avg_correlation - baseline > 0.2 {
                confidence += 0.15;
            }
            if stats.member_ids.len() >= 5 {
                confidence += 0.1;
            }
            let confidence = confidence.min(1.0);

            let direction = if stats.avg_signed_change_pct > 0.0 {
                Direction::Bullish
            } else {
                Direction::Bearish
            };

            // Anchor at the highest-volume cluster member.
            let anchor = members
                .iter()
                .max_by(|a, b| {
                    a.volume
                        .partial_cmp(&b.volume)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|c| c.market_id.clone())?;

            let leak_start = self.estimate_leak_start(&stats.member_ids, tracker, window);

            debug!(
                category = %category,
                window_secs,
                avg_correlation = stats.avg_correlation,
                cluster = stats.member_ids.len(),
                "Coordinated cross-market movement"
            );

            return Some(EarlySignal::new(
                anchor,
                SignalType::CoordinatedCrossMarket,
                confidence,
                direction,
                SignalMetadata::CoordinatedCrossMarket {
                    correlated_markets: stats.member_ids,
                    avg_correlation: stats.avg_correlation,
                    baseline_correlation: baseline,
                    avg_price_change_pct: stats.avg_abs_change_pct,
                    volume_multiple: stats.avg_volume_multiple,
                    window_secs,
                    leak_start,
                },
            ));
        }
        None
    }

    fn cluster_stats(
        &self,
        members: &[&CorrelationCandidate],
        tracker: &PriceHistoryTracker,
        window: Duration,
    ) -> Option<ClusterStats> {
        let ids: Vec<&str> = members.iter().map(|c| c.market_id.as_str()).collect();

        let mut correlations = Vec::new();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                if let Some(r) =
                    tracker.correlation(ids[i], ids[j], window, self.config.min_aligned_samples)
                {
                    correlations.push(r);
                }
            }
        }
        if correlations.is_empty() {
            return None;
        }
        let avg_correlation = correlations.iter().sum::<f64>() / correlations.len() as f64;

        let changes: Vec<f64> = ids
            .iter()
            .filter_map(|id| tracker.price_change_pct(id, window))
            .collect();
        if changes.is_empty() {
            return None;
        }
        let avg_abs_change_pct =
            changes.iter().map(|c| c.abs()).sum::<f64>() / changes.len() as f64;
        let avg_signed_change_pct = changes.iter().sum::<f64>() / changes.len() as f64;

        let multiples: Vec<f64> = ids
            .iter()
            .filter_map(|id| tracker.volume_multiple(id, window))
            .collect();
        let avg_volume_multiple = if multiples.is_empty() {
            1.0
        } else {
            multiples.iter().sum::<f64>() / multiples.len() as f64
        };

        Some(ClusterStats {
            avg_correlation,
            avg_abs_change_pct,
            avg_signed_change_pct,
            avg_volume_multiple,
            member_ids: members.iter().map(|c| c.market_id.clone()).collect(),
        })
    }

    /// Slide a shorter inner window backward from now and return the
    /// earliest point where it first cleared the correlation threshold.
    fn estimate_leak_start(
        &self,
        ids: &[MarketId],
        tracker: &PriceHistoryTracker,
        window: Duration,
    ) -> Option<DateTime<Utc>> {
        if ids.len() < 2 {
            return None;
        }
        let inner = window / 6;
        let step = inner / 2;
        if inner.num_seconds() == 0 || step.num_seconds() == 0 {
            return None;
        }

        let now = Utc::now();
        let mut earliest: Option<DateTime<Utc>> = None;
        let steps = (window.num_seconds() / step.num_seconds()).max(1);

        // Pairwise over the first few members is enough for the estimate.
        let pair_ids: Vec<&str> = ids.iter().take(5).map(|s| s.as_str()).collect();

        for k in 0..steps {
            let end = now - step * k as i32;
            let window_for_end = inner + (now - end);

            let mut sum = 0.0;
            let mut count = 0usize;
            for i in 0..pair_ids.len() {
                for j in (i + 1)..pair_ids.len() {
                    // Correlation over [end - inner, end] approximated by
                    // the inner-window slice anchored at `end`.
                    if let Some(r) = tracker.correlation(
                        pair_ids[i],
                        pair_ids[j],
                        window_for_end,
                        self.config.min_aligned_samples,
                    ) {
                        sum += r;
                        count += 1;
                    }
                }
            }
            if count == 0 {
                break;
            }
            let avg = sum / count as f64;
            if avg >= self.config.min_correlation {
                earliest = Some(end - inner);
            } else {
                break;
            }
        }
        earliest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryConfig;

    fn seed(tracker: &PriceHistoryTracker, market: &str, n: usize, f: impl Fn(usize) -> f64) {
        let now = Utc::now();
        for i in 0..n {
            let ts = now - Duration::seconds((n - i) as i64);
            tracker.append(market, ts, f(i), 100.0);
        }
    }

    fn candidates() -> Vec<CorrelationCandidate> {
        vec![
            CorrelationCandidate {
                market_id: "a".to_string(),
                category: Some(Category::Politics),
                volume: 10_000.0,
            },
            CorrelationCandidate {
                market_id: "b".to_string(),
                category: Some(Category::Politics),
                volume: 50_000.0,
            },
            CorrelationCandidate {
                market_id: "c".to_string(),
                category: Some(Category::Politics),
                volume: 20_000.0,
            },
        ]
    }

    #[test]
    fn test_correlated_cluster_fires_once_anchored_at_top_volume() {
        let tracker = PriceHistoryTracker::new(HistoryConfig::default());
        // Identical 4% up-moves across three politics markets.
        for m in ["a", "b", "c"] {
            seed(&tracker, m, 1800, |i| 0.50 * (1.0 + 0.04 * i as f64 / 1800.0));
        }
        let detector = CrossMarketCorrelationDetector::new(CorrelationConfig::default());
        let signals = detector.evaluate(&candidates(), &tracker);
        assert_eq!(signals.len(), 1);

        let sig = &signals[0];
        assert_eq!(sig.market_id, "b"); // highest volume
        assert_eq!(sig.signal_type, SignalType::CoordinatedCrossMarket);
        assert_eq!(sig.direction, Direction::Bullish);
        assert!(sig.confidence >= 0.8, "confidence {}", sig.confidence);
        match &sig.metadata {
            SignalMetadata::CoordinatedCrossMarket {
                correlated_markets,
                avg_correlation,
                ..
            } => {
                assert_eq!(correlated_markets.len(), 3);
                assert!((avg_correlation - 1.0).abs() < 1e-6);
            }
            _ => panic!("wrong metadata"),
        }
    }

    #[test]
    fn test_uncorrelated_markets_stay_quiet() {
        let tracker = PriceHistoryTracker::new(HistoryConfig::default());
        seed(&tracker, "a", 1800, |i| 0.50 + 0.04 * (i as f64 / 300.0).sin());
        seed(&tracker, "b", 1800, |i| 0.50 + 0.04 * (i as f64 / 77.0).cos());
        seed(&tracker, "c", 1800, |i| {
            0.50 - 0.04 * (i as f64 / 1800.0)
        });
        let detector = CrossMarketCorrelationDetector::new(CorrelationConfig::default());
        let signals = detector.evaluate(&candidates(), &tracker);
        assert!(signals.is_empty());
    }

    #[test]
    fn test_small_cluster_suppressed() {
        let tracker = PriceHistoryTracker::new(HistoryConfig::default());
        for m in ["a", "b"] {
            seed(&tracker, m, 1800, |i| 0.50 * (1.0 + 0.04 * i as f64 / 1800.0));
        }
        let detector = CrossMarketCorrelationDetector::new(CorrelationConfig::default());
        let two = candidates()[..2].to_vec();
        assert!(detector.evaluate(&two, &tracker).is_empty());
    }

    #[test]
    fn test_flat_markets_prefiltered() {
        let tracker = PriceHistoryTracker::new(HistoryConfig::default());
        for m in ["a", "b", "c"] {
            seed(&tracker, m, 1800, |_| 0.50);
        }
        let detector = CrossMarketCorrelationDetector::new(CorrelationConfig::default());
        assert!(detector.evaluate(&candidates(), &tracker).is_empty());
    }
}
