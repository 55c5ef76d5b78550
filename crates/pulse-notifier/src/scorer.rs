//! Posterior-weighted alert scoring.

use crate::config::NotifierConfig;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use pulse_core::{EarlySignal, SignalType};
use pulse_perf::PosteriorStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Delivery priority derived from the adjusted score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }

    /// Embed color per priority.
    pub fn color(&self) -> u32 {
        match self {
            Self::Critical => 0xE74C3C,
            Self::High => 0xE67E22,
            Self::Medium => 0xF1C40F,
            Self::Low => 0x3498DB,
        }
    }

    /// Priority from an adjusted score; None means dropped.
    pub fn from_score(score: f64) -> Option<Self> {
        if score >= 0.9 {
            Some(Self::Critical)
        } else if score >= 0.75 {
            Some(Self::High)
        } else if score >= 0.55 {
            Some(Self::Medium)
        } else if score >= 0.35 {
            Some(Self::Low)
        } else {
            None
        }
    }
}

impl std::fmt::Display for AlertPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computes `confidence * accuracy_weight + ev_boost - recency_penalty
/// - noise_brake` and maps it to a priority.
pub struct AlertScorer {
    posteriors: Arc<PosteriorStore>,
    min_posterior_samples: u64,
    /// Last delivered alert per market (recency penalty input).
    last_market_alert: Mutex<HashMap<String, DateTime<Utc>>>,
    /// Recent alerts per signal type (noise brake input).
    recent_type_alerts: Mutex<HashMap<SignalType, Vec<DateTime<Utc>>>>,
}

/// Recency penalty while a market alerted within the last 5 minutes.
const RECENCY_WINDOW_SECS: i64 = 300;
const RECENCY_PENALTY: f64 = 0.15;

/// Noise brake per recent same-type alert within 10 minutes.
const NOISE_WINDOW_SECS: i64 = 600;
const NOISE_BRAKE_STEP: f64 = 0.05;
const NOISE_BRAKE_CAP: f64 = 0.20;

impl AlertScorer {
    pub fn new(posteriors: Arc<PosteriorStore>, config: &NotifierConfig) -> Self {
        Self {
            posteriors,
            min_posterior_samples: config.min_posterior_samples,
            last_market_alert: Mutex::new(HashMap::new()),
            recent_type_alerts: Mutex::new(HashMap::new()),
        }
    }

    /// Adjusted score for a signal at `now`.
    pub fn score(&self, signal: &EarlySignal, now: DateTime<Utc>) -> f64 {
        let (accuracy_weight, ev_boost) = match self.posteriors.snapshot(signal.signal_type) {
            Some(p) if p.samples >= self.min_posterior_samples => (
                0.5 + p.bayesian_confidence(),
                (p.expected_value() * 2.0).clamp(-0.10, 0.20),
            ),
            // Unproven signal types score on raw confidence.
            _ => (1.0, 0.0),
        };

        let recency_penalty = {
            let map = self.last_market_alert.lock();
            match map.get(&signal.market_id) {
                Some(&t) if now - t < Duration::seconds(RECENCY_WINDOW_SECS) => RECENCY_PENALTY,
                _ => 0.0,
            }
        };

        let noise_brake = {
            let mut map = self.recent_type_alerts.lock();
            let entries = map.entry(signal.signal_type).or_default();
            entries.retain(|&t| now - t < Duration::seconds(NOISE_WINDOW_SECS));
            (entries.len() as f64 * NOISE_BRAKE_STEP).min(NOISE_BRAKE_CAP)
        };

        signal.confidence * accuracy_weight + ev_boost - recency_penalty - noise_brake
    }

    /// Record a delivered alert so later scores see it.
    pub fn record_delivery(&self, signal: &EarlySignal, now: DateTime<Utc>) {
        self.last_market_alert
            .lock()
            .insert(signal.market_id.clone(), now);
        self.recent_type_alerts
            .lock()
            .entry(signal.signal_type)
            .or_default()
            .push(now);
    }
}
