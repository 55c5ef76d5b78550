//! Deduplication and atomic rate-limit reservations.
//!
//! A delivery first reserves a slot; the reservation is committed on
//! webhook success and released on failure so the slot can be reused.
//! One lock guards both windows, so the check-and-reserve is atomic.

use crate::scorer::AlertPriority;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use pulse_core::SignalType;
use std::collections::{HashMap, VecDeque};

/// Why a signal was filtered instead of delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterReason {
    BelowThreshold,
    Duplicate,
    PerMarketRateLimit,
    GlobalRateLimit,
    DeliveryDisabled,
}

impl FilterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BelowThreshold => "below_threshold",
            Self::Duplicate => "duplicate",
            Self::PerMarketRateLimit => "per_market_rate_limit",
            Self::GlobalRateLimit => "global_rate_limit",
            Self::DeliveryDisabled => "delivery_disabled",
        }
    }
}

/// A reserved delivery slot. Commit on success, release on failure.
#[derive(Debug)]
pub struct Reservation {
    pub market_id: String,
    pub signal_type: SignalType,
    at: DateTime<Utc>,
}

struct Inner {
    /// Delivered (or reserved) global slots in the rolling window.
    global: VecDeque<DateTime<Utc>>,
    /// Last delivery per market.
    per_market: HashMap<String, DateTime<Utc>>,
    /// Last delivery per (market, signal type) for dedup.
    dedup: HashMap<(String, SignalType), DateTime<Utc>>,
}

/// Rate-limit and dedup state.
pub struct AlertLimits {
    global_limit: usize,
    global_window: Duration,
    per_market_cooldown: Duration,
    dedup_window: Duration,
    inner: Mutex<Inner>,
}

impl AlertLimits {
    pub fn new(global_limit: u32, per_market_cooldown_ms: u64, dedup_window_ms: u64) -> Self {
        Self {
            global_limit: global_limit as usize,
            global_window: Duration::seconds(60),
            per_market_cooldown: Duration::milliseconds(per_market_cooldown_ms as i64),
            dedup_window: Duration::milliseconds(dedup_window_ms as i64),
            inner: Mutex::new(Inner {
                global: VecDeque::new(),
                per_market: HashMap::new(),
                dedup: HashMap::new(),
            }),
        }
    }

    /// Atomically check dedup + per-market + global windows and reserve
    /// a slot. CRITICAL bypasses the per-market cap, never the global.
    pub fn try_reserve(
        &self,
        market_id: &str,
        signal_type: SignalType,
        priority: AlertPriority,
        now: DateTime<Utc>,
    ) -> Result<Reservation, FilterReason> {
        let mut inner = self.inner.lock();

        // Expire old global slots.
        while inner
            .global
            .front()
            .is_some_and(|&t| now - t >= self.global_window)
        {
            inner.global.pop_front();
        }

        let dedup_key = (market_id.to_string(), signal_type);
        if inner
            .dedup
            .get(&dedup_key)
            .is_some_and(|&t| now - t < self.dedup_window)
        {
            return Err(FilterReason::Duplicate);
        }

        if priority != AlertPriority::Critical {
            if inner
                .per_market
                .get(market_id)
                .is_some_and(|&t| now - t < self.per_market_cooldown)
            {
                return Err(FilterReason::PerMarketRateLimit);
            }
        }

        if inner.global.len() >= self.global_limit {
            return Err(FilterReason::GlobalRateLimit);
        }

        // Reserve: the slot is held until commit or release.
        inner.global.push_back(now);
        inner.per_market.insert(market_id.to_string(), now);
        inner.dedup.insert(dedup_key, now);

        Ok(Reservation {
            market_id: market_id.to_string(),
            signal_type,
            at: now,
        })
    }

    /// Release a reservation after a failed delivery so the slot is
    /// reusable.
    pub fn release(&self, reservation: Reservation) {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.global.iter().position(|&t| t == reservation.at) {
            inner.global.remove(pos);
        }
        let key = (reservation.market_id.clone(), reservation.signal_type);
        if inner.dedup.get(&key) == Some(&reservation.at) {
            inner.dedup.remove(&key);
        }
        if inner.per_market.get(&reservation.market_id) == Some(&reservation.at) {
            inner.per_market.remove(&reservation.market_id);
        }
    }

    /// Delivered/reserved slots in the current global window.
    pub fn global_in_window(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.inner.lock();
        while inner
            .global
            .front()
            .is_some_and(|&t| now - t >= self.global_window)
        {
            inner.global.pop_front();
        }
        inner.global.len()
    }
}
