//! Connection heartbeat monitoring.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;

/// Tracks inbound activity and ping/pong timing for one connection.
///
/// `last_heartbeat` advances on any inbound frame; the connection is
/// considered dead once silence exceeds twice the heartbeat interval.
pub struct HeartbeatMonitor {
    interval_ms: u64,
    last_inbound: RwLock<DateTime<Utc>>,
    waiting_for_pong: RwLock<bool>,
}

impl HeartbeatMonitor {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_inbound: RwLock::new(Utc::now()),
            waiting_for_pong: RwLock::new(false),
        }
    }

    /// Reset on (re)connection.
    pub fn reset(&self) {
        *self.last_inbound.write() = Utc::now();
        *self.waiting_for_pong.write() = false;
    }

    /// Any inbound frame counts as liveness.
    pub fn record_inbound(&self) {
        *self.last_inbound.write() = Utc::now();
        *self.waiting_for_pong.write() = false;
    }

    pub fn record_ping_sent(&self) {
        *self.waiting_for_pong.write() = true;
    }

    /// Milliseconds since the last inbound frame.
    pub fn silence_ms(&self) -> i64 {
        (Utc::now() - *self.last_inbound.read()).num_milliseconds()
    }

    /// Dead when silence exceeds twice the heartbeat interval.
    pub fn is_timed_out(&self) -> bool {
        self.silence_ms() > 2 * self.interval_ms as i64
    }

    /// Send a ping when we've been quiet for a full interval and are
    /// not already waiting on a pong.
    pub fn should_ping(&self) -> bool {
        !*self.waiting_for_pong.read() && self.silence_ms() >= self.interval_ms as i64
    }

    /// Cadence for the heartbeat check timer.
    pub fn check_period(&self) -> Duration {
        Duration::from_millis((self.interval_ms / 2).max(100))
    }
}
