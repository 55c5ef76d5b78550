//! Sliding-window request limiter for the venue's REST hosts.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::warn;

/// Token-bucket limiter over a rolling window (default 100 req / 60 s).
pub struct RequestLimiter {
    max_requests: u32,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RequestLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
            timestamps: Mutex::new(VecDeque::with_capacity(max_requests as usize)),
        }
    }

    /// Whether a request can be sent right now.
    pub fn can_send(&self) -> bool {
        let mut timestamps = self.timestamps.lock();
        Self::cleanup(&mut timestamps, self.window);
        timestamps.len() < self.max_requests as usize
    }

    /// Record a sent request.
    pub fn record(&self) {
        let mut timestamps = self.timestamps.lock();
        Self::cleanup(&mut timestamps, self.window);
        timestamps.push_back(Instant::now());
        if timestamps.len() as u32 >= self.max_requests {
            warn!(
                count = timestamps.len(),
                max = self.max_requests,
                "REST rate limit reached"
            );
        }
    }

    /// Requests still available in the current window.
    pub fn remaining(&self) -> u32 {
        let mut timestamps = self.timestamps.lock();
        Self::cleanup(&mut timestamps, self.window);
        self.max_requests.saturating_sub(timestamps.len() as u32)
    }

    /// Sleep until a slot frees up, then record the send.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut timestamps = self.timestamps.lock();
                Self::cleanup(&mut timestamps, self.window);
                if timestamps.len() < self.max_requests as usize {
                    timestamps.push_back(Instant::now());
                    None
                } else {
                    // Oldest entry expiring frees the next slot.
                    timestamps
                        .front()
                        .map(|&t| self.window.saturating_sub(t.elapsed()))
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d.max(Duration::from_millis(10))).await,
            }
        }
    }

    fn cleanup(timestamps: &mut VecDeque<Instant>, window: Duration) {
        let now = Instant::now();
        while timestamps
            .front()
            .is_some_and(|&t| now.duration_since(t) >= window)
        {
            timestamps.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_counts_window() {
        let limiter = RequestLimiter::new(5, 60);
        assert!(limiter.can_send());
        for _ in 0..5 {
            limiter.record();
        }
        assert!(!limiter.can_send());
        assert_eq!(limiter.remaining(), 0);
    }

    #[tokio::test]
    async fn test_acquire_takes_slots() {
        let limiter = RequestLimiter::new(3, 60);
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.remaining(), 1);
    }
}
