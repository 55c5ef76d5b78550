//! Frame batching.
//!
//! Inbound events are buffered per connection and flushed when the
//! batch fills or the timeout lapses. A flush groups events by frame
//! type, preserving arrival order inside each group, so the dispatcher
//! handles each type once per batch.

use crate::message::WsEvent;
use std::time::{Duration, Instant};

/// Buffers events into type-grouped batches.
pub struct FrameBatcher {
    batch_size: usize,
    batch_timeout: Duration,
    buffer: Vec<WsEvent>,
    started: Option<Instant>,
}

impl FrameBatcher {
    pub fn new(batch_size: usize, batch_timeout_ms: u64) -> Self {
        Self {
            batch_size: batch_size.max(1),
            batch_timeout: Duration::from_millis(batch_timeout_ms),
            buffer: Vec::new(),
            started: None,
        }
    }

    /// Add an event; returns a flushed batch when the buffer filled.
    pub fn push(&mut self, event: WsEvent) -> Option<Vec<(&'static str, Vec<WsEvent>)>> {
        if self.buffer.is_empty() {
            self.started = Some(Instant::now());
        }
        self.buffer.push(event);
        (self.buffer.len() >= self.batch_size).then(|| self.flush())
    }

    /// Whether the timeout flush is due.
    pub fn is_due(&self) -> bool {
        !self.buffer.is_empty()
            && self
                .started
                .is_some_and(|t| t.elapsed() >= self.batch_timeout)
    }

    /// Time remaining until the pending batch must flush.
    pub fn time_until_due(&self) -> Option<Duration> {
        self.started
            .filter(|_| !self.buffer.is_empty())
            .map(|t| self.batch_timeout.saturating_sub(t.elapsed()))
    }

    /// Flush the buffer, grouped by event kind, arrival order kept
    /// within each group.
    pub fn flush(&mut self) -> Vec<(&'static str, Vec<WsEvent>)> {
        self.started = None;
        let mut groups: Vec<(&'static str, Vec<WsEvent>)> = Vec::new();
        for event in self.buffer.drain(..) {
            let kind = event.kind();
            match groups.iter_mut().find(|(k, _)| *k == kind) {
                Some((_, group)) => group.push(event),
                None => groups.push((kind, vec![event])),
            }
        }
        groups
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
