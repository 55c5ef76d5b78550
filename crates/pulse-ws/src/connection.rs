//! WebSocket connection lifecycle.
//!
//! The lifecycle is an explicit state machine, kept separate from the
//! socket I/O so reconnection policy is testable on its own:
//!
//! `Disconnected -> Connecting -> Open -> Disconnected` on close/error/
//! heartbeat loss, `Connecting -> Failed` on handshake failure, and
//! `Failed -> Connecting` after backoff until the attempt budget is
//! spent, which parks the endpoint in `PermanentlyFailed`.

use crate::batch::FrameBatcher;
use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatMonitor;
use crate::message::{decode_frame, operation_payload, subscribe_payload, WsEvent};
use crate::registry::{SubscriptionDiff, SubscriptionRegistry};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL for the market channel.
    pub url: String,
    /// Handshake timeout.
    pub handshake_timeout_ms: u64,
    /// Heartbeat interval; silence beyond twice this kills the socket.
    pub heartbeat_interval_ms: u64,
    /// Base reconnect delay for exponential backoff.
    pub reconnect_interval_ms: u64,
    /// Maximum reconnect attempts (0 = unbounded).
    pub max_reconnect_attempts: u32,
    /// Frames per dispatch batch.
    pub batch_size: usize,
    /// Flush latency bound for partial batches.
    pub batch_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            handshake_timeout_ms: 10_000,
            heartbeat_interval_ms: 10_000,
            reconnect_interval_ms: 1_000,
            max_reconnect_attempts: 0,
            batch_size: 64,
            batch_timeout_ms: 50,
        }
    }
}

/// Lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Failed,
    PermanentlyFailed,
}

/// Commands from the dispatcher.
#[derive(Debug)]
pub enum WsCommand {
    /// Publish a subscription diff on the live socket.
    ApplyDiff(SubscriptionDiff),
    /// Close and stop reconnecting.
    Shutdown,
}

/// A dispatched batch: events grouped by frame kind.
pub type EventBatch = Vec<(&'static str, Vec<WsEvent>)>;

/// Cap on reconnect backoff.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Reconnect backoff: `base * 2^attempt`, capped at 30s.
pub fn reconnect_delay(base_ms: u64, attempt: u32) -> Duration {
    let exp = attempt.min(10);
    let delay = Duration::from_millis(base_ms.saturating_mul(1 << exp));
    delay.min(MAX_RECONNECT_DELAY)
}

/// Manages one long-lived connection.
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: Arc<RwLock<ConnectionState>>,
    registry: Arc<SubscriptionRegistry>,
    heartbeat: HeartbeatMonitor,
    batch_tx: mpsc::Sender<EventBatch>,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        registry: Arc<SubscriptionRegistry>,
        batch_tx: mpsc::Sender<EventBatch>,
    ) -> Self {
        let heartbeat = HeartbeatMonitor::new(config.heartbeat_interval_ms);
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            registry,
            heartbeat,
            batch_tx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.write();
        if *state != next {
            debug!(from = ?*state, to = ?next, "Connection state transition");
            *state = next;
        }
    }

    /// Run the connection until shutdown or attempt exhaustion.
    pub async fn run(&self, mut cmd_rx: mpsc::Receiver<WsCommand>) -> WsResult<()> {
        let mut attempt = 0u32;

        loop {
            self.set_state(ConnectionState::Connecting);

            match self.connect_and_stream(&mut cmd_rx).await {
                Ok(()) => {
                    info!("WebSocket shut down cleanly");
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
                Err(WsError::HandshakeTimeout(ms)) => {
                    self.set_state(ConnectionState::Failed);
                    warn!(timeout_ms = ms, "Handshake timed out");
                }
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    error!(error = %e, "WebSocket connection lost");
                }
            }

            attempt += 1;
            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                self.set_state(ConnectionState::PermanentlyFailed);
                error!(attempt, "Reconnect attempts exhausted; endpoint marked failed");
                return Err(WsError::ReconnectExhausted(attempt));
            }

            let delay = reconnect_delay(self.config.reconnect_interval_ms, attempt - 1);
            warn!(attempt, delay_ms = delay.as_millis(), "Reconnecting");
            tokio::time::sleep(delay).await;
        }
    }

    async fn connect_and_stream(&self, cmd_rx: &mut mpsc::Receiver<WsCommand>) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting to market WebSocket");

        let handshake = tokio::time::timeout(
            Duration::from_millis(self.config.handshake_timeout_ms),
            connect_async(&self.config.url),
        )
        .await
        .map_err(|_| WsError::HandshakeTimeout(self.config.handshake_timeout_ms))?;
        let (ws_stream, _response) = handshake?;
        let (mut write, mut read) = ws_stream.split();

        self.set_state(ConnectionState::Open);
        self.heartbeat.reset();
        info!("Market WebSocket connected");

        // Every desired asset goes back to pending and is re-published.
        self.registry.reset_to_pending();
        let assets = self.registry.desired_assets();
        self.publish_chunked(&mut write, &assets, true).await?;

        let mut batcher = FrameBatcher::new(self.config.batch_size, self.config.batch_timeout_ms);
        let mut hb_timer = tokio::time::interval(self.heartbeat.check_period());
        let mut flush_timer =
            tokio::time::interval(Duration::from_millis(self.config.batch_timeout_ms.max(10) / 2).max(Duration::from_millis(5)));

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.heartbeat.record_inbound();
                            self.handle_text(&text, &mut batcher).await?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.heartbeat.record_inbound();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat.record_inbound();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "normal close".to_string()));
                            warn!(code, %reason, "Server closed WebSocket");
                            self.flush(&mut batcher).await;
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            self.flush(&mut batcher).await;
                            return Err(e.into());
                        }
                        None => {
                            self.flush(&mut batcher).await;
                            return Err(WsError::ConnectionClosed {
                                code: 1006,
                                reason: "stream ended".to_string(),
                            });
                        }
                        _ => {}
                    }
                }

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(WsCommand::ApplyDiff(diff)) => {
                            if !diff.removed.is_empty() {
                                let payload = operation_payload(&diff.removed, false);
                                write.send(Message::Text(payload)).await?;
                            }
                            self.publish_chunked(&mut write, &diff.added, false).await?;
                        }
                        Some(WsCommand::Shutdown) | None => {
                            self.flush(&mut batcher).await;
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(());
                        }
                    }
                }

                _ = hb_timer.tick() => {
                    if self.heartbeat.is_timed_out() {
                        self.flush(&mut batcher).await;
                        return Err(WsError::HeartbeatTimeout);
                    }
                    if self.heartbeat.should_ping() {
                        write.send(Message::Text("PING".to_string())).await?;
                        self.heartbeat.record_ping_sent();
                    }
                }

                _ = flush_timer.tick() => {
                    if batcher.is_due() {
                        self.flush(&mut batcher).await;
                    }
                }
            }
        }
    }

    async fn handle_text(&self, text: &str, batcher: &mut FrameBatcher) -> WsResult<()> {
        let events = match decode_frame(text) {
            Ok(events) => events,
            Err(e) => {
                // Malformed payloads are dropped and counted, never fatal.
                warn!(error = %e, "Undecodable frame dropped");
                return Ok(());
            }
        };
        for event in events {
            match &event {
                WsEvent::Pong => continue,
                WsEvent::SubscriptionAck { accepted, detail } if !accepted => {
                    self.registry.record_rejection(self.registry.chunk_size());
                    warn!(detail = %detail, "Subscription batch rejected");
                    continue;
                }
                _ => {}
            }
            if let Some(batch) = batcher.push(event) {
                self.dispatch(batch).await;
            }
        }
        Ok(())
    }

    async fn flush(&self, batcher: &mut FrameBatcher) {
        if batcher.pending() > 0 {
            let batch = batcher.flush();
            self.dispatch(batch).await;
        }
    }

    async fn dispatch(&self, batch: EventBatch) {
        if self.batch_tx.send(batch).await.is_err() {
            warn!("Batch receiver dropped");
        }
    }

    /// Publish subscriptions in chunks bounded by the discovered cap.
    async fn publish_chunked<S>(
        &self,
        write: &mut S,
        assets: &[String],
        initial: bool,
    ) -> WsResult<()>
    where
        S: SinkExt<Message> + Unpin,
        WsError: From<S::Error>,
    {
        if assets.is_empty() {
            return Ok(());
        }
        let chunk_size = self.registry.chunk_size();
        for chunk in assets.chunks(chunk_size) {
            let payload = if initial {
                subscribe_payload(chunk)
            } else {
                operation_payload(chunk, true)
            };
            write.send(Message::Text(payload)).await?;
            self.registry.mark_active(chunk);
            debug!(count = chunk.len(), initial, "Published subscription chunk");
        }
        info!(total = assets.len(), "Subscriptions published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_delay_exponential_and_capped() {
        assert_eq!(reconnect_delay(1_000, 0), Duration::from_millis(1_000));
        assert_eq!(reconnect_delay(1_000, 1), Duration::from_millis(2_000));
        assert_eq!(reconnect_delay(1_000, 3), Duration::from_millis(8_000));
        assert_eq!(reconnect_delay(1_000, 9), Duration::from_secs(30));
        assert_eq!(reconnect_delay(1_000, 30), Duration::from_secs(30));
    }

    #[test]
    fn test_initial_state() {
        let registry = Arc::new(SubscriptionRegistry::new(500));
        let (tx, _rx) = mpsc::channel(8);
        let mgr = ConnectionManager::new(ConnectionConfig::default(), registry, tx);
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_default_config() {
        let cfg = ConnectionConfig::default();
        assert_eq!(cfg.max_reconnect_attempts, 0);
        assert_eq!(cfg.batch_size, 64);
    }
}
