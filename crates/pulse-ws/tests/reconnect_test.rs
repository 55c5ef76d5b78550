//! Integration test: reconnection republishes the subscription set.
//!
//! Runs a mock WebSocket server, kills the first connection, and
//! verifies the client reconnects and republishes every subscription
//! exactly once per connection.

use futures_util::{SinkExt, StreamExt};
use pulse_ws::{ConnectionConfig, ConnectionManager, SubscriptionRegistry, WsCommand};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Mock market-channel server that records subscribe payloads and can
/// kick live connections.
struct MockVenue {
    addr: SocketAddr,
    subscribes: Arc<Mutex<Vec<serde_json::Value>>>,
    connections: Arc<Mutex<u32>>,
    kick_tx: broadcast::Sender<()>,
}

impl MockVenue {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let subscribes: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
        let connections: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let (kick_tx, _) = broadcast::channel(4);

        let subs = subscribes.clone();
        let conns = connections.clone();
        let kicker = kick_tx.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(handle_connection(
                    stream,
                    subs.clone(),
                    conns.clone(),
                    kicker.subscribe(),
                ));
            }
        });

        Self {
            addr,
            subscribes,
            connections,
            kick_tx,
        }
    }

    fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    async fn subscribe_payloads(&self) -> Vec<serde_json::Value> {
        self.subscribes.lock().await.clone()
    }

    fn kick_all(&self) {
        let _ = self.kick_tx.send(());
    }
}

async fn handle_connection(
    stream: TcpStream,
    subscribes: Arc<Mutex<Vec<serde_json::Value>>>,
    connections: Arc<Mutex<u32>>,
    mut kick_rx: broadcast::Receiver<()>,
) {
    *connections.lock().await += 1;
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.eq_ignore_ascii_case("ping") {
                            let _ = write.send(Message::Text("PONG".to_string())).await;
                            continue;
                        }
                        if let Ok(v) = serde_json::from_str::<serde_json::Value>(&text) {
                            if v.get("assets_ids").is_some() {
                                subscribes.lock().await.push(v);
                            }
                        }
                    }
                    Some(Ok(_)) => {}
                    _ => return,
                }
            }
            _ = kick_rx.recv() => {
                let _ = write.send(Message::Close(None)).await;
                return;
            }
        }
    }
}

async fn wait_until<F, Fut>(mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if cond().await {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_reconnect_republishes_subscriptions_without_duplicates() {
    let venue = MockVenue::start().await;

    let registry = Arc::new(SubscriptionRegistry::new(500));
    registry.set_desired(&[
        ("asset-a".to_string(), "mkt-a".to_string(), 0),
        ("asset-b".to_string(), "mkt-b".to_string(), 0),
        ("asset-c".to_string(), "mkt-c".to_string(), 0),
    ]);

    let config = ConnectionConfig {
        url: venue.url(),
        reconnect_interval_ms: 100,
        heartbeat_interval_ms: 60_000,
        ..Default::default()
    };

    let (batch_tx, _batch_rx) = mpsc::channel(64);
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let manager = Arc::new(ConnectionManager::new(config, registry.clone(), batch_tx));

    let runner = manager.clone();
    let handle = tokio::spawn(async move { runner.run(cmd_rx).await });

    // First connection publishes all three subscriptions.
    wait_until(|| async { venue.connection_count().await >= 1 }).await;
    wait_until(|| async { !venue.subscribe_payloads().await.is_empty() }).await;

    // Kill the socket; the client must reconnect and republish.
    venue.kick_all();
    wait_until(|| async { venue.connection_count().await >= 2 }).await;
    wait_until(|| async { venue.subscribe_payloads().await.len() >= 2 }).await;

    let payloads = venue.subscribe_payloads().await;
    // One initial subscribe per connection, no incremental duplicates.
    assert_eq!(payloads.len(), 2, "payloads: {payloads:?}");
    for payload in &payloads {
        let mut ids: Vec<String> = payload["assets_ids"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["asset-a", "asset-b", "asset-c"]);
    }

    let _ = cmd_tx.send(WsCommand::Shutdown).await;
    let _ = handle.await;
}

#[tokio::test]
async fn test_diff_publishes_incremental_subscribe() {
    let venue = MockVenue::start().await;

    let registry = Arc::new(SubscriptionRegistry::new(500));
    registry.set_desired(&[("asset-a".to_string(), "mkt-a".to_string(), 0)]);

    let config = ConnectionConfig {
        url: venue.url(),
        heartbeat_interval_ms: 60_000,
        ..Default::default()
    };

    let (batch_tx, _batch_rx) = mpsc::channel(64);
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let manager = Arc::new(ConnectionManager::new(config, registry.clone(), batch_tx));
    let runner = manager.clone();
    let handle = tokio::spawn(async move { runner.run(cmd_rx).await });

    wait_until(|| async { !venue.subscribe_payloads().await.is_empty() }).await;

    // Market set changes: one added asset rides an operation payload.
    let diff = registry.set_desired(&[
        ("asset-a".to_string(), "mkt-a".to_string(), 0),
        ("asset-b".to_string(), "mkt-b".to_string(), 0),
    ]);
    cmd_tx.send(WsCommand::ApplyDiff(diff)).await.unwrap();

    wait_until(|| async { venue.subscribe_payloads().await.len() >= 2 }).await;
    let payloads = venue.subscribe_payloads().await;
    let last = payloads.last().unwrap();
    assert_eq!(last["operation"], "subscribe");
    assert_eq!(last["assets_ids"][0], "asset-b");

    let _ = cmd_tx.send(WsCommand::Shutdown).await;
    let _ = handle.await;
}
