//! Application runtime.
//!
//! Builds every component from the configuration and runs the task
//! inventory: discovery refresh, WebSocket ingestion, the dispatcher,
//! the correlation tick, the performance sweep, the notifier, and the
//! storage writer, all under one cancellation token with a bounded
//! drain on shutdown.

use crate::bus::SignalBus;
use crate::config::AppConfig;
use crate::dispatcher::{Dispatcher, ReseedRequest, SignalSink};
use crate::error::AppResult;
use crate::workers::{JobPriority, PriorityWorkerPool};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use pulse_core::ErrorClass;
use pulse_detector::DetectorEngine;
use pulse_discovery::MarketCatalog;
use pulse_history::{CorrelationCandidate, CrossMarketCorrelationDetector, PriceHistoryTracker};
use pulse_notifier::{DeliveryOutcome, PrioritizedNotifier};
use pulse_perf::SignalPerformanceTracker;
use pulse_rest::VenueRestClient;
use pulse_state::MarketStateStore;
use pulse_storage::{spawn_writer, Storage, StorageOp, WriterHandle};
use pulse_telemetry::{metrics, AlertRaiser, HealthMonitor, SystemAlert};
use pulse_ws::{
    ConnectionConfig, ConnectionManager, LocalBookStore, SubscriptionRegistry, WsCommand,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shutdown drain budget.
const DRAIN_BUDGET: Duration = Duration::from_secs(10);

/// Unknown-asset frames per check that trigger a subscription re-diff.
const UNKNOWN_ASSET_REDIFF_THRESHOLD: u64 = 50;

/// Vanished markets re-fetched individually per discovery cycle.
const MAX_VANISHED_REFRESH: usize = 20;

/// Newly subscribed markets whose trade flow is backfilled per cycle.
const MAX_TRADE_BACKFILL: usize = 10;

/// Recent trades pulled per backfilled market.
const TRADE_BACKFILL_LIMIT: usize = 50;

/// The winning outcome of a resolved market is the one priced at ~1.
fn winning_outcome(market: &pulse_core::Market) -> usize {
    market
        .outcome_prices
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// The assembled application.
pub struct Application {
    config: AppConfig,
    rest: Arc<VenueRestClient>,
    catalog: Arc<RwLock<MarketCatalog>>,
    registry: Arc<SubscriptionRegistry>,
    state: Arc<MarketStateStore>,
    history: Arc<PriceHistoryTracker>,
    perf: Arc<SignalPerformanceTracker>,
    bus: Arc<SignalBus>,
    notifier: Arc<PrioritizedNotifier>,
    correlator: Arc<CrossMarketCorrelationDetector>,
    storage: Arc<Storage>,
    health: Arc<HealthMonitor>,
    books: Arc<Mutex<LocalBookStore>>,
    volumes: Arc<Mutex<HashMap<String, f64>>>,
}

impl Application {
    /// Build all components. Storage is opened here so a bad path
    /// fails fast.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let rest = Arc::new(VenueRestClient::new(config.rest.clone())?);
        let catalog = Arc::new(RwLock::new(MarketCatalog::new(config.discovery.clone())));
        let registry = Arc::new(SubscriptionRegistry::new(config.ws.subscription_cap_hint));
        let state = Arc::new(MarketStateStore::new(config.state.clone()));
        let history = Arc::new(PriceHistoryTracker::new(config.history.clone()));
        let perf = Arc::new(SignalPerformanceTracker::new(&config.performance));
        let bus = Arc::new(SignalBus::new(1024));
        let notifier = Arc::new(PrioritizedNotifier::new(
            &config.notifier,
            perf.posteriors(),
        )?);
        let correlator = Arc::new(CrossMarketCorrelationDetector::new(
            config.correlation.clone(),
        ));
        let storage = Arc::new(Storage::open(&config.storage.db_path)?);

        let health = Arc::new(HealthMonitor::new());
        let refresh_secs = config.discovery.clamped_refresh_interval_ms() / 1000;
        health.register("discovery", refresh_secs * 4);
        health.register("correlation", config.correlation_interval_secs * 4);
        health.register("performance", config.performance.sample_sweep_secs * 4);

        Ok(Self {
            config,
            rest,
            catalog,
            registry,
            state,
            history,
            perf,
            bus,
            notifier,
            correlator,
            storage,
            health,
            books: Arc::new(Mutex::new(LocalBookStore::new())),
            volumes: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Run until the token cancels, then drain within the budget.
    pub async fn run(self, shutdown: CancellationToken) -> AppResult<()> {
        info!("Starting surveillance engine");

        let (writer, writer_join) =
            spawn_writer(self.storage.clone(), self.config.storage.queue_capacity);
        let raiser = Arc::new(self.alert_raiser(writer.clone()));
        let pool = PriorityWorkerPool::new(
            self.config.workers.workers,
            self.config.workers.queue_capacity,
        );

        let sink = SignalSink {
            bus: self.bus.clone(),
            writer: Some(writer.clone()),
            perf: self.perf.clone(),
        };

        let (batch_tx, batch_rx) = mpsc::channel(1024);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (reseed_tx, reseed_rx) = mpsc::channel::<ReseedRequest>(256);

        let mut tasks = Vec::new();

        // WebSocket connection. The manager owns the batch sender, so
        // it must live only inside its task for the dispatcher to see
        // the channel close on shutdown.
        {
            let connection = ConnectionManager::new(
                ConnectionConfig {
                    url: self.config.ws.url.clone(),
                    handshake_timeout_ms: self.config.ws.handshake_timeout_ms,
                    heartbeat_interval_ms: self.config.ws.heartbeat_interval_ms,
                    reconnect_interval_ms: self.config.ws.reconnect_interval_ms,
                    max_reconnect_attempts: self.config.ws.max_reconnect_attempts,
                    batch_size: self.config.ws.batch_size,
                    batch_timeout_ms: self.config.ws.batch_timeout_ms,
                },
                self.registry.clone(),
                batch_tx,
            );
            let raiser = raiser.clone();
            tasks.push(tokio::spawn(async move {
                metrics::WS_CONNECTED.set(0.0);
                if let Err(e) = connection.run(cmd_rx).await {
                    raiser.raise_classified(
                        ErrorClass::Permanent,
                        "ws_reconnect_exhausted",
                        "pulse-ws",
                        "reconnect",
                        e.to_string(),
                    );
                }
                metrics::WS_CONNECTED.set(0.0);
            }));
        }

        // Ingestion dispatcher (the per-market single writer).
        let dispatcher = Dispatcher::new(
            self.registry.clone(),
            self.books.clone(),
            self.state.clone(),
            DetectorEngine::new(self.config.microstructure.clone())?,
            self.history.clone(),
            sink.clone(),
            reseed_tx,
            self.volumes.clone(),
            self.config.storage.book_sample_secs,
            self.config.storage.trade_sample_every,
        );
        tasks.push(tokio::spawn(async move {
            dispatcher.run(batch_rx).await;
        }));

        // REST reseed worker for bad or missing books.
        tasks.push(self.spawn_reseed_task(reseed_rx));

        // Discovery refresh loop.
        tasks.push(self.spawn_discovery_task(
            shutdown.clone(),
            cmd_tx.clone(),
            writer.clone(),
            raiser.clone(),
        )?);

        // Cross-market correlation tick.
        tasks.push(self.spawn_correlation_task(shutdown.clone(), sink.clone(), &pool));

        // Performance sweep.
        tasks.push(self.spawn_perf_task(shutdown.clone(), writer.clone()));

        // Notifier consuming the bus.
        {
            let bus = self.bus.clone();
            let notifier = self.notifier.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(signal) = bus.next().await {
                    match notifier.handle(&signal).await {
                        DeliveryOutcome::Delivered(priority) => {
                            metrics::ALERTS_DELIVERED_TOTAL
                                .with_label_values(&[priority.as_str()])
                                .inc();
                        }
                        DeliveryOutcome::Filtered(reason) => {
                            metrics::ALERTS_FILTERED_TOTAL
                                .with_label_values(&[reason.as_str()])
                                .inc();
                        }
                        DeliveryOutcome::Failed => {}
                    }
                }
                info!("Notifier drained");
            }));
        }

        // Health sweep + hourly stats.
        tasks.push(self.spawn_health_task(
            shutdown.clone(),
            raiser.clone(),
            cmd_tx.clone(),
            pool.handle(),
        ));

        // Wait for shutdown, then drain.
        shutdown.cancelled().await;
        info!("Shutdown requested; draining");

        let _ = cmd_tx.send(WsCommand::Shutdown).await;
        self.bus.close();
        drop(cmd_tx);
        drop(sink);
        drop(writer);

        let drain = async {
            for task in tasks {
                let _ = task.await;
            }
        };
        if tokio::time::timeout(DRAIN_BUDGET, drain).await.is_err() {
            warn!("Drain budget exceeded; tasks aborted");
        }
        pool.shutdown().await;
        let _ = tokio::time::timeout(Duration::from_secs(5), writer_join).await;

        info!("Engine stopped");
        Ok(())
    }

    fn alert_raiser(&self, writer: WriterHandle) -> AlertRaiser {
        AlertRaiser::new(
            60,
            Box::new(move |alert: SystemAlert| {
                writer.enqueue(StorageOp::InsertAlert(pulse_storage::SystemAlertRow {
                    name: alert.name,
                    level: alert.level.as_str().to_string(),
                    message: alert.message,
                    component: alert.component,
                    operation: alert.operation,
                    context: alert.context,
                    timestamp: alert.timestamp,
                }));
            }),
        )
    }

    fn spawn_reseed_task(
        &self,
        mut reseed_rx: mpsc::Receiver<ReseedRequest>,
    ) -> tokio::task::JoinHandle<()> {
        let rest = self.rest.clone();
        let books = self.books.clone();
        tokio::spawn(async move {
            while let Some((asset_id, market_id)) = reseed_rx.recv().await {
                match rest.fetch_orderbook(&market_id, &asset_id).await {
                    Ok(snapshot) => {
                        books.lock().seed(
                            &asset_id,
                            &snapshot.bids,
                            &snapshot.asks,
                            snapshot.timestamp,
                        );
                        info!(asset_id = %asset_id, "Book reseeded from REST");
                    }
                    Err(e) => {
                        warn!(asset_id = %asset_id, error = %e, "Book reseed failed");
                    }
                }
            }
        })
    }

    fn spawn_discovery_task(
        &self,
        shutdown: CancellationToken,
        cmd_tx: mpsc::Sender<WsCommand>,
        writer: WriterHandle,
        raiser: Arc<AlertRaiser>,
    ) -> AppResult<tokio::task::JoinHandle<()>> {
        let rest = self.rest.clone();
        let catalog = self.catalog.clone();
        let registry = self.registry.clone();
        let state = self.state.clone();
        let history = self.history.clone();
        let perf = self.perf.clone();
        let volumes = self.volumes.clone();
        let books = self.books.clone();
        let health = self.health.clone();
        let refresh_detectors = DetectorEngine::new(self.config.microstructure.clone())?;
        let sink = SignalSink {
            bus: self.bus.clone(),
            writer: Some(writer.clone()),
            perf: self.perf.clone(),
        };
        let interval_ms = self.config.discovery.clamped_refresh_interval_ms();

        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let started = std::time::Instant::now();
                let raw = match rest.list_event_markets().await {
                    Ok(raw) => {
                        metrics::REST_REQUESTS_TOTAL
                            .with_label_values(&["ok"])
                            .inc();
                        raw
                    }
                    Err(e) => {
                        // Keep the previous market set; ingestion keeps
                        // running against the stale subscriptions.
                        metrics::REST_REQUESTS_TOTAL
                            .with_label_values(&["error"])
                            .inc();
                        metrics::DISCOVERY_REFRESH_SECONDS
                            .with_label_values(&["error"])
                            .observe(started.elapsed().as_secs_f64());
                        raiser.raise_classified(
                            e.class(),
                            "discovery_refresh_failed",
                            "pulse-discovery",
                            "refresh",
                            e.to_string(),
                        );
                        continue;
                    }
                };

                let now = Utc::now();
                let (diff, targets, refreshed) = {
                    let mut catalog = catalog.write();
                    let diff = catalog.apply(raw, now);
                    let targets = catalog.subscription_targets();
                    let refreshed: Vec<pulse_core::Market> =
                        catalog.all().cloned().collect();
                    (diff, targets, refreshed)
                };

                metrics::MARKETS_BY_TIER
                    .with_label_values(&["ACTIVE"])
                    .set(diff.active as f64);
                metrics::MARKETS_BY_TIER
                    .with_label_values(&["WATCHLIST"])
                    .set(diff.watchlist as f64);
                metrics::MARKETS_BY_TIER
                    .with_label_values(&["IGNORED"])
                    .set(diff.ignored as f64);

                // Update the routing table and push the diff on-socket.
                let sub_diff = registry.set_desired(&targets);
                let new_markets: Vec<String> = {
                    let added: std::collections::HashSet<&str> =
                        sub_diff.added.iter().map(|s| s.as_str()).collect();
                    targets
                        .iter()
                        .filter(|(a, _, i)| *i == 0 && added.contains(a.as_str()))
                        .map(|(_, m, _)| m.clone())
                        .collect()
                };
                if !sub_diff.is_empty() {
                    let _ = cmd_tx.send(WsCommand::ApplyDiff(sub_diff)).await;
                }

                // Warm the trade-flow series of newly subscribed
                // markets from the venue's recent-trades endpoint.
                for market_id in new_markets.into_iter().take(MAX_TRADE_BACKFILL) {
                    match rest.fetch_trades(&market_id, TRADE_BACKFILL_LIMIT).await {
                        Ok(ticks) => {
                            for tick in &ticks {
                                state.ingest_trade(tick);
                            }
                        }
                        Err(e) => {
                            warn!(market_id = %market_id, error = %e, "Trade backfill failed");
                        }
                    }
                }

                // Per-market refresh work.
                let mut monitored_ids: Vec<String> = Vec::new();
                for market in &refreshed {
                    writer.enqueue(StorageOp::UpsertMarket(Box::new(market.clone())));

                    if market.closed {
                        let winning = winning_outcome(market);
                        for record in perf.record_resolution(&market.id, winning, now) {
                            writer.enqueue(StorageOp::UpdatePerformance(Box::new(record)));
                        }
                        continue;
                    }
                    if !market.tier.is_subscribed() {
                        continue;
                    }
                    monitored_ids.push(market.id.clone());
                    volumes.lock().insert(market.id.clone(), market.volume);

                    // Outcome prices go to the append-only price log.
                    for (i, price) in market.outcome_prices.iter().enumerate() {
                        writer.enqueue(StorageOp::AppendPrice {
                            market_id: market.id.clone(),
                            timestamp: now,
                            outcome_index: i,
                            price: *price,
                            volume: market.volume,
                        });
                    }

                    // Refresh-driven detectors (volume spike, price move).
                    let snap = state.ingest_volume(&market.id, market.volume);
                    for signal in refresh_detectors.evaluate_refresh(&snap) {
                        sink.emit(signal, snap.mid_price, market.volume);
                    }
                }

                // Drop state for markets that left the monitored set.
                let keep: std::collections::HashSet<String> =
                    monitored_ids.into_iter().collect();
                let _ = state.retain(|id| keep.contains(id));
                history.retain(|id| keep.contains(id));
                let keep_assets: std::collections::HashSet<String> =
                    targets.iter().map(|(a, _, _)| a.clone()).collect();
                books.lock().retain(|a| keep_assets.contains(a));
                volumes.lock().retain(|id, _| keep.contains(id));

                // Markets that dropped out of the active feed:
                // re-fetch individually so closures are observed.
                let vanished = catalog.read().vanished(now);
                for market_id in vanished.into_iter().take(MAX_VANISHED_REFRESH) {
                    match rest.fetch_market(&market_id).await {
                        Ok(Some(raw_market)) => {
                            catalog.write().apply(vec![raw_market], Utc::now());
                            let updated = catalog.read().get(&market_id).cloned();
                            if let Some(market) = updated {
                                writer.enqueue(StorageOp::UpsertMarket(Box::new(market.clone())));
                                if market.closed {
                                    let winning = winning_outcome(&market);
                                    for record in
                                        perf.record_resolution(&market.id, winning, Utc::now())
                                    {
                                        writer.enqueue(StorageOp::UpdatePerformance(Box::new(
                                            record,
                                        )));
                                    }
                                }
                            }
                        }
                        Ok(None) => {
                            // Delisted upstream; retention GC reaps it.
                        }
                        Err(e) => {
                            warn!(market_id = %market_id, error = %e, "Vanished-market refresh failed");
                        }
                    }
                }

                metrics::DISCOVERY_REFRESH_SECONDS
                    .with_label_values(&["ok"])
                    .observe(started.elapsed().as_secs_f64());
                health.beat("discovery");
                info!(
                    discovered = diff.discovered,
                    active = diff.active,
                    watchlist = diff.watchlist,
                    elapsed_ms = started.elapsed().as_millis(),
                    "Discovery cycle complete"
                );
            }
        }))
    }

    fn spawn_correlation_task(
        &self,
        shutdown: CancellationToken,
        sink: SignalSink,
        pool: &PriorityWorkerPool,
    ) -> tokio::task::JoinHandle<()> {
        let catalog = self.catalog.clone();
        let history = self.history.clone();
        let state = self.state.clone();
        let correlator = self.correlator.clone();
        let health = self.health.clone();
        let interval = Duration::from_secs(self.config.correlation_interval_secs);
        // The pool outlives this task; submissions go through a handle.
        let submit = pool.handle();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let candidates: Vec<CorrelationCandidate> = catalog
                    .read()
                    .monitored()
                    .map(|m| CorrelationCandidate {
                        market_id: m.id.clone(),
                        category: m.category,
                        volume: m.volume,
                    })
                    .collect();
                if candidates.is_empty() {
                    continue;
                }

                let history = history.clone();
                let state = state.clone();
                let correlator = correlator.clone();
                let sink = sink.clone();
                let size = candidates.len();
                submit.submit(JobPriority::High, size, move || {
                    for signal in correlator.evaluate(&candidates, &history) {
                        let entry = state
                            .snapshot(&signal.market_id)
                            .and_then(|s| s.mid_price);
                        sink.emit(signal, entry, 0.0);
                    }
                });
                health.beat("correlation");
            }
        })
    }

    fn spawn_perf_task(
        &self,
        shutdown: CancellationToken,
        writer: WriterHandle,
    ) -> tokio::task::JoinHandle<()> {
        let perf = self.perf.clone();
        let state = self.state.clone();
        let health = self.health.clone();
        let sweep = Duration::from_secs(self.config.performance.sample_sweep_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let now = Utc::now();
                for (signal_id, market_id, horizon) in perf.due(now) {
                    // A vanished market samples as unavailable.
                    let price = state.snapshot(&market_id).and_then(|s| s.mid_price);
                    match perf.sample_horizon(&signal_id, horizon, price) {
                        Ok(record) => {
                            writer.enqueue(StorageOp::UpdatePerformance(Box::new(record)));
                        }
                        Err(e) => warn!(signal_id = %signal_id, error = %e, "Horizon sample failed"),
                    }
                }
                metrics::PERF_OPEN_RECORDS.set(perf.open_records() as f64);
                health.beat("performance");
            }
        })
    }

    fn spawn_health_task(
        &self,
        shutdown: CancellationToken,
        raiser: Arc<AlertRaiser>,
        cmd_tx: mpsc::Sender<WsCommand>,
        pool: crate::workers::WorkerHandle,
    ) -> tokio::task::JoinHandle<()> {
        let health = self.health.clone();
        let registry = self.registry.clone();
        let notifier = self.notifier.clone();
        let perf = self.perf.clone();

        tokio::spawn(async move {
            let mut check = tokio::time::interval(Duration::from_secs(60));
            check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut stats_countdown = 60u32;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = check.tick() => {}
                }

                for component in health.unhealthy() {
                    raiser.raise_classified(
                        ErrorClass::Resource,
                        &format!("component_stale_{}", component.name),
                        &component.name,
                        "heartbeat",
                        format!("no heartbeat for {}s", component.silence_secs),
                    );
                }

                // A burst of unresolvable frames means the venue and the
                // registry disagree; re-publish the subscription set.
                let unknown = registry.take_unknown_count();
                if unknown > UNKNOWN_ASSET_REDIFF_THRESHOLD {
                    warn!(unknown, "Unknown-asset burst; re-publishing subscriptions");
                    let rediff = pulse_ws::SubscriptionDiff {
                        added: registry.desired_assets(),
                        removed: Vec::new(),
                    };
                    let _ = cmd_tx.send(WsCommand::ApplyDiff(rediff)).await;
                } else if unknown > 0 {
                    warn!(unknown, "Unknown-asset frames since last check");
                }

                metrics::WORKER_QUEUE_DEPTH
                    .with_label_values(&["all"])
                    .set(pool.queue_depth() as f64);

                // Hourly posterior and delivery summary.
                stats_countdown = stats_countdown.saturating_sub(1);
                if stats_countdown == 0 {
                    stats_countdown = 60;
                    let stats = notifier.stats();
                    info!(
                        delivered = stats.delivered,
                        filtered = stats.filtered_total(),
                        failed = stats.failed,
                        open_records = perf.open_records(),
                        "Hourly delivery summary"
                    );
                    for posterior in perf.posteriors().all() {
                        info!(
                            signal_type = %posterior.signal_type,
                            samples = posterior.samples,
                            accuracy = posterior.accuracy(),
                            sharpe = posterior.sharpe(),
                            kelly = posterior.kelly_fraction(),
                            confidence = posterior.bayesian_confidence(),
                            "Posterior summary"
                        );
                    }
                }
            }
        })
    }
}
