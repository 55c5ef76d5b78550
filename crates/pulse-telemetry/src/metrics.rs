//! Prometheus metrics.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally: a registration
//! failure means duplicate metric names, a fatal configuration error
//! that should crash at startup, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec,
    Gauge, GaugeVec, HistogramVec, TextEncoder,
};

/// WebSocket connection state (1 = connected).
pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("pulse_ws_connected", "WebSocket connection state (1=open)").unwrap()
});

/// Reconnection attempts by reason.
pub static WS_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_ws_reconnect_total",
        "Total WebSocket reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Inbound frames by kind.
pub static WS_FRAMES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_ws_frames_total",
        "Inbound WebSocket frames",
        &["kind"]
    )
    .unwrap()
});

/// Frames dropped because the asset id was unknown.
pub static WS_UNKNOWN_ASSET_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_ws_unknown_asset_total",
        "Frames dropped for unresolvable asset ids",
        &["kind"]
    )
    .unwrap()
});

/// Markets by tier after each refresh.
pub static MARKETS_BY_TIER: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "pulse_markets_by_tier",
        "Tracked markets per tier",
        &["tier"]
    )
    .unwrap()
});

/// Discovery refresh duration.
pub static DISCOVERY_REFRESH_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pulse_discovery_refresh_seconds",
        "Discovery refresh cycle duration",
        &["outcome"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap()
});

/// Signals emitted by type.
pub static SIGNALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_signals_total",
        "Early signals emitted",
        &["signal_type", "direction"]
    )
    .unwrap()
});

/// Alerts delivered by priority.
pub static ALERTS_DELIVERED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_alerts_delivered_total",
        "Alerts delivered to the webhook",
        &["priority"]
    )
    .unwrap()
});

/// Alerts filtered by reason.
pub static ALERTS_FILTERED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_alerts_filtered_total",
        "Alerts filtered before delivery",
        &["reason"]
    )
    .unwrap()
});

/// REST request outcomes.
pub static REST_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_rest_requests_total",
        "REST requests by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Storage writes dropped from the queue.
pub static STORAGE_DROPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_storage_dropped_total",
        "Storage writes dropped by backpressure",
        &["op"]
    )
    .unwrap()
});

/// Signal-bus drops by priority.
pub static BUS_DROPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_bus_dropped_total",
        "Signal bus entries dropped under backpressure",
        &["priority"]
    )
    .unwrap()
});

/// Open performance records awaiting horizons.
pub static PERF_OPEN_RECORDS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "pulse_perf_open_records",
        "Open signal performance records"
    )
    .unwrap()
});

/// Stats worker queue depth by priority.
pub static WORKER_QUEUE_DEPTH: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "pulse_worker_queue_depth",
        "Priority worker queue depth",
        &["priority"]
    )
    .unwrap()
});

/// Render all metrics in the Prometheus text format.
pub fn render() -> crate::error::TelemetryResult<String> {
    let encoder = TextEncoder::new();
    encoder
        .encode_to_string(&prometheus::gather())
        .map_err(|e| crate::error::TelemetryError::MetricsEncoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_and_render() {
        WS_CONNECTED.set(1.0);
        WS_FRAMES_TOTAL.with_label_values(&["book"]).inc();
        SIGNALS_TOTAL
            .with_label_values(&["orderbook_imbalance", "bullish"])
            .inc();
        let text = render().unwrap();
        assert!(text.contains("pulse_ws_connected"));
        assert!(text.contains("pulse_signals_total"));
    }
}
