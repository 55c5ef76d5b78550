//! Application configuration.
//!
//! TOML file with serde defaults, then environment overrides for the
//! deployment-specific values (hosts, webhook, database path).

use crate::error::{AppError, AppResult};
use pulse_detector::DetectorConfig;
use pulse_discovery::DiscoveryConfig;
use pulse_history::{CorrelationConfig, HistoryConfig};
use pulse_notifier::NotifierConfig;
use pulse_perf::PerfConfig;
use pulse_rest::RestConfig;
use pulse_state::StateConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// WebSocket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsSettings {
    #[serde(default = "default_ws_url")]
    pub url: String,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// 0 = retry forever.
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    /// Starting per-socket subscription chunk; shrinks on rejection.
    #[serde(default = "default_subscription_cap_hint")]
    pub subscription_cap_hint: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
}

fn default_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string()
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    10_000
}

fn default_reconnect_interval_ms() -> u64 {
    1_000
}

fn default_subscription_cap_hint() -> usize {
    500
}

fn default_batch_size() -> usize {
    64
}

fn default_batch_timeout_ms() -> u64 {
    50
}

impl Default for WsSettings {
    fn default() -> Self {
        Self {
            url: default_ws_url(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_reconnect_attempts: 0,
            subscription_cap_hint: default_subscription_cap_hint(),
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
        }
    }
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Persist one book snapshot per market per this many seconds.
    #[serde(default = "default_book_sample_secs")]
    pub book_sample_secs: u64,
    /// Persist one of every N trade ticks.
    #[serde(default = "default_trade_sample_every")]
    pub trade_sample_every: u64,
}

fn default_db_path() -> String {
    "pulse.db".to_string()
}

fn default_queue_capacity() -> usize {
    8_192
}

fn default_book_sample_secs() -> u64 {
    60
}

fn default_trade_sample_every() -> u64 {
    5
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            queue_capacity: default_queue_capacity(),
            book_sample_secs: default_book_sample_secs(),
            trade_sample_every: default_trade_sample_every(),
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    #[serde(default = "default_worker_count")]
    pub workers: usize,
    #[serde(default = "default_worker_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_worker_count() -> usize {
    2
}

fn default_worker_queue_capacity() -> usize {
    256
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
            queue_capacity: default_worker_queue_capacity(),
        }
    }
}

/// The full configuration surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub rest: RestConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub ws: WsSettings,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub microstructure: DetectorConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub performance: PerfConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub workers: WorkerSettings,
    /// Correlation sweep cadence.
    #[serde(default = "default_correlation_interval_secs")]
    pub correlation_interval_secs: u64,
}

fn default_correlation_interval_secs() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rest: RestConfig::default(),
            discovery: DiscoveryConfig::default(),
            ws: WsSettings::default(),
            state: StateConfig::default(),
            microstructure: DetectorConfig::default(),
            history: HistoryConfig::default(),
            correlation: CorrelationConfig::default(),
            performance: PerfConfig::default(),
            notifier: NotifierConfig::default(),
            storage: StorageSettings::default(),
            workers: WorkerSettings::default(),
            correlation_interval_secs: default_correlation_interval_secs(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file, falling back to defaults, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .map_err(|e| AppError::Config(format!("read {}: {e}", p.display())))?;
                toml::from_str(&text)
                    .map_err(|e| AppError::Config(format!("parse {}: {e}", p.display())))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Environment overrides for deployment-specific values.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("PULSE_GAMMA_URL") {
            self.rest.gamma_url = url;
        }
        if let Ok(url) = std::env::var("PULSE_CLOB_URL") {
            self.rest.clob_url = url;
        }
        if let Ok(url) = std::env::var("PULSE_WS_URL") {
            self.ws.url = url;
        }
        if let Ok(url) = std::env::var("PULSE_WEBHOOK_URL") {
            if !url.is_empty() {
                self.notifier.webhook_url = Some(url);
            }
        }
        if let Ok(path) = std::env::var("PULSE_DB_PATH") {
            self.storage.db_path = path;
        }
    }
}
