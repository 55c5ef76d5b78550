//! System alerts with per-key throttling.
//!
//! Implements the error-taxonomy policy: permanent and logic errors
//! raise alerts, resource errors raise throttled alerts, transient
//! errors only log. The sink is injected so telemetry stays free of a
//! storage dependency.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use pulse_core::ErrorClass;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{error, warn};

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }

    /// Default level for an error class.
    pub fn for_class(class: ErrorClass) -> Self {
        match class {
            ErrorClass::Transient => Self::Warning,
            ErrorClass::Permanent => Self::Error,
            ErrorClass::Resource => Self::Warning,
            ErrorClass::Logic => Self::Critical,
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One system alert bound for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemAlert {
    pub name: String,
    pub level: AlertLevel,
    pub message: String,
    pub component: String,
    pub operation: String,
    pub context: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

type AlertSink = Box<dyn Fn(SystemAlert) + Send + Sync>;

/// Raises alerts into an injected sink, throttled per alert name.
pub struct AlertRaiser {
    sink: AlertSink,
    throttle_window: Duration,
    last_raised: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl AlertRaiser {
    pub fn new(throttle_window_secs: u64, sink: AlertSink) -> Self {
        Self {
            sink,
            throttle_window: Duration::seconds(throttle_window_secs as i64),
            last_raised: Mutex::new(HashMap::new()),
        }
    }

    /// Raise an alert; repeats of the same name inside the throttle
    /// window are logged but not sunk. CRITICAL is never throttled.
    pub fn raise(&self, alert: SystemAlert) -> bool {
        let now = Utc::now();
        if alert.level < AlertLevel::Critical {
            let mut last = self.last_raised.lock();
            if let Some(&t) = last.get(&alert.name) {
                if now - t < self.throttle_window {
                    warn!(name = %alert.name, "Alert throttled");
                    return false;
                }
            }
            last.insert(alert.name.clone(), now);
        }

        match alert.level {
            AlertLevel::Critical | AlertLevel::Error => error!(
                name = %alert.name,
                level = %alert.level,
                component = %alert.component,
                message = %alert.message,
                "System alert"
            ),
            _ => warn!(
                name = %alert.name,
                level = %alert.level,
                component = %alert.component,
                message = %alert.message,
                "System alert"
            ),
        }
        (self.sink)(alert);
        true
    }

    /// Convenience wrapper classifying by `ErrorClass`.
    pub fn raise_classified(
        &self,
        class: ErrorClass,
        name: &str,
        component: &str,
        operation: &str,
        message: String,
    ) -> bool {
        self.raise(SystemAlert {
            name: name.to_string(),
            level: AlertLevel::for_class(class),
            message,
            component: component.to_string(),
            operation: operation.to_string(),
            context: Some(serde_json::json!({ "class": class.as_str() })),
            timestamp: Utc::now(),
        })
    }
}
