//! Component health monitoring.
//!
//! Components heartbeat by name; the monitor reports anything silent
//! past its staleness threshold.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Overall status of one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Stale,
    Missing,
}

/// Health record for one component.
#[derive(Debug, Clone)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_beat: Option<DateTime<Utc>>,
    pub silence_secs: i64,
}

struct Registration {
    stale_after: Duration,
    last_beat: Option<DateTime<Utc>>,
}

/// Tracks heartbeats for registered components.
pub struct HealthMonitor {
    components: RwLock<HashMap<String, Registration>>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            components: RwLock::new(HashMap::new()),
        }
    }

    /// Register a component with its staleness threshold.
    pub fn register(&self, name: &str, stale_after_secs: u64) {
        self.components.write().insert(
            name.to_string(),
            Registration {
                stale_after: Duration::seconds(stale_after_secs as i64),
                last_beat: None,
            },
        );
    }

    /// Record a heartbeat.
    pub fn beat(&self, name: &str) {
        if let Some(reg) = self.components.write().get_mut(name) {
            reg.last_beat = Some(Utc::now());
        }
    }

    /// Health of every registered component.
    pub fn report(&self) -> Vec<ComponentHealth> {
        let now = Utc::now();
        self.components
            .read()
            .iter()
            .map(|(name, reg)| {
                let (status, silence_secs) = match reg.last_beat {
                    None => (HealthStatus::Missing, 0),
                    Some(t) => {
                        let silence = now - t;
                        let status = if silence > reg.stale_after {
                            HealthStatus::Stale
                        } else {
                            HealthStatus::Healthy
                        };
                        (status, silence.num_seconds())
                    }
                };
                ComponentHealth {
                    name: name.clone(),
                    status,
                    last_beat: reg.last_beat,
                    silence_secs,
                }
            })
            .collect()
    }

    /// Components that are stale or never beat.
    pub fn unhealthy(&self) -> Vec<ComponentHealth> {
        self.report()
            .into_iter()
            .filter(|c| c.status != HealthStatus::Healthy)
            .collect()
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_until_first_beat() {
        let m = HealthMonitor::new();
        m.register("ws", 10);
        assert_eq!(m.report()[0].status, HealthStatus::Missing);

        m.beat("ws");
        assert_eq!(m.report()[0].status, HealthStatus::Healthy);
        assert!(m.unhealthy().is_empty());
    }

    #[test]
    fn test_unknown_component_beat_ignored() {
        let m = HealthMonitor::new();
        m.beat("ghost");
        assert!(m.report().is_empty());
    }
}
