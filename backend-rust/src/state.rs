use std::collections::VecDeque;
use std::sync::Arc;

use posture_core::ClassifierConfig;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::sensor_hub::{FallAlert, HubConfig, SensorHub};

pub type SharedState = Arc<RwLock<HubState>>;

// ─── Hub State ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct HubState {
    pub hub: SensorHub,
    alerts: VecDeque<FallAlert>,
    alert_capacity: usize,
}

impl HubState {
    pub fn new(config: &HubConfig) -> Self {
        Self {
            hub: SensorHub::new(ClassifierConfig::default(), config.session_timeout_s),
            alerts: VecDeque::new(),
            alert_capacity: config.alert_capacity.max(1),
        }
    }

    /// Record a fall alert, dropping the oldest once at capacity.
    pub fn push_alert(&mut self, alert: FallAlert) {
        if self.alerts.len() == self.alert_capacity {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert);
    }

    /// Alerts, newest first.
    pub fn alerts(&self) -> Vec<FallAlert> {
        self.alerts.iter().rev().cloned().collect()
    }

    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            status: "ok",
            sensors: self.hub.sensor_count(),
            alerts: self.alerts.len(),
        }
    }
}

// ─── Snapshots ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub sensors: usize,
    pub alerts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn alert(id: &str, secs: i64) -> FallAlert {
        FallAlert {
            sensor_id: id.to_string(),
            magnitude: 25.0,
            confidence_pct: 85.0,
            detected_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_alerts_bounded_newest_first() {
        let config = HubConfig { alert_capacity: 2, ..HubConfig::default() };
        let mut state = HubState::new(&config);
        state.push_alert(alert("A", 0));
        state.push_alert(alert("B", 1));
        state.push_alert(alert("C", 2));

        let ids: Vec<_> = state.alerts().into_iter().map(|a| a.sensor_id).collect();
        assert_eq!(ids, vec!["C", "B"]);
        assert_eq!(state.health().alerts, 2);
    }

    #[test]
    fn test_zero_capacity_keeps_latest() {
        let config = HubConfig { alert_capacity: 0, ..HubConfig::default() };
        let mut state = HubState::new(&config);
        state.push_alert(alert("A", 0));
        state.push_alert(alert("B", 1));
        assert_eq!(state.alerts().len(), 1);
    }
}
