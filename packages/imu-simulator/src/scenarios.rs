//! scenarios.rs — Selectable behaviour scenarios for the IMU simulator
//!
//! Each scenario exercises one path of the hub's pipeline: the normal posture
//! routine, a motionless wearer, injected falls, or a lossy BLE link that
//! delivers truncated and mis-headed frames.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioType {
    /// Cycle through the daily posture routine
    Daily,
    /// Wearer stands still; routine is frozen
    Rest,
    /// Inject an impact on selected sensors every `fall_every_s`
    Fall,
    /// Raise the corrupt-frame rate (truncated frames, wrong header)
    NoisyLink,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub active: Vec<ScenarioType>,
    /// Sensor indices (0-based) that fall in the `Fall` scenario
    pub fall_sensor_ids: Vec<usize>,
    pub fall_every_s: f64,
    /// Corrupt-frame probability used while `NoisyLink` is active
    pub noisy_corrupt_rate: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            active: vec![ScenarioType::Daily],
            fall_sensor_ids: vec![],
            fall_every_s: 30.0,
            noisy_corrupt_rate: 0.25,
        }
    }
}

impl ScenarioConfig {
    pub fn has(&self, s: &ScenarioType) -> bool {
        self.active.contains(s)
    }

    /// Effective corrupt-frame probability given the configured base rate
    pub fn corrupt_rate(&self, base_rate: f64) -> f64 {
        let rate = if self.has(&ScenarioType::NoisyLink) {
            base_rate.max(self.noisy_corrupt_rate)
        } else {
            base_rate
        };
        rate.clamp(0.0, 1.0)
    }
}

/// Presets selectable from the command line
pub fn preset_rest() -> ScenarioConfig {
    ScenarioConfig {
        active: vec![ScenarioType::Rest],
        ..Default::default()
    }
}

pub fn preset_fall() -> ScenarioConfig {
    ScenarioConfig {
        active: vec![ScenarioType::Daily, ScenarioType::Fall],
        fall_sensor_ids: vec![0],
        ..Default::default()
    }
}

pub fn preset_noisy_link() -> ScenarioConfig {
    ScenarioConfig {
        active: vec![ScenarioType::Daily, ScenarioType::NoisyLink],
        ..Default::default()
    }
}
