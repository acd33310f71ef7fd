//! wearer_sim.rs — Body attitude simulation for belt-worn IMU sensors
//!
//! Simulates N wearers moving through a schedule of postures.
//! Each wearer has:
//! - A target posture (ground truth label) and dwell timer
//! - Sensor attitude (roll/pitch) slewing toward the posture's attitude at a
//!   bounded rate, which is what the gyroscope sees
//! - Specific force in the sensor frame = gravity rotated into the body
//! - Optional fall events: one impact tick (~3 g, fast rotation) followed by
//!   lying on the floor
//!
//! Pure math, no panics: every tick yields a finite reading per wearer.

use posture_core::Posture;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::scenarios::{ScenarioConfig, ScenarioType};

// ── Types ─────────────────────────────────────────────────────────────────────

/// 3D vector in the sensor frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self { Self { x, y, z } }
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
    pub fn scale(&self, s: f64) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }
}

/// Unit quaternion for 3D rotation (w, x, y, z)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Quat {
    pub w: f64, pub x: f64, pub y: f64, pub z: f64,
}

impl Quat {
    /// Build from Euler angles (roll about X, pitch about Y, yaw about Z).
    /// All angles in radians. Applied in ZYX order (yaw then pitch then roll).
    pub fn from_euler(roll: f64, pitch: f64, yaw: f64) -> Self {
        let (cr, sr) = ((roll/2.0).cos(), (roll/2.0).sin());
        let (cp, sp) = ((pitch/2.0).cos(), (pitch/2.0).sin());
        let (cy, sy) = ((yaw/2.0).cos(), (yaw/2.0).sin());
        Self {
            w: cr*cp*cy + sr*sp*sy,
            x: sr*cp*cy - cr*sp*sy,
            y: cr*sp*cy + sr*cp*sy,
            z: cr*cp*sy - sr*sp*cy,
        }
    }

    pub fn conjugate(&self) -> Self {
        Self { w: self.w, x: -self.x, y: -self.y, z: -self.z }
    }

    /// Rotate a vector by this quaternion: v' = q * v * q⁻¹
    pub fn rotate(&self, v: Vec3) -> Vec3 {
        let (w, qx, qy, qz) = (self.w, self.x, self.y, self.z);
        let (vx, vy, vz) = (v.x, v.y, v.z);
        let ix =  w*vx + qy*vz - qz*vy;
        let iy =  w*vy + qz*vx - qx*vz;
        let iz =  w*vz + qx*vy - qy*vx;
        let iw = -qx*vx - qy*vy - qz*vz;
        Vec3::new(
            ix*w + iw*(-qx) + iy*(-qz) - iz*(-qy),
            iy*w + iw*(-qy) + iz*(-qx) - ix*(-qz),
            iz*w + iw*(-qz) + ix*(-qy) - iy*(-qx),
        )
    }
}

/// Sensor attitude (degrees) a belt-worn sensor settles at for each posture.
/// Returns (roll, pitch).
pub fn posture_attitude_deg(posture: Posture) -> (f64, f64) {
    match posture {
        Posture::Standing          => (0.0, 0.0),
        Posture::Sitting           => (0.0, 45.0),
        Posture::LyingDorsal       => (0.0, 90.0),
        Posture::LyingVentral      => (0.0, -90.0),
        Posture::LyingLateralLeft  => (-90.0, 0.0),
        Posture::LyingLateralRight => (90.0, 0.0),
        // A fall ends on the floor
        Posture::Fall              => (0.0, 90.0),
    }
}

/// Daily routine cycled by the `Daily` scenario.
pub const DAILY_ROUTINE: [Posture; 7] = [
    Posture::Standing,
    Posture::Sitting,
    Posture::Standing,
    Posture::LyingDorsal,
    Posture::LyingLateralLeft,
    Posture::LyingLateralRight,
    Posture::LyingVentral,
];

// ── Wearer state ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct WearerState {
    /// BLE MAC of the simulated sensor
    pub sensor_id: String,
    /// Ground truth posture label
    pub posture: Posture,
    /// Index into the daily routine
    pub routine_idx: usize,
    /// Seconds spent in the current posture
    pub dwell_elapsed_s: f64,
    /// Current sensor attitude, degrees
    pub roll_deg: f64,
    pub pitch_deg: f64,
    /// Angular velocity over the last tick, °/s (sensor frame)
    pub gyro_dps: Vec3,
    /// Specific force over the last tick, m/s² (sensor frame)
    pub accel_mps2: Vec3,
    /// Seconds until the next scheduled fall (fall scenario only)
    pub next_fall_in_s: f64,
}

impl WearerState {
    /// Specific force at rest for the current attitude: gravity seen from the sensor.
    pub fn gravity_in_sensor(&self, gravity: f64) -> Vec3 {
        let q = Quat::from_euler(self.roll_deg.to_radians(), self.pitch_deg.to_radians(), 0.0);
        q.conjugate().rotate(Vec3::new(0.0, 0.0, gravity))
    }
}

fn slew(current: f64, target: f64, max_step: f64) -> f64 {
    current + (target - current).clamp(-max_step, max_step)
}

// ── Simulation tick ───────────────────────────────────────────────────────────

pub struct WearerSim {
    pub wearers: Vec<WearerState>,
    pub t_elapsed: f64,

    // Config
    gravity: f64,
    dwell_s: f64,
    max_slew_dps: f64,
    impact_g: f64,
    impact_gyro_dps: f64,
    fall_every_s: f64,
}

impl WearerSim {
    pub fn new(cfg: &SimConfig, scenario: &ScenarioConfig, rng: &mut impl Rng) -> Self {
        let wearers = (0..cfg.n_sensors).map(|i| {
            let start = if scenario.has(&ScenarioType::Rest) {
                Posture::Standing
            } else {
                DAILY_ROUTINE[i % DAILY_ROUTINE.len()]
            };
            let (roll, pitch) = posture_attitude_deg(start);
            WearerState {
                sensor_id: format!("C0:FF:EE:00:00:{:02X}", i + 1),
                posture: start,
                routine_idx: i % DAILY_ROUTINE.len(),
                // Stagger transitions so sensors don't move in lockstep
                dwell_elapsed_s: rng.gen_range(0.0..cfg.dwell_s.max(f64::EPSILON)),
                roll_deg: roll,
                pitch_deg: pitch,
                gyro_dps: Vec3::new(0.0, 0.0, 0.0),
                accel_mps2: Vec3::new(0.0, 0.0, cfg.gravity),
                next_fall_in_s: scenario.fall_every_s,
            }
        }).collect();

        Self {
            wearers,
            t_elapsed: 0.0,
            gravity: cfg.gravity,
            dwell_s: cfg.dwell_s,
            max_slew_dps: cfg.max_slew_dps,
            impact_g: cfg.impact_g,
            impact_gyro_dps: cfg.impact_gyro_dps,
            fall_every_s: scenario.fall_every_s,
        }
    }

    /// Advance simulation by dt seconds
    pub fn tick(&mut self, dt: f64, scenario: &ScenarioConfig) {
        self.t_elapsed += dt;
        let max_step = self.max_slew_dps * dt;

        for (idx, w) in self.wearers.iter_mut().enumerate() {
            let falls_enabled = scenario.has(&ScenarioType::Fall) && scenario.fall_sensor_ids.contains(&idx);

            // Leaving the impact tick: stay down on the floor
            if w.posture == Posture::Fall {
                w.posture = Posture::LyingDorsal;
                w.dwell_elapsed_s = 0.0;
            }

            if falls_enabled {
                w.next_fall_in_s -= dt;
                if w.next_fall_in_s <= 0.0 {
                    w.next_fall_in_s = self.fall_every_s;
                    w.posture = Posture::Fall;
                    // Impact along the pre-fall gravity direction, then the body is down
                    w.accel_mps2 = w.gravity_in_sensor(self.gravity).scale(self.impact_g);
                    w.gyro_dps = Vec3::new(0.0, self.impact_gyro_dps, 0.0);
                    let (roll, pitch) = posture_attitude_deg(Posture::Fall);
                    w.roll_deg = roll;
                    w.pitch_deg = pitch;
                    continue;
                }
            }

            if !scenario.has(&ScenarioType::Rest) {
                w.dwell_elapsed_s += dt;
                if w.dwell_elapsed_s >= self.dwell_s {
                    w.dwell_elapsed_s = 0.0;
                    w.routine_idx = (w.routine_idx + 1) % DAILY_ROUTINE.len();
                    w.posture = DAILY_ROUTINE[w.routine_idx];
                }
            }

            // Attitude slews toward the posture's resting attitude
            let (target_roll, target_pitch) = posture_attitude_deg(w.posture);
            let roll = slew(w.roll_deg, target_roll, max_step);
            let pitch = slew(w.pitch_deg, target_pitch, max_step);
            w.gyro_dps = if dt > 0.0 {
                Vec3::new((roll - w.roll_deg) / dt, (pitch - w.pitch_deg) / dt, 0.0)
            } else {
                Vec3::new(0.0, 0.0, 0.0)
            };
            w.roll_deg = roll;
            w.pitch_deg = pitch;
            w.accel_mps2 = w.gravity_in_sensor(self.gravity);
        }
    }
}

// ── Config struct (populated from config.toml) ────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SimConfig {
    pub n_sensors: usize,
    pub gravity: f64,
    pub dwell_s: f64,
    pub max_slew_dps: f64,
    pub impact_g: f64,
    pub impact_gyro_dps: f64,
}
