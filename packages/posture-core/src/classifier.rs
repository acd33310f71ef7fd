//! Threshold-based posture and fall classifier.
//!
//! Uses the acceleration magnitude and the tilt of the gravity vector
//! (pitch/roll) to place the wearer in one of seven postures. A fall is
//! checked first and short-circuits everything else; the remaining checks
//! form a strict priority chain:
//!
//! 1. lying (near-weightless, or inside the near-1 g lying band)
//! 2. sitting (upright band, moderate pitch)
//! 3. standing (upright band, small pitch and roll)
//! 4. tilt-only fallback
//!
//! With the default bands the upright band (0.9–1.1 g) sits inside the lying
//! band (0.8–1.2 g), so steps 2 and 3 only fire when the lying band is
//! narrowed through [`ClassifierConfig`]. Reordering the chain changes
//! results at band boundaries.

use crate::{Posture, PostureClassification, SixAxisReading};

/// Reference gravity (m/s²).
pub const GRAVITY: f64 = 9.8;
/// Magnitude above this is treated as an impact.
pub const FALL_THRESHOLD: f64 = 2.0 * GRAVITY;
/// Magnitude below this is treated as lying still (near-weightless).
pub const LYING_THRESHOLD: f64 = 0.5 * GRAVITY;
/// Angular velocity magnitude counted as "high rotation". Compared in °/s as-is.
pub const HIGH_ROTATION_DPS: f64 = 5.0;
/// Magnitude jump between consecutive readings counted as sudden.
pub const SUDDEN_CHANGE: f64 = 1.5 * GRAVITY;

const FALL_CONFIDENCE: f64 = 0.85;

/// Thresholds for [`PostureClassifier`]. `Default` reproduces the reference
/// constants exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    /// Reference gravity (m/s²).
    pub gravity: f64,
    /// Impact threshold, in g.
    pub fall_threshold_g: f64,
    /// Near-weightless lying threshold, in g.
    pub lying_threshold_g: f64,
    /// Angular velocity magnitude (°/s) that enables the sudden-change fall rule.
    pub high_rotation_dps: f64,
    /// Magnitude jump between consecutive readings, in g.
    pub sudden_change_g: f64,
    /// Open interval (g) that also counts as lying.
    pub lying_band_g: (f64, f64),
    /// Open interval (g) for the sitting and standing checks.
    pub upright_band_g: (f64, f64),
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            fall_threshold_g: 2.0,
            lying_threshold_g: 0.5,
            high_rotation_dps: HIGH_ROTATION_DPS,
            sudden_change_g: 1.5,
            lying_band_g: (0.8, 1.2),
            upright_band_g: (0.9, 1.1),
        }
    }
}

/// Tilt of the acceleration vector, in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tilt {
    pub pitch_deg: f64,
    pub roll_deg: f64,
}

pub fn acceleration_magnitude(reading: &SixAxisReading) -> f64 {
    let [x, y, z] = reading.acceleration();
    (x * x + y * y + z * z).sqrt()
}

pub fn angular_velocity_magnitude(reading: &SixAxisReading) -> f64 {
    let [x, y, z] = reading.angular_velocity();
    (x * x + y * y + z * z).sqrt()
}

/// Pitch = asin(-ax / |a|), roll = atan2(ay, az). Both zero for a zero vector.
pub fn tilt(reading: &SixAxisReading) -> Tilt {
    let magnitude = acceleration_magnitude(reading);
    if magnitude == 0.0 {
        return Tilt::default();
    }
    // Rounding in the norm can push |ax| / |a| a hair past 1
    let sin_pitch = (-reading.acceleration_x / magnitude).clamp(-1.0, 1.0);
    Tilt {
        pitch_deg: sin_pitch.asin().to_degrees(),
        roll_deg: reading.acceleration_y.atan2(reading.acceleration_z).to_degrees(),
    }
}

fn in_band(value: f64, (low, high): (f64, f64)) -> bool {
    value > low && value < high
}

// ── Classifier ────────────────────────────────────────────────────────────────

/// Stateless classifier. The caller carries `previous_magnitude` between calls
/// (see [`crate::SensorSession`]).
#[derive(Debug, Clone, Default)]
pub struct PostureClassifier {
    config: ClassifierConfig,
}

impl PostureClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Impact, or high rotation combined with a sudden magnitude change.
    ///
    /// Any `Some` previous magnitude takes part in the sudden-change rule,
    /// including `Some(0.0)`; only `None` (first reading) disables it. The
    /// mobile app's check treated a zero previous magnitude as absent.
    pub fn is_fall(&self, reading: &SixAxisReading, previous_magnitude: Option<f64>) -> bool {
        let g = self.config.gravity;
        let magnitude = acceleration_magnitude(reading);

        let high_acceleration = magnitude > self.config.fall_threshold_g * g;
        let high_rotation = angular_velocity_magnitude(reading) > self.config.high_rotation_dps;
        let sudden_change = previous_magnitude
            .is_some_and(|prev| (magnitude - prev).abs() > self.config.sudden_change_g * g);

        high_acceleration || (high_rotation && sudden_change)
    }

    /// Classify one reading. Total: every input yields one of the seven postures.
    ///
    /// Non-finite input is not rejected here; NaN fails every comparison and
    /// lands on the final fallback (`lying_dorsal`, 0.50).
    pub fn classify(
        &self,
        reading: &SixAxisReading,
        previous_magnitude: Option<f64>,
    ) -> PostureClassification {
        let magnitude = acceleration_magnitude(reading);
        let result = |posture, confidence| PostureClassification {
            posture,
            confidence,
            acceleration_magnitude: magnitude,
        };

        if self.is_fall(reading, previous_magnitude) {
            return result(Posture::Fall, FALL_CONFIDENCE);
        }

        let g = self.config.gravity;
        let m_g = magnitude / g;
        let Tilt { pitch_deg, roll_deg } = tilt(reading);
        let (pitch, roll) = (pitch_deg.abs(), roll_deg.abs());

        let lying = magnitude < self.config.lying_threshold_g * g
            || in_band(m_g, self.config.lying_band_g);
        if lying {
            return if pitch < 30.0 && roll < 30.0 {
                if reading.acceleration_z > 0.0 {
                    result(Posture::LyingDorsal, 0.80)
                } else {
                    result(Posture::LyingVentral, 0.80)
                }
            } else if roll > 45.0 {
                if roll_deg > 0.0 {
                    result(Posture::LyingLateralRight, 0.75)
                } else {
                    result(Posture::LyingLateralLeft, 0.75)
                }
            } else {
                result(Posture::LyingDorsal, 0.70)
            };
        }

        let upright = in_band(m_g, self.config.upright_band_g);
        if upright && pitch > 20.0 && pitch < 80.0 {
            return result(Posture::Sitting, 0.75);
        }
        if upright && pitch < 20.0 && roll < 20.0 {
            return result(Posture::Standing, 0.80);
        }

        if pitch < 30.0 && roll < 30.0 {
            result(Posture::Standing, 0.60)
        } else if pitch > 60.0 {
            result(Posture::Sitting, 0.60)
        } else {
            result(Posture::LyingDorsal, 0.50)
        }
    }
}

/// Classify with the default thresholds.
pub fn classify_posture(
    reading: &SixAxisReading,
    previous_magnitude: Option<f64>,
) -> PostureClassification {
    PostureClassifier::default().classify(reading, previous_magnitude)
}
