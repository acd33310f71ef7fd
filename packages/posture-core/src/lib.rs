//! # posture-core
//!
//! Shared IMU frame and posture structures for the fall-sensor pipeline.
//!
//! These types are used by:
//! - `backend-rust`: decoding frames received from wearables and classifying them per sensor
//! - `packages/imu-simulator`: producing frames from a synthetic wearer
//! - Presentation layers: `Posture::display_name` and the serialized `PostureRecord`
//!
//! ## Sensor Conventions
//!
//! - **Sensor frame**: the device's own X/Y/Z axes; Z reads +1 g when the
//!   wearable lies flat face-up.
//! - **Acceleration**: m/s², decoded from a ±16 g full-scale range
//! - **Angular velocity**: °/s, decoded from a ±2000 °/s full-scale range
//!
//! ## Invariants
//! - A frame is ≥ 20 bytes and starts with `0x55 0x61`; anything else decodes to `None`
//! - The classifier is total: every finite reading maps to exactly one of seven postures
//! - Fall detection always short-circuits the posture decision chain

use serde::{Deserialize, Serialize};

pub mod classifier;
pub mod frame;
pub mod session;

pub use classifier::{classify_posture, ClassifierConfig, PostureClassifier, Tilt};
pub use frame::{decode_frame, decode_or_synthesize, encode_frame, synthesize_test_reading, FrameError};
pub use session::{PostureRecord, SensorSession, SessionError, HISTORY_LEN};

// ── Six-Axis Reading ──────────────────────────────────────────────────────────

/// One decoded IMU sample: 3-axis acceleration plus 3-axis angular velocity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SixAxisReading {
    /// m/s²
    pub acceleration_x: f64,
    pub acceleration_y: f64,
    pub acceleration_z: f64,
    /// °/s
    pub angular_velocity_x: f64,
    pub angular_velocity_y: f64,
    pub angular_velocity_z: f64,
}

impl SixAxisReading {
    pub fn new(acceleration: [f64; 3], angular_velocity: [f64; 3]) -> Self {
        Self {
            acceleration_x: acceleration[0],
            acceleration_y: acceleration[1],
            acceleration_z: acceleration[2],
            angular_velocity_x: angular_velocity[0],
            angular_velocity_y: angular_velocity[1],
            angular_velocity_z: angular_velocity[2],
        }
    }

    pub fn acceleration(&self) -> [f64; 3] {
        [self.acceleration_x, self.acceleration_y, self.acceleration_z]
    }

    pub fn angular_velocity(&self) -> [f64; 3] {
        [self.angular_velocity_x, self.angular_velocity_y, self.angular_velocity_z]
    }

    /// True when all six fields are finite (no NaN / ±∞).
    pub fn is_finite(&self) -> bool {
        self.acceleration()
            .iter()
            .chain(self.angular_velocity().iter())
            .all(|v| v.is_finite())
    }
}

// ── Posture ───────────────────────────────────────────────────────────────────

/// Classified body posture of the wearer. Closed set; there is no "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Posture {
    Standing,
    Sitting,
    /// Face down
    LyingVentral,
    /// Face up
    LyingDorsal,
    LyingLateralLeft,
    LyingLateralRight,
    Fall,
}

impl Posture {
    pub const ALL: [Posture; 7] = [
        Posture::Standing,
        Posture::Sitting,
        Posture::LyingVentral,
        Posture::LyingDorsal,
        Posture::LyingLateralLeft,
        Posture::LyingLateralRight,
        Posture::Fall,
    ];

    /// Wire name, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standing => "standing",
            Self::Sitting => "sitting",
            Self::LyingVentral => "lying_ventral",
            Self::LyingDorsal => "lying_dorsal",
            Self::LyingLateralLeft => "lying_lateral_left",
            Self::LyingLateralRight => "lying_lateral_right",
            Self::Fall => "fall",
        }
    }

    /// Human-readable label for presentation layers.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Standing => "Standing",
            Self::Sitting => "Sitting",
            Self::LyingVentral => "Lying - Ventral",
            Self::LyingDorsal => "Lying - Dorsal",
            Self::LyingLateralLeft => "Lying - Left Lateral",
            Self::LyingLateralRight => "Lying - Right Lateral",
            Self::Fall => "Fall Detected",
        }
    }

    pub fn is_lying(&self) -> bool {
        matches!(
            self,
            Self::LyingVentral | Self::LyingDorsal | Self::LyingLateralLeft | Self::LyingLateralRight
        )
    }
}

impl std::fmt::Display for Posture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Classification Result ─────────────────────────────────────────────────────

/// Output of one classifier call.
///
/// `acceleration_magnitude` must be carried by the caller into the next call
/// as `previous_magnitude` (see [`SensorSession`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostureClassification {
    pub posture: Posture,
    /// Heuristic certainty in (0, 1]; not a calibrated probability
    pub confidence: f64,
    /// Euclidean norm of the acceleration vector just classified (m/s²)
    pub acceleration_magnitude: f64,
}

impl PostureClassification {
    pub fn is_fall(&self) -> bool {
        self.posture == Posture::Fall
    }
}
