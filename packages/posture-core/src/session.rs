//! Per-sensor classification state.
//!
//! Fall detection depends on the magnitude change between consecutive
//! readings of the *same* wearable, so each physical sensor stream owns one
//! `SensorSession`. Readings from different sensors must never share one.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::classifier::PostureClassifier;
use crate::frame::{try_decode_frame, FrameError};
use crate::{Posture, PostureClassification, SixAxisReading};

/// Number of records kept in a session's local history.
pub const HISTORY_LEN: usize = 20;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("undecodable frame: {0}")]
    Frame(#[from] FrameError),

    #[error("non-finite reading rejected: {0:?}")]
    NonFinite(SixAxisReading),
}

// ── Posture Record ────────────────────────────────────────────────────────────

/// One classified reading, shaped for display and upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostureRecord {
    pub sensor_id: String,
    pub posture: Posture,
    #[serde(flatten)]
    pub reading: SixAxisReading,
    /// Acceleration magnitude (m/s²)
    pub magnitude: f64,
    pub is_fall_detected: bool,
    /// Classifier confidence × 100
    pub confidence_pct: f64,
    pub sensor_timestamp: DateTime<Utc>,
}

impl PostureRecord {
    pub fn new(
        sensor_id: &str,
        reading: SixAxisReading,
        classification: &PostureClassification,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            posture: classification.posture,
            reading,
            magnitude: classification.acceleration_magnitude,
            is_fall_detected: classification.is_fall(),
            confidence_pct: classification.confidence * 100.0,
            sensor_timestamp: at,
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SensorSession {
    sensor_id: String,
    classifier: PostureClassifier,
    last_magnitude: Option<f64>,
    /// Newest first
    history: VecDeque<PostureRecord>,
}

impl SensorSession {
    pub fn new(sensor_id: impl Into<String>) -> Self {
        Self::with_classifier(sensor_id, PostureClassifier::default())
    }

    pub fn with_classifier(sensor_id: impl Into<String>, classifier: PostureClassifier) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            classifier,
            last_magnitude: None,
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    /// Magnitude carried into the next classification.
    pub fn last_magnitude(&self) -> Option<f64> {
        self.last_magnitude
    }

    /// Classify a reading against the carried magnitude and record the result.
    ///
    /// Non-finite readings are rejected without touching the session so a
    /// single bad sample cannot poison the next fall check.
    pub fn observe(
        &mut self,
        reading: SixAxisReading,
        at: DateTime<Utc>,
    ) -> Result<PostureRecord, SessionError> {
        if !reading.is_finite() {
            return Err(SessionError::NonFinite(reading));
        }

        let classification = self.classifier.classify(&reading, self.last_magnitude);
        self.last_magnitude = Some(classification.acceleration_magnitude);

        let record = PostureRecord::new(&self.sensor_id, reading, &classification, at);
        debug!(
            "{}: {} ({:.0}%) |a|={:.2}",
            self.sensor_id, record.posture, record.confidence_pct, record.magnitude
        );

        if self.history.len() == HISTORY_LEN {
            self.history.pop_back();
        }
        self.history.push_front(record.clone());
        Ok(record)
    }

    /// Decode a raw frame and classify it.
    pub fn ingest_frame(
        &mut self,
        raw: &[u8],
        at: DateTime<Utc>,
    ) -> Result<PostureRecord, SessionError> {
        let reading = try_decode_frame(raw)?;
        self.observe(reading, at)
    }

    pub fn latest(&self) -> Option<&PostureRecord> {
        self.history.front()
    }

    /// Recent records, newest first.
    pub fn history(&self) -> impl Iterator<Item = &PostureRecord> {
        self.history.iter()
    }

    /// Forget the carried magnitude and history (sensor disconnected).
    pub fn reset(&mut self) {
        self.last_magnitude = None;
        self.history.clear();
    }
}
