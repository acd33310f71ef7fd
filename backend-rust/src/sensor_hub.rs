//! # sensor_hub
//!
//! Posture Hub: receives raw IMU frames from wearable sensors via UDP,
//! decodes and classifies them per sensor, and raises fall alerts.
//!
//! ## Architecture
//! This module runs as a separate Tokio task (tokio::spawn) alongside the
//! HTTP server. It:
//!   1. Binds UDP socket on port 5556 (configurable via POSTURE_UDP_PORT env)
//!   2. Receives frame envelopes (JSON with the hex-encoded BLE payload)
//!   3. Forgets sensors silent past the session timeout
//!   4. Decodes the frame and validates its sequence number (replay detection)
//!   5. Classifies it with the sensor's own session, so the previous
//!      magnitude never crosses between wearables
//!   6. Forwards fall classifications to the alert channel
//!
//! Bad input of any kind is logged and skipped; the listener never stops.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use posture_core::frame::try_decode_frame;
use posture_core::{ClassifierConfig, PostureClassifier, PostureRecord, SensorSession, SessionError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::SharedState;

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// UDP port to listen on for frames (default 5556)
    pub udp_port: u16,
    /// HTTP port for snapshots and alerts (default 3002)
    pub http_port: u16,
    /// Fall alerts kept in memory (default 100)
    pub alert_capacity: usize,
    /// Silence after which a sensor is forgotten and its next frame starts a
    /// fresh session (default 5 s, minimum 1 s)
    pub session_timeout_s: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            udp_port: parse_or(std::env::var("POSTURE_UDP_PORT").ok(), 5556),
            http_port: parse_or(std::env::var("POSTURE_HTTP_PORT").ok(), 3002),
            alert_capacity: parse_or(std::env::var("POSTURE_ALERT_CAPACITY").ok(), 100),
            session_timeout_s: parse_or(std::env::var("POSTURE_SESSION_TIMEOUT_S").ok(), 5),
        }
    }
}

/// Unset or unparseable values (e.g. a negative timeout) fall back to the default.
fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

// ── Wire Format ───────────────────────────────────────────────────────────────

/// JSON envelope around one BLE notification payload.
#[derive(Debug, Deserialize)]
pub struct FrameEnvelope {
    /// Sensor MAC address; one classification session per value
    pub sensor_id: String,
    pub seq_num: u32,
    /// Raw frame bytes, hex-encoded
    pub frame_hex: String,
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("malformed envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("frame is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("sensor {sensor_id}: rejected seq {seq_num}")]
    Replay { sensor_id: String, seq_num: u32 },

    #[error("sensor {sensor_id}: {source}")]
    Session { sensor_id: String, source: SessionError },
}

// ── Sequence Number Tracker (replay protection) ───────────────────────────────

/// Tracks the last seen sequence number per sensor.
/// Rejects exact duplicates and large backward jumps.
#[derive(Debug, Default)]
struct SeqTracker {
    last_seq: HashMap<String, u32>,
}

impl SeqTracker {
    fn accept(&mut self, sensor_id: &str, seq_num: u32) -> bool {
        let Some(last) = self.last_seq.get_mut(sensor_id) else {
            self.last_seq.insert(sensor_id.to_string(), seq_num);
            return true;
        };
        let diff = seq_num.wrapping_sub(*last);
        if diff == 0 || diff > 1000 {
            warn!("Hub: rejected frame from {sensor_id}: seq {seq_num} (last: {last})");
            return false;
        }
        *last = seq_num;
        true
    }

    fn forget(&mut self, sensor_id: &str) {
        self.last_seq.remove(sensor_id);
    }
}

// ── Fall alert channel message ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct FallAlert {
    pub sensor_id: String,
    pub magnitude: f64,
    pub confidence_pct: f64,
    pub detected_at: DateTime<Utc>,
}

impl From<&PostureRecord> for FallAlert {
    fn from(r: &PostureRecord) -> Self {
        Self {
            sensor_id: r.sensor_id.clone(),
            magnitude: r.magnitude,
            confidence_pct: r.confidence_pct,
            detected_at: r.sensor_timestamp,
        }
    }
}

// ── Sensor Hub ────────────────────────────────────────────────────────────────

/// Per-sensor classification state for every wearable the hub has heard from.
#[derive(Debug)]
pub struct SensorHub {
    sessions: HashMap<String, SensorSession>,
    seq_tracker: SeqTracker,
    classifier: PostureClassifier,
    session_timeout: TimeDelta,
}

impl SensorHub {
    pub fn new(classifier_config: ClassifierConfig, session_timeout_s: u32) -> Self {
        let secs = i64::from(session_timeout_s.max(1));
        Self {
            sessions: HashMap::new(),
            seq_tracker: SeqTracker::default(),
            classifier: PostureClassifier::new(classifier_config),
            session_timeout: TimeDelta::try_seconds(secs).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Parse, validate, decode and classify one datagram.
    ///
    /// Only a frame that decodes creates sensor state. A sensor silent past
    /// the session timeout is forgotten first, so a rebooted wearable whose
    /// sequence numbers restart is accepted as a new connection.
    pub fn handle_datagram(&mut self, data: &[u8], at: DateTime<Utc>) -> Result<PostureRecord, HubError> {
        let env: FrameEnvelope = serde_json::from_slice(data)?;
        let frame = hex::decode(env.frame_hex.trim())?;

        self.evict_stale(at);

        let reading = try_decode_frame(&frame).map_err(|e| HubError::Session {
            sensor_id: env.sensor_id.clone(),
            source: e.into(),
        })?;

        if !self.seq_tracker.accept(&env.sensor_id, env.seq_num) {
            return Err(HubError::Replay { sensor_id: env.sensor_id, seq_num: env.seq_num });
        }

        let classifier = &self.classifier;
        let session = self
            .sessions
            .entry(env.sensor_id.clone())
            .or_insert_with(|| {
                info!("Hub: new sensor {}", env.sensor_id);
                SensorSession::with_classifier(env.sensor_id.clone(), classifier.clone())
            });

        session
            .observe(reading, at)
            .map_err(|source| HubError::Session { sensor_id: env.sensor_id, source })
    }

    /// Forget every sensor (session and sequence state) whose latest record is
    /// older than the session timeout. Returns how many were evicted.
    pub fn evict_stale(&mut self, now: DateTime<Utc>) -> usize {
        let timeout = self.session_timeout;
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.latest().map_or(true, |r| now - r.sensor_timestamp > timeout))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            debug!("Hub: {id} silent past {}s, forgetting session", timeout.num_seconds());
            self.disconnect(id);
        }
        stale.len()
    }

    /// Latest record for every sensor, ordered by sensor id.
    pub fn latest(&self) -> Vec<PostureRecord> {
        let mut out: Vec<_> = self.sessions.values().filter_map(|s| s.latest().cloned()).collect();
        out.sort_by(|a, b| a.sensor_id.cmp(&b.sensor_id));
        out
    }

    /// Recent records for one sensor, newest first.
    pub fn history(&self, sensor_id: &str) -> Option<Vec<PostureRecord>> {
        self.sessions.get(sensor_id).map(|s| s.history().cloned().collect())
    }

    /// Drop a sensor's carried state (explicit disconnect).
    pub fn disconnect(&mut self, sensor_id: &str) -> bool {
        self.seq_tracker.forget(sensor_id);
        self.sessions.remove(sensor_id).is_some()
    }

    pub fn sensor_count(&self) -> usize {
        self.sessions.len()
    }
}

// ── Main UDP listener task ────────────────────────────────────────────────────

/// Start the hub UDP listener as a background Tokio task.
/// Fall classifications are forwarded on `fall_tx`.
pub async fn start_sensor_hub(
    config: HubConfig,
    state: SharedState,
    fall_tx: mpsc::Sender<FallAlert>,
) {
    let addr = format!("0.0.0.0:{}", config.udp_port);
    let socket = match UdpSocket::bind(&addr).await {
        Ok(s) => {
            info!("📡 Posture Hub listening on UDP {addr}");
            s
        }
        Err(e) => {
            warn!("Posture Hub: could not bind UDP {addr}: {e} (no sensors will be received)");
            return;
        }
    };

    let mut buf = vec![0u8; 2048];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, src)) => {
                process_datagram(&buf[..len], src, &state, &fall_tx).await;
            }
            Err(e) => {
                // Never crash; log and continue
                warn!("Posture Hub: UDP recv error: {e}");
            }
        }
    }
}

async fn process_datagram(
    data: &[u8],
    src: SocketAddr,
    state: &SharedState,
    fall_tx: &mpsc::Sender<FallAlert>,
) {
    let result = state.write().await.hub.handle_datagram(data, Utc::now());

    let record = match result {
        Ok(r) => r,
        Err(HubError::Replay { .. }) => return,
        Err(e) => {
            debug!("Hub: skipped datagram from {src}: {e}");
            return;
        }
    };

    if record.is_fall_detected {
        if let Err(e) = fall_tx.try_send(FallAlert::from(&record)) {
            warn!("Hub: fall alert for {} dropped: {e}", record.sensor_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use posture_core::{encode_frame, Posture, SixAxisReading, HISTORY_LEN};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn datagram(sensor_id: &str, seq_num: u32, reading: SixAxisReading) -> Vec<u8> {
        serde_json::json!({
            "sensor_id": sensor_id,
            "seq_num": seq_num,
            "frame_hex": hex::encode(encode_frame(&reading)),
        })
        .to_string()
        .into_bytes()
    }

    fn hub() -> SensorHub {
        SensorHub::new(ClassifierConfig::default(), 5)
    }

    fn accel(z: f64, gyro_y: f64) -> SixAxisReading {
        SixAxisReading::new([0.0, 0.0, z], [0.0, gyro_y, 0.0])
    }

    #[test]
    fn test_classifies_valid_datagram() {
        let mut hub = hub();
        let r = hub.handle_datagram(&datagram("A", 1, accel(9.8, 0.0)), t(0)).unwrap();
        assert_eq!(r.sensor_id, "A");
        assert_eq!(r.posture, Posture::LyingDorsal);
        assert_eq!(hub.sensor_count(), 1);
    }

    #[test]
    fn test_rejects_garbage() {
        let mut hub = hub();
        assert!(matches!(hub.handle_datagram(b"not json", t(0)), Err(HubError::Envelope(_))));

        let bad_hex = br#"{"sensor_id":"A","seq_num":1,"frame_hex":"zz"}"#;
        assert!(matches!(hub.handle_datagram(bad_hex, t(0)), Err(HubError::Hex(_))));

        let short = br#"{"sensor_id":"A","seq_num":2,"frame_hex":"5561"}"#;
        assert!(matches!(hub.handle_datagram(short, t(0)), Err(HubError::Session { .. })));
        assert!(hub.latest().is_empty());
        assert!(hub.history("A").is_none());
        assert_eq!(hub.sensor_count(), 0);

        // The undecodable frame did not consume its sequence number
        assert!(hub.handle_datagram(&datagram("A", 2, accel(9.8, 0.0)), t(0)).is_ok());
        assert_eq!(hub.sensor_count(), 1);
    }

    #[test]
    fn test_duplicate_seq_rejected() {
        let mut hub = hub();
        hub.handle_datagram(&datagram("A", 5, accel(9.8, 0.0)), t(0)).unwrap();
        let dup = hub.handle_datagram(&datagram("A", 5, accel(9.8, 0.0)), t(0));
        assert!(matches!(dup, Err(HubError::Replay { seq_num: 5, .. })));

        // Other sensors have independent sequence spaces
        assert!(hub.handle_datagram(&datagram("B", 5, accel(9.8, 0.0)), t(0)).is_ok());
    }

    #[test]
    fn test_sessions_are_isolated_per_sensor() {
        let mut hub = hub();
        // Sensor A is at 18 m/s², sensor B then reports 2 m/s² while rotating.
        hub.handle_datagram(&datagram("A", 1, accel(18.0, 0.0)), t(0)).unwrap();
        let b = hub.handle_datagram(&datagram("B", 1, accel(2.0, 8.0)), t(0)).unwrap();
        assert_ne!(b.posture, Posture::Fall);

        // Same drop on A itself is a fall
        let a = hub.handle_datagram(&datagram("A", 2, accel(2.0, 8.0)), t(1)).unwrap();
        assert_eq!(a.posture, Posture::Fall);
        assert!(a.is_fall_detected);
    }

    #[test]
    fn test_stale_session_is_reset() {
        let mut hub = hub();
        hub.handle_datagram(&datagram("A", 1, accel(18.0, 0.0)), t(0)).unwrap();
        let later = hub.handle_datagram(&datagram("A", 2, accel(2.0, 8.0)), t(60)).unwrap();
        assert_ne!(later.posture, Posture::Fall);
        assert_eq!(hub.history("A").unwrap().len(), 1);
    }

    #[test]
    fn test_sequence_restart_after_timeout_is_accepted() {
        let mut hub = hub();
        hub.handle_datagram(&datagram("A", 5000, accel(9.8, 0.0)), t(0)).unwrap();

        // Rebooted wearable: counter starts over long after the last frame
        for seq in 1..=200u32 {
            let r = hub.handle_datagram(&datagram("A", seq, accel(9.8, 0.0)), t(600 + i64::from(seq)));
            assert!(r.is_ok(), "seq {seq}: {r:?}");
        }
        assert_eq!(hub.history("A").unwrap().len(), HISTORY_LEN);
    }

    #[test]
    fn test_restart_within_timeout_is_still_replay() {
        let mut hub = hub();
        hub.handle_datagram(&datagram("A", 5000, accel(9.8, 0.0)), t(0)).unwrap();
        let r = hub.handle_datagram(&datagram("A", 1, accel(9.8, 0.0)), t(2));
        assert!(matches!(r, Err(HubError::Replay { seq_num: 1, .. })));
    }

    #[test]
    fn test_silent_sensors_are_evicted() {
        let mut hub = hub();
        hub.handle_datagram(&datagram("ghost", 1, accel(9.8, 0.0)), t(0)).unwrap();
        hub.handle_datagram(&datagram("A", 1, accel(9.8, 0.0)), t(4)).unwrap();
        assert_eq!(hub.sensor_count(), 2);

        // Any later datagram sweeps sensors silent past the timeout
        hub.handle_datagram(&datagram("A", 2, accel(9.8, 0.0)), t(8)).unwrap();
        assert_eq!(hub.sensor_count(), 1);
        assert!(hub.history("ghost").is_none());
        assert_eq!(hub.evict_stale(t(100)), 1);
        assert_eq!(hub.sensor_count(), 0);
    }

    #[test]
    fn test_timeout_config_parsing() {
        assert_eq!(parse_or::<u32>(None, 5), 5);
        assert_eq!(parse_or::<u32>(Some(" 30 ".into()), 5), 30);
        assert_eq!(parse_or::<u32>(Some("-5".into()), 5), 5);
        assert_eq!(parse_or::<u32>(Some("99999999999999".into()), 5), 5);
    }

    #[test]
    fn test_extreme_timeouts_do_not_panic() {
        let mut long = SensorHub::new(ClassifierConfig::default(), u32::MAX);
        long.handle_datagram(&datagram("A", 1, accel(9.8, 0.0)), t(0)).unwrap();
        assert_eq!(long.evict_stale(t(1_000_000)), 0);

        // Zero is raised to one second
        let mut short = SensorHub::new(ClassifierConfig::default(), 0);
        short.handle_datagram(&datagram("A", 1, accel(9.8, 0.0)), t(0)).unwrap();
        assert_eq!(short.evict_stale(t(1)), 0);
        assert_eq!(short.evict_stale(t(2)), 1);
    }

    #[test]
    fn test_disconnect_forgets_sensor() {
        let mut hub = hub();
        hub.handle_datagram(&datagram("A", 9, accel(9.8, 0.0)), t(0)).unwrap();
        assert!(hub.disconnect("A"));
        assert!(!hub.disconnect("A"));
        assert!(hub.history("A").is_none());

        // Sequence numbers restart after reconnect
        assert!(hub.handle_datagram(&datagram("A", 1, accel(9.8, 0.0)), t(1)).is_ok());
    }

    #[test]
    fn test_latest_sorted_by_sensor() {
        let mut hub = hub();
        for (i, id) in ["C", "A", "B"].iter().enumerate() {
            hub.handle_datagram(&datagram(id, 1, accel(9.8, 0.0)), t(i as i64)).unwrap();
        }
        let ids: Vec<_> = hub.latest().into_iter().map(|r| r.sensor_id).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }
}
