use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use posture_core::PostureRecord;
use serde::Serialize;
use tracing::info;

use crate::sensor_hub::FallAlert;
use crate::state::{HealthSnapshot, SharedState};

// ─── Response Types ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SensorSummary {
    pub display_name: &'static str,
    #[serde(flatten)]
    pub latest: PostureRecord,
}

// ─── Handlers ────────────────────────────────────────────────────────────────

pub async fn health(State(shared): State<SharedState>) -> Json<HealthSnapshot> {
    Json(shared.read().await.health())
}

/// Latest classification of every known sensor.
pub async fn list_sensors(State(shared): State<SharedState>) -> Json<Vec<SensorSummary>> {
    let latest = shared.read().await.hub.latest();
    Json(
        latest
            .into_iter()
            .map(|r| SensorSummary { display_name: r.posture.display_name(), latest: r })
            .collect(),
    )
}

pub async fn sensor_history(
    State(shared): State<SharedState>,
    Path(sensor_id): Path<String>,
) -> Result<Json<Vec<PostureRecord>>, StatusCode> {
    shared
        .read()
        .await
        .hub
        .history(&sensor_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Forget a sensor's carried state, as on a BLE disconnect.
pub async fn disconnect_sensor(
    State(shared): State<SharedState>,
    Path(sensor_id): Path<String>,
) -> StatusCode {
    if shared.write().await.hub.disconnect(&sensor_id) {
        info!("Sensor {sensor_id} disconnected");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn list_alerts(State(shared): State<SharedState>) -> Json<Vec<FallAlert>> {
    Json(shared.read().await.alerts())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use posture_core::{encode_frame, Posture, SixAxisReading};
    use tokio::sync::RwLock;

    use crate::sensor_hub::HubConfig;
    use crate::state::HubState;

    fn shared_with_sensor(sensor_id: &str) -> SharedState {
        let mut state = HubState::new(&HubConfig::default());
        let frame = encode_frame(&SixAxisReading::new([0.0, 0.0, 9.8], [0.0; 3]));
        let datagram = serde_json::json!({
            "sensor_id": sensor_id,
            "seq_num": 1,
            "frame_hex": hex::encode(frame),
        })
        .to_string();
        state.hub.handle_datagram(datagram.as_bytes(), Utc::now()).unwrap();
        Arc::new(RwLock::new(state))
    }

    #[tokio::test]
    async fn test_list_sensors() {
        let shared = shared_with_sensor("A");
        let Json(sensors) = list_sensors(State(shared)).await;
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].latest.posture, Posture::LyingDorsal);
        assert_eq!(sensors[0].display_name, "Lying - Dorsal");
    }

    #[tokio::test]
    async fn test_history_unknown_sensor_is_404() {
        let shared = shared_with_sensor("A");
        let found = sensor_history(State(shared.clone()), Path("A".to_string())).await;
        assert_eq!(found.map(|Json(h)| h.len()), Ok(1));

        let missing = sensor_history(State(shared), Path("Z".to_string())).await;
        assert_eq!(missing.err(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_disconnect() {
        let shared = shared_with_sensor("A");
        assert_eq!(disconnect_sensor(State(shared.clone()), Path("A".to_string())).await, StatusCode::NO_CONTENT);
        assert_eq!(disconnect_sensor(State(shared.clone()), Path("A".to_string())).await, StatusCode::NOT_FOUND);

        let Json(h) = health(State(shared)).await;
        assert_eq!(h.sensors, 0);
    }
}
