mod handlers;
mod sensor_hub;
mod state;

use std::sync::Arc;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::{mpsc, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use sensor_hub::{start_sensor_hub, FallAlert, HubConfig};
use state::{HubState, SharedState};

// ─── Fall Alert Task ─────────────────────────────────────────────────────────

async fn run_alert_sink(mut rx: mpsc::Receiver<FallAlert>, shared: SharedState) {
    while let Some(alert) = rx.recv().await {
        warn!(
            "🚨 Fall detected on {} ({:.1} m/s², {:.0}% confidence)",
            alert.sensor_id, alert.magnitude, alert.confidence_pct
        );
        shared.write().await.push_alert(alert);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "posture_backend=info,posture_core=info".into()),
        )
        .init();

    info!("🩺 Posture Hub starting...");

    let config = HubConfig::default();
    let shared: SharedState = Arc::new(RwLock::new(HubState::new(&config)));

    let (fall_tx, fall_rx) = mpsc::channel::<FallAlert>(64);
    tokio::spawn(run_alert_sink(fall_rx, shared.clone()));
    tokio::spawn(start_sensor_hub(config.clone(), shared.clone(), fall_tx));

    // CORS: allow all origins for the mobile app during development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/sensors", get(handlers::list_sensors))
        .route("/sensors/:sensor_id/history", get(handlers::sensor_history))
        .route("/sensors/:sensor_id/disconnect", post(handlers::disconnect_sensor))
        .route("/alerts", get(handlers::list_alerts))
        .layer(cors)
        .with_state(shared);

    let addr = format!("0.0.0.0:{}", config.http_port);
    info!("🚀 Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("http server failed")?;
    Ok(())
}
