use axum::{Json, extract::State, response::IntoResponse};

use crate::AppState;
use crate::metrics::{HealthStatus, SessionHealth};

/// Health check endpoint - returns bridge and session status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.state().await.ok();
    let snapshot = state.metrics.snapshot();

    let running = session.as_ref().map(|s| s.running).unwrap_or(false);
    let status = if running && snapshot.errors.pty == 0 {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthStatus {
        status: status.to_string(),
        session: SessionHealth {
            running,
            pid: session.as_ref().and_then(|s| s.pid),
            cols: session.as_ref().map(|s| s.cols).unwrap_or(0),
            rows: session.as_ref().map(|s| s.rows).unwrap_or(0),
        },
        clients: snapshot.clients.active,
        uptime_secs: snapshot.uptime_secs,
    })
}

/// Metrics endpoint - returns detailed server metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}
