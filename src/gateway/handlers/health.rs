use axum::{extract::State, response::IntoResponse, Json};
use std::sync::OnceLock;

use crate::gateway::AppState;

pub(crate) static STARTUP_TIME: OnceLock<std::time::Instant> = OnceLock::new();

/// `GET /api/status`
pub(crate) async fn status_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `GET /api/health`
pub(crate) async fn api_health(State(state): State<AppState>) -> impl IntoResponse {
    let uptime_secs = STARTUP_TIME
        .get()
        .map(|t| t.elapsed().as_secs())
        .unwrap_or(0);

    // A failing store still answers the probe; the count is just absent.
    let sessions = match state.dispatcher.store().list().await {
        Ok(all) => Some(all.len()),
        Err(e) => {
            tracing::warn!(error = %e, "health: session listing failed");
            None
        }
    };

    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": uptime_secs,
        "sessions": sessions,
    }))
}
