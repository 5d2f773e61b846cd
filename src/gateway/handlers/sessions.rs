use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::gateway::AppState;

/// `GET /api/sessions` — every stored summary keyed by session id.
pub(crate) async fn api_sessions_list(State(state): State<AppState>) -> impl IntoResponse {
    match state.dispatcher.store().list().await {
        Ok(sessions) => Json(serde_json::json!({ "sessions": sessions })).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "session listing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

/// `GET /api/sessions/:session_id` — one stored summary.
pub(crate) async fn api_session_get(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.dispatcher.store().get(&session_id).await {
        Ok(Some(summary)) => Json(serde_json::json!({
            "session_id": session_id,
            "summary": summary,
        }))
        .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "session not found", "session_id": session_id})),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "session lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}
