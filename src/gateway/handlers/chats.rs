use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::dispatch::{QueryOutcome, ResultsRef};
use crate::gateway::AppState;
use crate::tools::sandbox_path;

#[derive(Debug, Deserialize)]
pub(crate) struct ChatRequest {
    #[serde(default)]
    text_input: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatResponse {
    text: String,
    results: Value,
    session_id: String,
}

/// `POST /chats` — run one instruction and return the parsed results.
pub(crate) async fn api_chats(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> impl IntoResponse {
    let Some(text_input) = body.text_input.filter(|t| !t.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "missing `text_input`"})),
        )
            .into_response();
    };

    let outcome = match state
        .dispatcher
        .invoke(&text_input, body.session_id.as_deref())
        .await
    {
        Ok(o) => o,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "chat request failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": format!("{e:#}")})),
            )
                .into_response();
        }
    };

    match outcome {
        QueryOutcome::Answered(result) => {
            let results = match result.results {
                Some(ResultsRef::FilePath(p)) => load_results_file(&state.artifacts_dir, &p).await,
                Some(ResultsRef::Inline(v)) => v,
                None => Value::Null,
            };
            Json(ChatResponse {
                text: result.text.unwrap_or(text_input),
                results,
                session_id: result.session_id,
            })
            .into_response()
        }
        QueryOutcome::ParseFailed(failure) => {
            (StatusCode::BAD_GATEWAY, Json(failure)).into_response()
        }
    }
}

/// Read and parse a results artifact. Any failure yields `null`.
async fn load_results_file(artifacts_dir: &Path, raw: &str) -> Value {
    let path = match sandbox_path(artifacts_dir, raw) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(path = %raw, error = %e, "results path rejected");
            return Value::Null;
        }
    };
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "results file unreadable");
            return Value::Null;
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "results file is not JSON");
            Value::Null
        }
    }
}
