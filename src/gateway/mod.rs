//! HTTP gateway.
//!
//! Serves:
//! - `POST /chats`             — run one instruction through the dispatcher
//! - `GET  /api/status`        — returns `{ "status": "ok" }`
//! - `GET  /api/health`        — version, uptime and session count
//! - `GET  /api/sessions`      — every stored summary
//! - `GET  /api/sessions/:id`  — one stored summary, or 404
//!
//! When `SCRAPEFLOW_API_TOKEN` is set every route requires it.

mod auth;
mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::dispatch::QueryDispatcher;

/// Environment variable holding the optional API token.
pub const API_TOKEN_ENV: &str = "SCRAPEFLOW_API_TOKEN";

// ---------------------------------------------------------------------------
// Shared state injected into axum handlers
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub(crate) dispatcher: Arc<QueryDispatcher>,
    /// Root that `results_json_file_path` must resolve inside.
    pub(crate) artifacts_dir: PathBuf,
    pub(crate) api_token: Option<String>,
}

impl AppState {
    pub fn new(dispatcher: Arc<QueryDispatcher>, artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            dispatcher,
            artifacts_dir: artifacts_dir.into(),
            api_token: None,
        }
    }

    /// Require `token` on every request. Empty tokens disable auth.
    pub fn with_api_token(mut self, token: Option<String>) -> Self {
        self.api_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Read the token from [`API_TOKEN_ENV`].
    pub fn with_api_token_from_env(self) -> Self {
        self.with_api_token(std::env::var(API_TOKEN_ENV).ok())
    }
}

// ---------------------------------------------------------------------------
// Gateway handle
// ---------------------------------------------------------------------------

/// Handle returned by [`start_gateway`].
pub struct Gateway {
    /// Server task handle.
    pub handle: JoinHandle<()>,
    /// The address the server is actually listening on.
    pub addr: SocketAddr,
}

/// Build the router without binding a socket.
pub fn build_router(state: AppState) -> Router {
    let api_router = Router::new()
        .route("/status", get(handlers::health::status_handler))
        .route("/health", get(handlers::health::api_health))
        .route("/sessions", get(handlers::sessions::api_sessions_list))
        .route("/sessions/:session_id", get(handlers::sessions::api_session_get));

    Router::new()
        .route("/chats", post(handlers::chats::api_chats))
        .nest("/api", api_router)
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Server startup
// ---------------------------------------------------------------------------

/// Start the gateway on `addr`. The server stops gracefully once
/// `shutdown` is cancelled.
pub async fn start_gateway(
    addr: SocketAddr,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<Gateway> {
    if state.api_token.is_some() {
        info!("API authentication enabled ({API_TOKEN_ENV} set)");
    } else {
        warn!("API authentication disabled ({API_TOKEN_ENV} not set)");
    }

    let _ = handlers::health::STARTUP_TIME.set(std::time::Instant::now());

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            error!("gateway server error: {e}");
        }
    });

    info!(%bound_addr, "gateway started");

    Ok(Gateway {
        handle,
        addr: bound_addr,
    })
}
