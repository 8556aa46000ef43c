//! `flaggraph serve` -- HTTP JSON API over the flag service.
//!
//! Endpoints:
//! - GET  /health                 - Server status
//! - GET  /flags                  - All flags, ordered by id
//! - POST /flags                  - Create a flag
//! - GET  /flags/{id}             - One flag; `?nested=true` expands dependencies
//! - GET  /flags/by-name/{name}   - Look a flag up by name
//! - POST /flags/{id}/toggle      - Flip a flag's state
//! - POST /flags/{id}/enable      - Activate (no-op if already active)
//! - POST /flags/{id}/disable     - Deactivate (no-op if already inactive)
//! - GET  /flags/{id}/audit       - Audit history of one flag
//! - GET  /audit-logs             - Filtered, paginated audit log
//!
//! All responses use Content-Type: application/json. Errors are
//! `{"error": message}`.

mod handlers;
mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use flaggraph_core::{FlagService, MemoryStorage};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use self::handlers::{
    handle_activate, handle_audit_logs, handle_create_flag, handle_deactivate, handle_flag_audit,
    handle_get_flag, handle_get_flag_by_name, handle_health, handle_list_flags, handle_not_found,
    handle_toggle,
};
use self::state::AppState;

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> axum::response::Response {
    (status, Json(serde_json::json!({"error": message}))).into_response()
}

/// Build the API router over `state`.
fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/flags", get(handle_list_flags).post(handle_create_flag))
        .route("/flags/by-name/{name}", get(handle_get_flag_by_name))
        .route("/flags/{id}", get(handle_get_flag))
        .route("/flags/{id}/toggle", post(handle_toggle))
        .route("/flags/{id}/enable", post(handle_activate))
        .route("/flags/{id}/disable", post(handle_deactivate))
        .route("/flags/{id}/audit", get(handle_flag_audit))
        .route("/audit-logs", get(handle_audit_logs))
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Start the HTTP server on the given port over a fresh in-memory store.
///
/// The store lives as long as the server; shutting down drops it.
pub async fn start_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let storage = Arc::new(MemoryStorage::new());
    let state = Arc::new(AppState {
        flags: FlagService::new(storage),
    });

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "flaggraph listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received shutdown signal"),
        // Without a signal handler the server runs until killed.
        Err(e) => {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}
