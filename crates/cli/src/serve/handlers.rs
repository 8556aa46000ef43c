//! HTTP route handlers: flags, transitions and audit queries.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flaggraph_core::{
    AuditLogFilter, AuditOperation, FlagError, FlagId, FlagRecord, FlagView, Page,
    DEFAULT_PAGE_LIMIT,
};
use serde::Deserialize;

use super::json_error;
use super::state::AppState;

#[derive(Debug, Deserialize)]
struct CreateFlagRequest {
    name: String,
    #[serde(default)]
    dependencies: Vec<FlagId>,
    actor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ActorRequest {
    actor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FlagQuery {
    #[serde(default)]
    nested: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuditQuery {
    flag_id: Option<FlagId>,
    operation: Option<String>,
    actor: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

/// Map a service error onto a status code and JSON body.
fn flag_error(err: FlagError) -> Response {
    let status = match &err {
        FlagError::NotFound { .. } | FlagError::NameNotFound { .. } => StatusCode::NOT_FOUND,
        FlagError::EmptyName => StatusCode::UNPROCESSABLE_ENTITY,
        FlagError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    json_error(status, &err.to_string())
}

fn flag_response(status: StatusCode, flag: &FlagRecord) -> Response {
    (status, Json(FlagView::from(flag))).into_response()
}

/// Decode an optional JSON body; an empty body decodes to the default.
fn optional_body<T: Default + serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, &format!("invalid JSON body: {}", e)))
}

fn flag_id(path: Result<Path<FlagId>, PathRejection>) -> Result<FlagId, Response> {
    path.map(|Path(id)| id)
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, &e.body_text()))
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

/// GET /flags
pub(crate) async fn handle_list_flags(State(state): State<Arc<AppState>>) -> Response {
    match state.flags.list_flags().await {
        Ok(flags) => {
            let views: Vec<FlagView> = flags.iter().map(FlagView::from).collect();
            (StatusCode::OK, Json(serde_json::json!({ "flags": views }))).into_response()
        }
        Err(e) => flag_error(e),
    }
}

/// POST /flags
pub(crate) async fn handle_create_flag(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Response {
    let request: CreateFlagRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return json_error(StatusCode::BAD_REQUEST, &format!("invalid JSON body: {}", e))
        }
    };
    match state
        .flags
        .create_flag(
            &request.name,
            &request.dependencies,
            request.actor.as_deref(),
        )
        .await
    {
        Ok(flag) => flag_response(StatusCode::CREATED, &flag),
        Err(e) => flag_error(e),
    }
}

/// GET /flags/{id}[?nested=true]
pub(crate) async fn handle_get_flag(
    State(state): State<Arc<AppState>>,
    path: Result<Path<FlagId>, PathRejection>,
    query: Result<Query<FlagQuery>, QueryRejection>,
) -> Response {
    let id = match flag_id(path) {
        Ok(id) => id,
        Err(r) => return r,
    };
    let nested = match query {
        Ok(Query(q)) => q.nested,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.body_text()),
    };

    if nested {
        match state.flags.get_flag_tree(id).await {
            Ok(tree) => (StatusCode::OK, Json(tree)).into_response(),
            Err(e) => flag_error(e),
        }
    } else {
        match state.flags.get_flag(id).await {
            Ok(flag) => flag_response(StatusCode::OK, &flag),
            Err(e) => flag_error(e),
        }
    }
}

/// GET /flags/by-name/{name}
pub(crate) async fn handle_get_flag_by_name(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match state.flags.get_flag_by_name(&name).await {
        Ok(flag) => flag_response(StatusCode::OK, &flag),
        Err(e) => flag_error(e),
    }
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Toggle,
    Activate,
    Deactivate,
}

async fn run_action(
    state: &AppState,
    action: Action,
    path: Result<Path<FlagId>, PathRejection>,
    body: &Bytes,
) -> Response {
    let id = match flag_id(path) {
        Ok(id) => id,
        Err(r) => return r,
    };
    let request: ActorRequest = match optional_body(body) {
        Ok(r) => r,
        Err(r) => return r,
    };
    let actor = request.actor.as_deref();
    let outcome = match action {
        Action::Toggle => state.flags.toggle_flag(id, actor).await,
        Action::Activate => state.flags.activate_flag(id, actor).await,
        Action::Deactivate => state.flags.deactivate_flag(id, actor).await,
    };
    match outcome {
        Ok(flag) => flag_response(StatusCode::OK, &flag),
        Err(e) => flag_error(e),
    }
}

/// POST /flags/{id}/toggle
pub(crate) async fn handle_toggle(
    State(state): State<Arc<AppState>>,
    path: Result<Path<FlagId>, PathRejection>,
    body: Bytes,
) -> Response {
    run_action(&state, Action::Toggle, path, &body).await
}

/// POST /flags/{id}/enable
pub(crate) async fn handle_activate(
    State(state): State<Arc<AppState>>,
    path: Result<Path<FlagId>, PathRejection>,
    body: Bytes,
) -> Response {
    run_action(&state, Action::Activate, path, &body).await
}

/// POST /flags/{id}/disable
pub(crate) async fn handle_deactivate(
    State(state): State<Arc<AppState>>,
    path: Result<Path<FlagId>, PathRejection>,
    body: Bytes,
) -> Response {
    run_action(&state, Action::Deactivate, path, &body).await
}

/// GET /flags/{id}/audit
pub(crate) async fn handle_flag_audit(
    State(state): State<Arc<AppState>>,
    path: Result<Path<FlagId>, PathRejection>,
) -> Response {
    let id = match flag_id(path) {
        Ok(id) => id,
        Err(r) => return r,
    };
    // 404 for unknown flags rather than an empty history.
    if let Err(e) = state.flags.get_flag(id).await {
        return flag_error(e);
    }
    let page = Page {
        limit: 0,
        offset: 0,
    };
    match state
        .flags
        .list_audit_logs(&AuditLogFilter::for_flag(id), page)
        .await
    {
        Ok(entries) => {
            (StatusCode::OK, Json(serde_json::json!({ "entries": entries }))).into_response()
        }
        Err(e) => flag_error(e),
    }
}

/// GET /audit-logs?flag_id&operation&actor&limit&offset
pub(crate) async fn handle_audit_logs(
    State(state): State<Arc<AppState>>,
    query: Result<Query<AuditQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(q)) => q,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.body_text()),
    };
    let operation = match query.operation.as_deref().map(str::parse::<AuditOperation>) {
        None => None,
        Some(Ok(op)) => Some(op),
        Some(Err(e)) => return json_error(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    let filter = AuditLogFilter {
        flag_id: query.flag_id,
        operation,
        actor: query.actor,
    };
    let page = Page {
        limit: query.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        offset: query.offset.unwrap_or(0),
    };
    match state.flags.list_audit_logs(&filter, page).await {
        Ok(entries) => {
            (StatusCode::OK, Json(serde_json::json!({ "entries": entries }))).into_response()
        }
        Err(e) => flag_error(e),
    }
}
