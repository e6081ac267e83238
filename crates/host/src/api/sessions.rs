//! Session recovery endpoints.
//!
//! - `GET /sessions`      — all visible sessions, newest first
//! - `GET /sessions/{id}` — one session, or 404 when unknown/expired

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::api::api_error;
use crate::state::AppState;

pub async fn list_sessions(State(state): State<AppState>) -> Response {
    match state.sessions.list() {
        Ok(records) => Json(json!({ "sessions": records })).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("internal: {e}")),
    }
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.sessions.get(&id) {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("internal: {e}")),
    }
}
