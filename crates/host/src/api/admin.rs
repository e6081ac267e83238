//! Operator endpoints, gated by `Authorization: Bearer <OPENONION_API_KEY>`.
//!
//! The token is read from the environment once at startup and kept as a
//! SHA-256 digest; the provided token is hashed and compared in constant
//! time so neither value nor length leaks.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::api::api_error;
use crate::state::AppState;

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = &state.admin_token_hash else {
        return Err(api_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized: admin endpoints disabled (OPENONION_API_KEY not set)",
        ));
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    let provided_hash = Sha256::digest(provided.as_bytes());
    if !bool::from(provided_hash.ct_eq(expected.as_slice())) {
        return Err(api_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized: invalid or missing API key",
        ));
    }
    Ok(())
}

/// `GET /admin/logs` — the plain-text activity log.
pub async fn logs(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }
    match state.activity.read() {
        Some(content) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            content,
        )
            .into_response(),
        None => api_error(StatusCode::NOT_FOUND, "not found"),
    }
}

/// `GET /admin/sessions` — aggregated evaluation session files
/// (`<co_dir>/evals/*.yaml`), newest first by `updated`/`created`.
pub async fn sessions(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }

    let evals_dir = state.config.co_dir.join("evals");
    let mut sessions: Vec<Value> = Vec::new();

    if let Ok(entries) = std::fs::read_dir(&evals_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .ok()
                .and_then(|raw| serde_yaml::from_str::<Value>(&raw).ok())
            {
                Some(session) if !session.is_null() => sessions.push(session),
                _ => {
                    tracing::debug!(path = %path.display(), "skipping unreadable eval session");
                }
            }
        }
    }

    sessions.sort_by(|a, b| sort_key(b).cmp(&sort_key(a)));
    Json(json!({ "sessions": sessions })).into_response()
}

fn sort_key(session: &Value) -> String {
    session
        .get("updated")
        .or_else(|| session.get("created"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}
