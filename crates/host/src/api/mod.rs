//! HTTP dispatcher: routes, CORS, and the error-body convention.

pub mod admin;
pub mod input;
pub mod sessions;
pub mod system;

use axum::extract::ws::{CloseFrame, WebSocketUpgrade};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

/// Build the full router. CORS is wide open (`*`) and handles OPTIONS
/// preflights; admin endpoints carry their own bearer check.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(system::health))
        .route("/info", get(system::info))
        .route("/sessions", get(sessions::list_sessions))
        .route("/sessions/:id", get(sessions::get_session))
        .route("/input", post(input::input))
        .route("/admin/logs", get(admin::logs))
        .route("/admin/sessions", get(admin::sessions))
        .route("/ws", get(crate::ws::ws_handler))
        .fallback(fallback)
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Map a gate error onto its HTTP status (401 / 403).
pub fn gate_error_response(err: crate::auth::GateError) -> Response {
    let status = match err {
        crate::auth::GateError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        crate::auth::GateError::Forbidden(_) => StatusCode::FORBIDDEN,
    };
    api_error(status, err.to_string())
}

/// Unknown routes 404; a WebSocket upgrade on any path other than `/ws` is
/// accepted and immediately closed with code 4004.
async fn fallback(ws: Option<WebSocketUpgrade>) -> Response {
    match ws {
        Some(ws) => ws
            .on_upgrade(|mut socket| async move {
                let _ = socket
                    .send(axum::extract::ws::Message::Close(Some(CloseFrame {
                        code: 4004,
                        reason: "not found".into(),
                    })))
                    .await;
            })
            .into_response(),
        None => api_error(StatusCode::NOT_FOUND, "not found"),
    }
}
