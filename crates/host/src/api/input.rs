//! `POST /input` — authenticate, invoke, persist, respond.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::api::{api_error, gate_error_response};
use crate::auth::extract_and_authenticate;
use crate::channel::io_channel;
use crate::invoker::invoke_agent;
use crate::state::AppState;

pub async fn input(State(state): State<AppState>, body: Bytes) -> Response {
    let data: Value = match serde_json::from_slice(&body) {
        Ok(data) => data,
        Err(_) => return api_error(StatusCode::BAD_REQUEST, "bad request: invalid JSON"),
    };

    let authed = match extract_and_authenticate(
        &data,
        &state.trust,
        &state.blacklist,
        &state.whitelist,
        Some(state.keys.address()),
    )
    .await
    {
        Ok(authed) => authed,
        Err(err) => return gate_error_response(err),
    };

    if authed.prompt.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "bad request: prompt required");
    }

    let session = data["payload"].get("session").cloned();

    // HTTP has no event stream; the channel's remote half is dropped and
    // emitted events vanish. Streaming clients use /ws.
    let (io, _remote) = io_channel();

    match invoke_agent(
        state.factory.clone(),
        state.sessions.clone(),
        authed.prompt,
        session,
        io,
        state.config.result_ttl,
    )
    .await
    {
        Ok(result) => Json(json!({
            "session_id": result.session_id,
            "status": "done",
            "result": result.result,
            "duration_ms": result.duration_ms,
            "session": result.session,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(identity = %oo_domain::short_address(&authed.identity), error = %e, "agent invocation failed");
            state.activity.append(&format!("agent failure: {e}"));
            api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("internal: {e}"))
        }
    }
}
