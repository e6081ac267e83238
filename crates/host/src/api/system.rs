//! `GET /health` and `GET /info`.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "agent": state.factory.name(),
        "uptime": state.uptime_secs(),
    }))
}

/// Agent metadata plus onboarding requirements, so a stranger can discover
/// how to get in before opening a WebSocket.
pub async fn info(State(state): State<AppState>) -> Json<Value> {
    let mut body = json!({
        "name": state.factory.name(),
        "address": state.keys.address(),
        "tools": state.factory.tools(),
        "trust": state.trust.label(),
        "version": env!("CARGO_PKG_VERSION"),
    });

    if let Some(onboard) = state.trust.onboard_config() {
        body["onboard"] = json!({
            "invite_code": !onboard.invite_code.is_empty(),
            "payment": onboard.payment,
        });
    }

    Json(body)
}
