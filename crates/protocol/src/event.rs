//! Event stream metadata.
//!
//! Events flowing from an agent to a connected client are free-form JSON
//! objects with a required `type` field. The host stamps each outbound event
//! with a unique `id` and a `ts` timestamp before it hits the socket; agent
//! event types (`thinking`, `tool_call`, ...) are otherwise opaque to the
//! transport.

use serde_json::{json, Value};

/// Message `type` values the transport layer itself understands.
/// Everything else passes through to the agent untouched.
pub mod msg {
    pub const INPUT: &str = "INPUT";
    pub const OUTPUT: &str = "OUTPUT";
    pub const ERROR: &str = "ERROR";
    pub const PING: &str = "PING";
    pub const PONG: &str = "PONG";
    pub const ONBOARD_REQUIRED: &str = "ONBOARD_REQUIRED";
    pub const ONBOARD_SUBMIT: &str = "ONBOARD_SUBMIT";
    pub const ONBOARD_SUCCESS: &str = "ONBOARD_SUCCESS";
    pub const ADMIN_PREFIX: &str = "ADMIN_";
    pub const ADMIN_RESULT: &str = "ADMIN_RESULT";
    pub const ANNOUNCE: &str = "ANNOUNCE";
}

/// Attach server-side metadata (`id`, `ts` in unix milliseconds) to an
/// outbound event. Non-object events are left alone.
pub fn stamp_event(event: &mut Value) {
    if let Value::Object(map) = event {
        map.insert(
            "id".to_owned(),
            json!(uuid::Uuid::new_v4().to_string()),
        );
        map.insert(
            "ts".to_owned(),
            json!(chrono::Utc::now().timestamp_millis()),
        );
    }
}
