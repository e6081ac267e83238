//! Relay uplink messages.
//!
//! A host keeps one outbound WebSocket to a relay. Three message flavors
//! travel on it: `ANNOUNCE` (host → relay, signed, doubles as heartbeat),
//! `INPUT` (relay → host, a task forwarded on behalf of a remote caller),
//! and `OUTPUT` (host → relay, the result, correlated by `input_id`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Inbound/outbound relay message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelayMessage {
    /// Relay → Host: a task from a remote caller.
    #[serde(rename = "INPUT")]
    Input {
        input_id: String,
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_address: Option<String>,
        /// Forward-compatible extras (signed envelope fields, metadata).
        #[serde(flatten)]
        extra: Map<String, Value>,
    },

    /// Host → Relay: the result for a forwarded task.
    #[serde(rename = "OUTPUT")]
    Output {
        input_id: String,
        result: String,
        success: bool,
    },

    /// Relay → Host: non-fatal error report. Logged, never terminates the loop.
    #[serde(rename = "ERROR")]
    Error {
        #[serde(default)]
        message: String,
    },

    /// Any message type this host does not handle.
    #[serde(other)]
    Unknown,
}
