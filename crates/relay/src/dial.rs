//! Dial-out: call a remote agent through its relay endpoint.
//!
//! A peer advertises `wss://relay/ws/announce`; the caller side is
//! `wss://relay/ws/input`. Dialing opens a WebSocket, sends one signed
//! `INPUT`, waits for the `OUTPUT` with the matching `input_id`, and closes.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

use oo_domain::{AgentKeys, Error, Result};
use oo_protocol::envelope::sign_payload;

const DIAL_TIMEOUT: Duration = Duration::from_secs(120);

/// Result of a dial-out exchange.
#[derive(Debug, Clone)]
pub struct DialOutput {
    pub input_id: String,
    pub result: String,
    pub success: bool,
}

/// Send one prompt to the agent behind `announce_url` and wait for its
/// result. `to_address` pins the recipient when known.
pub async fn dial(
    announce_url: &str,
    keys: &AgentKeys,
    prompt: &str,
    to_address: Option<&str>,
) -> Result<DialOutput> {
    let input_url = announce_url.replace("/ws/announce", "/ws/input");
    let input_id = uuid::Uuid::new_v4().to_string();

    let mut payload = json!({
        "prompt": prompt,
        "timestamp": chrono::Utc::now().timestamp(),
    });
    if let Some(to) = to_address {
        payload["to"] = json!(to);
    }
    let signature = sign_payload(keys, &payload);

    let input = json!({
        "type": "INPUT",
        "input_id": input_id,
        "prompt": prompt,
        "payload": payload,
        "from": keys.public_key_hex(),
        "signature": signature,
    });

    let (ws, _response) = tokio_tungstenite::connect_async(&input_url)
        .await
        .map_err(|e| Error::Http(format!("dial connect: {e}")))?;
    let (mut sink, mut stream) = ws.split();

    sink.send(Message::Text(serde_json::to_string(&input)?))
        .await
        .map_err(|e| Error::Http(format!("dial send: {e}")))?;

    let output = tokio::time::timeout(DIAL_TIMEOUT, async {
        while let Some(msg) = stream.next().await {
            let Ok(Message::Text(text)) = msg else {
                continue;
            };
            let Ok(value) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            if value.get("type").and_then(Value::as_str) == Some("OUTPUT")
                && value.get("input_id").and_then(Value::as_str) == Some(input_id.as_str())
            {
                return Some(value);
            }
        }
        None
    })
    .await
    .map_err(|_| Error::Timeout(format!("no OUTPUT for input {input_id}")))?
    .ok_or_else(|| Error::Http("connection closed before OUTPUT".into()))?;

    let _ = sink.send(Message::Close(None)).await;

    Ok(DialOutput {
        input_id,
        result: output
            .get("result")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        success: output
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}
