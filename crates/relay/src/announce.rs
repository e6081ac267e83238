//! Signed ANNOUNCE messages and endpoint discovery.
//!
//! An ANNOUNCE advertises this host's address, a human summary, and the
//! endpoints it is reachable on. The signature covers the canonical JSON of
//! every field except the signature itself, so the relay (and any peer) can
//! verify the announcement against the address.

use std::time::Duration;

use serde_json::{json, Value};

use oo_domain::{canonical_json, AgentKeys};

const PUBLIC_IP_LOOKUP: &str = "https://api.ipify.org";
const PUBLIC_IP_TIMEOUT: Duration = Duration::from_secs(5);

/// Build and sign an ANNOUNCE message.
pub fn signed_announce(
    keys: &AgentKeys,
    summary: &str,
    endpoints: &[String],
    relay: Option<&str>,
) -> Value {
    let mut message = json!({
        "type": "ANNOUNCE",
        "address": keys.address(),
        "timestamp": chrono::Utc::now().timestamp(),
        "summary": summary,
        "endpoints": endpoints,
        "relay": relay,
    });
    let signature = keys.sign_hex(canonical_json(&message).as_bytes());
    message["signature"] = json!(signature);
    message
}

/// Verify an ANNOUNCE message against its embedded address.
pub fn verify_announce(message: &Value) -> bool {
    let Some(signature) = message.get("signature").and_then(Value::as_str) else {
        return false;
    };
    let Some(address) = message.get("address").and_then(Value::as_str) else {
        return false;
    };
    let mut unsigned = message.clone();
    if let Value::Object(map) = &mut unsigned {
        map.remove("signature");
    }
    oo_domain::verify_hex_signature(address, canonical_json(&unsigned).as_bytes(), signature)
}

/// Discover the endpoints this host is reachable on: `localhost`, the
/// non-loopback local IP, and (best effort) the public IP. Each IP yields an
/// HTTP and a WebSocket URL.
pub async fn discover_endpoints(port: u16) -> Vec<String> {
    let mut ips = vec!["localhost".to_owned()];

    if let Some(local) = local_ip() {
        if !ips.contains(&local) {
            ips.push(local);
        }
    }

    if let Some(public) = public_ip().await {
        if !ips.contains(&public) {
            ips.push(public);
        }
    }

    ips.iter()
        .flat_map(|ip| {
            [
                format!("http://{ip}:{port}"),
                format!("ws://{ip}:{port}/ws"),
            ]
        })
        .collect()
}

/// The local IP used for outbound traffic, via a connected (never sent)
/// UDP socket. Loopback-only hosts return `None`.
fn local_ip() -> Option<String> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let addr = socket.local_addr().ok()?;
    if addr.ip().is_loopback() {
        return None;
    }
    Some(addr.ip().to_string())
}

/// One-time public IP lookup. Failures are logged and swallowed — a host
/// behind NAT is still reachable through the relay.
async fn public_ip() -> Option<String> {
    let client = reqwest::Client::builder()
        .timeout(PUBLIC_IP_TIMEOUT)
        .build()
        .ok()?;
    match client.get(PUBLIC_IP_LOOKUP).send().await {
        Ok(response) => {
            let text = response.text().await.ok()?;
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "public IP lookup failed");
            None
        }
    }
}
