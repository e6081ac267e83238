//! The signed-request gate.
//!
//! Every request — HTTP, WebSocket, or forwarded by a relay — must be an
//! Ed25519-signed envelope. Signature verification is unconditional: the
//! operator whitelist bypasses the trust *policy*, never the signature.
//! The blocklist is checked before the signature so blocked identities
//! cannot use the verifier as an oracle.

use serde_json::{json, Value};

use oo_protocol::envelope::{verify_payload, SIGNATURE_EXPIRY_SECONDS};
use oo_trust::TrustEngine;

/// Authentication failure, displayed with its wire-protocol category
/// prefix (`unauthorized:` → 401, `forbidden:` → 403).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl GateError {
    fn unauthorized(msg: &str) -> Self {
        Self::Unauthorized(msg.to_owned())
    }
}

/// A request that passed the gate.
#[derive(Debug, Clone)]
pub struct AuthedInput {
    pub prompt: String,
    pub identity: String,
}

/// Authenticate a signed envelope and apply the trust policy.
///
/// `whitelist` and `blacklist` are the operator-level parameter lists: the
/// blacklist rejects before signature verification, the whitelist skips
/// policy evaluation after it.
pub async fn extract_and_authenticate(
    data: &Value,
    trust: &TrustEngine,
    blacklist: &[String],
    whitelist: &[String],
    agent_address: Option<&str>,
) -> Result<AuthedInput, GateError> {
    let identity = verify_signed(data, blacklist, agent_address)?;

    let payload = &data["payload"];
    let prompt = payload
        .get("prompt")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    // Parameter whitelist bypasses trust policy, not signature verification.
    if whitelist.iter().any(|w| w == &identity) {
        return Ok(AuthedInput { prompt, identity });
    }

    let request = json!({
        "prompt": prompt,
        "invite_code": payload.get("invite_code").cloned().unwrap_or(Value::Null),
        "payment": payload.get("payment").cloned().unwrap_or(json!(0)),
    });
    let decision = trust.should_allow(&identity, &request).await;
    if decision.allow {
        Ok(AuthedInput { prompt, identity })
    } else {
        Err(GateError::Forbidden(decision.reason))
    }
}

/// Protocol-level verification only: envelope shape, timestamp window,
/// recipient, and the Ed25519 signature. No identity bypasses this.
///
/// Returns the caller's identity (the `from` field, verbatim).
pub fn verify_signed(
    data: &Value,
    blacklist: &[String],
    agent_address: Option<&str>,
) -> Result<String, GateError> {
    if data.get("payload").is_none() || data.get("signature").is_none() {
        return Err(GateError::unauthorized("signed request required"));
    }

    let payload = &data["payload"];
    let identity = data.get("from").and_then(Value::as_str).unwrap_or_default();
    let signature = data
        .get("signature")
        .and_then(Value::as_str)
        .unwrap_or_default();

    // Blocked identities are rejected before signature verification: no
    // CPU spent, and no selective-validation oracle.
    if !identity.is_empty() && blacklist.iter().any(|b| b == identity) {
        return Err(GateError::Forbidden("blacklisted".to_owned()));
    }

    if identity.is_empty() {
        return Err(GateError::unauthorized("'from' field required"));
    }
    if signature.is_empty() {
        return Err(GateError::unauthorized("signature required"));
    }
    // Accept integer or fractional unix seconds.
    let Some(timestamp) = payload
        .get("timestamp")
        .and_then(|t| t.as_i64().or_else(|| t.as_f64().map(|f| f as i64)))
    else {
        return Err(GateError::unauthorized("timestamp required in payload"));
    };

    let now = oo_sessions::unix_now();
    if (now - timestamp).abs() > SIGNATURE_EXPIRY_SECONDS {
        return Err(GateError::unauthorized("signature expired"));
    }

    if let (Some(agent_address), Some(to)) =
        (agent_address, payload.get("to").and_then(Value::as_str))
    {
        if to != agent_address {
            return Err(GateError::unauthorized("wrong recipient"));
        }
    }

    if !verify_payload(payload, signature, identity) {
        return Err(GateError::unauthorized("invalid signature"));
    }

    Ok(identity.to_owned())
}
