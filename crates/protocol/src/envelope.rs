//! Signed request envelopes.
//!
//! ```text
//! {
//!   "payload":   { "prompt": "...", "timestamp": 1737000000, "to": "0x..."?, ... },
//!   "from":      "<caller public key, hex, optional 0x prefix>",
//!   "signature": "<Ed25519 over canonical_json(payload), hex>"
//! }
//! ```

use serde_json::{json, Value};

use oo_domain::{canonical_json, AgentKeys};

/// How far a payload timestamp may drift from the verifier's clock.
pub const SIGNATURE_EXPIRY_SECONDS: i64 = 300;

/// Sign a payload with the given identity, returning the hex signature.
pub fn sign_payload(keys: &AgentKeys, payload: &Value) -> String {
    keys.sign_hex(canonical_json(payload).as_bytes())
}

/// Verify a payload signature. Hex fields accept an optional `0x` prefix.
pub fn verify_payload(payload: &Value, signature: &str, public_key: &str) -> bool {
    oo_domain::verify_hex_signature(public_key, canonical_json(payload).as_bytes(), signature)
}

/// Build a complete signed envelope around a payload.
pub fn build_envelope(keys: &AgentKeys, payload: Value) -> Value {
    let signature = sign_payload(keys, &payload);
    json!({
        "payload": payload,
        "from": keys.public_key_hex(),
        "signature": signature,
    })
}
