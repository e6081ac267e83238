//! Wire protocol: signed request envelopes, relay messages, and event
//! stream metadata.
//!
//! Every request an agent host accepts — over HTTP, WebSocket, or the relay
//! uplink — is an Ed25519-signed envelope. The signature covers the
//! canonical JSON form of the payload (sorted keys, compact separators),
//! never the envelope itself.

pub mod envelope;
pub mod event;
pub mod relay;

pub use envelope::{build_envelope, sign_payload, verify_payload, SIGNATURE_EXPIRY_SECONDS};
pub use event::{stamp_event, msg};
pub use relay::RelayMessage;
