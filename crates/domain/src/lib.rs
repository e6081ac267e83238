//! Shared foundation for the OpenOnion host: the workspace-wide error type,
//! Ed25519 identity handling, and the canonical JSON serialization that the
//! signing protocol depends on.

pub mod canonical;
pub mod error;
pub mod identity;

pub use canonical::canonical_json;
pub use error::{Error, Result};
pub use identity::{short_address, strip_hex_prefix, verify_hex_signature, AgentKeys};
