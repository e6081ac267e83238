//! Shared application state passed to all handlers.

use std::sync::Arc;
use std::time::Instant;

use sha2::{Digest, Sha256};

use oo_domain::AgentKeys;
use oo_sessions::SessionLog;
use oo_trust::TrustEngine;

use crate::agent::AgentFactory;
use crate::config::HostConfig;
use crate::logfile::ActivityLog;

/// Everything a request handler needs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<HostConfig>,
    pub keys: Arc<AgentKeys>,
    pub trust: Arc<TrustEngine>,
    pub sessions: Arc<SessionLog>,
    pub factory: Arc<dyn AgentFactory>,
    pub activity: Arc<ActivityLog>,

    /// Operator-level lists from config; exact-match, checked by the gate.
    pub blacklist: Arc<Vec<String>>,
    pub whitelist: Arc<Vec<String>>,

    pub started_at: Instant,
    /// SHA-256 of `OPENONION_API_KEY`, read once at startup.
    /// `None` disables the admin endpoints.
    pub admin_token_hash: Option<Arc<[u8; 32]>>,
}

impl AppState {
    /// Uptime in whole seconds, for `/health`.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Hash the admin bearer token from the environment, once.
pub fn admin_token_hash_from_env() -> Option<Arc<[u8; 32]>> {
    let token = std::env::var("OPENONION_API_KEY").ok()?;
    if token.is_empty() {
        return None;
    }
    let digest: [u8; 32] = Sha256::digest(token.as_bytes()).into();
    Some(Arc::new(digest))
}
