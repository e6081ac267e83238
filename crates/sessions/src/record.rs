use serde::{Deserialize, Serialize};

/// Lifecycle state of a session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Done,
}

/// One line of the session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub status: SessionStatus,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Unix seconds.
    pub created: i64,
    /// Unix seconds; absent means no expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl SessionRecord {
    /// Fresh `running` record with its expiry stamped at write time.
    pub fn running(session_id: impl Into<String>, prompt: impl Into<String>, ttl: i64) -> Self {
        let now = unix_now();
        Self {
            session_id: session_id.into(),
            status: SessionStatus::Running,
            prompt: prompt.into(),
            result: None,
            created: now,
            expires: Some(now + ttl),
            duration_ms: None,
        }
    }

    /// Mark this record completed with its result.
    pub fn complete(&mut self, result: impl Into<String>, duration_ms: u64) {
        self.status = SessionStatus::Done;
        self.result = Some(result.into());
        self.duration_ms = Some(duration_ms);
    }

    /// Expiry gates visibility only, and never applies to a running record:
    /// a long job must stay reachable until it finishes.
    pub fn is_expired(&self, now: i64) -> bool {
        if self.status == SessionStatus::Running {
            return false;
        }
        matches!(self.expires, Some(expires) if expires < now)
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
