//! Plain-text activity log, served back by `GET /admin/logs`.
//!
//! One line per notable event (onboarding outcomes, admin actions, agent
//! failures). Append failures are logged and swallowed — the activity log
//! must never take a request down with it.

use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// Append-only text log under `<co_dir>/logs/<name>.log`.
pub struct ActivityLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ActivityLog {
    pub fn new(co_dir: &Path, name: &str) -> Self {
        Self {
            path: co_dir.join("logs").join(format!("{name}.log")),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line.
    pub fn append(&self, line: &str) {
        let stamped = format!("{} {line}\n", chrono::Utc::now().to_rfc3339());
        let _guard = self.lock.lock();
        let outcome = (|| -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            file.write_all(stamped.as_bytes())
        })();
        if let Err(e) = outcome {
            tracing::warn!(path = %self.path.display(), error = %e, "activity log append failed");
        }
    }

    /// Full log contents, or `None` when nothing has been logged yet.
    pub fn read(&self) -> Option<String> {
        std::fs::read_to_string(&self.path).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(dir.path(), "echo");
        assert!(log.read().is_none());
        log.append("verified 0xabc via invite code BETA");
        log.append("blocked 0xbad");
        let content = log.read().unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("invite code BETA"));
    }
}
