//! Append-only JSONL session log.
//!
//! One writer lock serializes appends; readers scan whole lines without
//! locking and resolve duplicates last-write-wins. A partial trailing line
//! (a crashed append) parses as malformed JSON and is skipped.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use oo_domain::Result;

use crate::record::{unix_now, SessionRecord};

/// Append-only session store at a single JSONL path.
pub struct SessionLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SessionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line. Creates parent directories on
    /// first write.
    pub fn save(&self, record: &SessionRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Most recent record for `session_id`, or `None` when unknown or
    /// expired (running records never expire from view).
    pub fn get(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let mut found = None;
        self.scan(|record| {
            if record.session_id == session_id {
                found = Some(record);
            }
        })?;
        Ok(found.filter(|r| !r.is_expired(unix_now())))
    }

    /// All visible sessions, deduplicated by id (latest line wins), expired
    /// non-running records filtered out, newest-first by `created`.
    pub fn list(&self) -> Result<Vec<SessionRecord>> {
        let mut latest: HashMap<String, SessionRecord> = HashMap::new();
        self.scan(|record| {
            latest.insert(record.session_id.clone(), record);
        })?;

        let now = unix_now();
        let mut records: Vec<SessionRecord> = latest
            .into_values()
            .filter(|r| !r.is_expired(now))
            .collect();
        records.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(records)
    }

    /// Single forward pass over the file. A missing file scans as empty.
    fn scan(&self, mut visit: impl FnMut(SessionRecord)) -> Result<()> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SessionRecord>(line) {
                Ok(record) => visit(record),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed session line");
                }
            }
        }
        Ok(())
    }
}
