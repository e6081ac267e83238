//! File-backed trust store.
//!
//! Identity lists live as newline-delimited text files under a single
//! directory: `contacts.txt`, `whitelist.txt`, `blocklist.txt`,
//! `admins.txt`. Lines starting with `#` and blank lines are ignored. A line
//! containing `*` is a wildcard: the `*` is removed and the remainder is
//! matched as a substring of the candidate address. Comparison is
//! case-sensitive.
//!
//! Missing files read as empty sets. Writes take an exclusive advisory lock
//! on the list file; reads are unlocked — a freshly added entry becomes
//! visible to the next request.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::Serialize;

use oo_domain::Result;

/// Trust level derived from list membership. `Blocked` is sticky: it wins
/// over every other membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Stranger,
    Contact,
    Whitelist,
    Blocked,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Stranger => "stranger",
            TrustLevel::Contact => "contact",
            TrustLevel::Whitelist => "whitelist",
            TrustLevel::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the list files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum List {
    Contacts,
    Whitelist,
    Blocklist,
    Admins,
}

impl List {
    fn file_name(&self) -> &'static str {
        match self {
            List::Contacts => "contacts.txt",
            List::Whitelist => "whitelist.txt",
            List::Blocklist => "blocklist.txt",
            List::Admins => "admins.txt",
        }
    }
}

/// File-backed sets of identities grouped by trust level.
#[derive(Debug, Clone)]
pub struct TrustStore {
    dir: PathBuf,
}

impl TrustStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn list_path(&self, list: List) -> PathBuf {
        self.dir.join(list.file_name())
    }

    /// Whether `address` matches any entry in `list` (exact or wildcard).
    pub fn contains(&self, list: List, address: &str) -> Result<bool> {
        let path = self.list_path(list);
        if !path.exists() {
            return Ok(false);
        }
        let content = fs::read_to_string(&path)?;
        Ok(content.lines().any(|line| line_matches(line, address)))
    }

    /// Add `address` to `list`. Idempotent: a no-op if already present.
    pub fn add(&self, list: List, address: &str) -> Result<()> {
        if self.contains(list, address)? {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.list_path(list))?;
        file.lock_exclusive()?;
        let mut file = file;
        let outcome = writeln!(file, "{address}");
        let _ = FileExt::unlock(&file);
        outcome?;
        Ok(())
    }

    /// Remove `address` from `list`. A no-op if absent or the file is missing.
    pub fn remove(&self, list: List, address: &str) -> Result<()> {
        let path = self.list_path(list);
        if !path.exists() {
            return Ok(());
        }
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        file.lock_exclusive()?;
        let outcome = (|| -> Result<()> {
            let content = fs::read_to_string(&path)?;
            let kept: Vec<&str> = content
                .lines()
                .filter(|line| line.trim() != address)
                .collect();
            let mut body = kept.join("\n");
            if !body.is_empty() {
                body.push('\n');
            }
            fs::write(&path, body)?;
            Ok(())
        })();
        let _ = FileExt::unlock(&file);
        outcome
    }

    /// Derive the trust level of `address` from list membership.
    pub fn get_level(&self, address: &str) -> Result<TrustLevel> {
        if self.contains(List::Blocklist, address)? {
            return Ok(TrustLevel::Blocked);
        }
        if self.contains(List::Whitelist, address)? {
            return Ok(TrustLevel::Whitelist);
        }
        if self.contains(List::Contacts, address)? {
            return Ok(TrustLevel::Contact);
        }
        Ok(TrustLevel::Stranger)
    }

    // ── Promotion / demotion compositions ────────────────────────────

    pub fn promote_to_contact(&self, address: &str) -> Result<()> {
        self.add(List::Contacts, address)
    }

    pub fn promote_to_whitelist(&self, address: &str) -> Result<()> {
        self.remove(List::Contacts, address)?;
        self.add(List::Whitelist, address)
    }

    pub fn demote_to_contact(&self, address: &str) -> Result<()> {
        self.remove(List::Whitelist, address)?;
        self.add(List::Contacts, address)
    }

    pub fn demote_to_stranger(&self, address: &str) -> Result<()> {
        self.remove(List::Whitelist, address)?;
        self.remove(List::Contacts, address)
    }

    pub fn block(&self, address: &str) -> Result<()> {
        self.add(List::Blocklist, address)
    }

    pub fn unblock(&self, address: &str) -> Result<()> {
        self.remove(List::Blocklist, address)
    }
}

fn line_matches(line: &str, address: &str) -> bool {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return false;
    }
    if line == address {
        return true;
    }
    if line.contains('*') {
        let pattern = line.replace('*', "");
        return address.contains(&pattern);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, TrustStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn missing_files_are_empty_sets() {
        let (_dir, store) = store();
        assert!(!store.contains(List::Contacts, "0xabc").unwrap());
        assert_eq!(store.get_level("0xabc").unwrap(), TrustLevel::Stranger);
    }

    #[test]
    fn add_is_idempotent() {
        let (dir, store) = store();
        store.add(List::Contacts, "0xabc").unwrap();
        store.add(List::Contacts, "0xabc").unwrap();
        let content = std::fs::read_to_string(dir.path().join("contacts.txt")).unwrap();
        assert_eq!(content.matches("0xabc").count(), 1);
        assert_eq!(store.get_level("0xabc").unwrap(), TrustLevel::Contact);
    }

    #[test]
    fn remove_absent_is_noop() {
        let (_dir, store) = store();
        store.remove(List::Whitelist, "0xabc").unwrap();
        store.add(List::Whitelist, "0xabc").unwrap();
        store.remove(List::Whitelist, "0xmissing").unwrap();
        assert!(store.contains(List::Whitelist, "0xabc").unwrap());
    }

    #[test]
    fn comments_and_blanks_ignored() {
        let (dir, store) = store();
        std::fs::write(
            dir.path().join("whitelist.txt"),
            "# trusted peers\n\n0xabc\n",
        )
        .unwrap();
        assert!(store.contains(List::Whitelist, "0xabc").unwrap());
        assert!(!store.contains(List::Whitelist, "# trusted peers").unwrap());
    }

    #[test]
    fn wildcard_matches_substring() {
        let (dir, store) = store();
        std::fs::write(dir.path().join("blocklist.txt"), "0xbad*\n").unwrap();
        assert!(store.contains(List::Blocklist, "0xbad123").unwrap());
        assert!(store.contains(List::Blocklist, "pre0xbad123").unwrap());
        assert!(!store.contains(List::Blocklist, "0xgood").unwrap());
    }

    #[test]
    fn blocked_overrides_everything() {
        let (_dir, store) = store();
        store.add(List::Whitelist, "0xabc").unwrap();
        store.add(List::Contacts, "0xabc").unwrap();
        store.block("0xabc").unwrap();
        assert_eq!(store.get_level("0xabc").unwrap(), TrustLevel::Blocked);
    }

    #[test]
    fn block_unblock_restores_prior_level() {
        let (_dir, store) = store();
        store.promote_to_contact("0xabc").unwrap();
        let before = store.get_level("0xabc").unwrap();
        store.block("0xabc").unwrap();
        store.unblock("0xabc").unwrap();
        assert_eq!(store.get_level("0xabc").unwrap(), before);
    }

    #[test]
    fn promotion_ladder() {
        let (_dir, store) = store();
        store.promote_to_contact("0xabc").unwrap();
        assert_eq!(store.get_level("0xabc").unwrap(), TrustLevel::Contact);
        store.promote_to_whitelist("0xabc").unwrap();
        assert_eq!(store.get_level("0xabc").unwrap(), TrustLevel::Whitelist);
        store.demote_to_contact("0xabc").unwrap();
        assert_eq!(store.get_level("0xabc").unwrap(), TrustLevel::Contact);
        store.demote_to_stranger("0xabc").unwrap();
        assert_eq!(store.get_level("0xabc").unwrap(), TrustLevel::Stranger);
    }
}
