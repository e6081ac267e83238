//! Host configuration: `<co_dir>/host.yaml`, environment, and CLI flags.
//!
//! Precedence: CLI flags override `host.yaml`, which overrides built-in
//! defaults. The trust default additionally honors `CONNECTONION_ENV`
//! (`development` → `open`, `staging`/`test` → `careful`, `production` →
//! `strict`).

use std::path::{Path, PathBuf};

use serde::Deserialize;

use oo_domain::{Error, Result};

pub const DEFAULT_RELAY_URL: &str = "wss://oo.openonion.ai/ws/announce";
const HOST_CONFIG_FILE: &str = "host.yaml";

/// Resolved host configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    pub port: u16,
    /// Trust level name, policy file path, or inline policy text.
    pub trust: Option<String>,
    /// How long finished results stay visible, in seconds.
    pub result_ttl: i64,
    pub workers: usize,
    /// Relay uplink URL. Explicit `null` disables the uplink.
    pub relay_url: Option<String>,
    pub blacklist: Option<ListSource>,
    pub whitelist: Option<ListSource>,
    /// State directory: identity keys, trust lists, session log, logs.
    pub co_dir: PathBuf,
    /// Human summary announced to the relay.
    pub summary: Option<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            trust: None,
            result_ttl: 86_400,
            workers: 1,
            relay_url: Some(DEFAULT_RELAY_URL.to_owned()),
            blacklist: None,
            whitelist: None,
            co_dir: PathBuf::from(".co"),
            summary: None,
        }
    }
}

/// An identity list given inline or as a file path.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListSource {
    Inline(Vec<String>),
    File(PathBuf),
}

impl ListSource {
    /// Materialize the list. File-backed lists skip blank lines and `#`
    /// comments; a missing file is a configuration error.
    pub fn resolve(&self) -> Result<Vec<String>> {
        match self {
            ListSource::Inline(entries) => Ok(entries.clone()),
            ListSource::File(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("list file {}: {e}", path.display()))
                })?;
                Ok(content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(str::to_owned)
                    .collect())
            }
        }
    }
}

impl HostConfig {
    /// Load `<co_dir>/host.yaml` if present, else defaults.
    pub fn load(co_dir: &Path) -> Result<Self> {
        let path = co_dir.join(HOST_CONFIG_FILE);
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_yaml::from_str(&raw)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?
        } else {
            Self::default()
        };
        config.co_dir = co_dir.to_path_buf();
        Ok(config)
    }

    /// The trust parameter after environment fallback.
    pub fn effective_trust(&self) -> String {
        self.trust
            .clone()
            .or_else(|| oo_trust::default_trust_level().map(str::to_owned))
            .unwrap_or_else(|| "careful".to_owned())
    }

    pub fn session_log_path(&self) -> PathBuf {
        self.co_dir.join("session_results.jsonl")
    }

    pub fn resolve_blacklist(&self) -> Result<Vec<String>> {
        self.blacklist.as_ref().map(ListSource::resolve).unwrap_or(Ok(Vec::new()))
    }

    pub fn resolve_whitelist(&self) -> Result<Vec<String>> {
        self.whitelist.as_ref().map(ListSource::resolve).unwrap_or(Ok(Vec::new()))
    }
}
