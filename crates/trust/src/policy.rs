//! Trust policy documents: YAML front-matter + Markdown body.
//!
//! ```text
//! ---
//! allow: [whitelisted, contact]
//! deny: [blocked]
//! onboard:
//!   invite_code: [BETA2024]
//!   payment: 10
//! default: ask
//! ---
//! # Free-form body, used as the system prompt for LLM escalation.
//! ```
//!
//! The front-matter drives the zero-cost fast rules; the body is only read
//! when `default: ask` escalates to the evaluator.

use std::path::Path;

use serde::{Deserialize, Serialize};

use oo_domain::{Error, Result};

/// Built-in trust level names, resolvable without a policy file.
pub const TRUST_LEVELS: &[&str] = &["open", "careful", "strict"];

const OPEN_POLICY: &str = include_str!("../policies/open.md");
const CAREFUL_POLICY: &str = include_str!("../policies/careful.md");
const STRICT_POLICY: &str = include_str!("../policies/strict.md");

/// Parsed front-matter of a policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default = "default_deny")]
    pub deny: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboard: Option<OnboardConfig>,
    #[serde(rename = "default", default = "default_action")]
    pub default_action: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allow: Vec::new(),
            deny: default_deny(),
            onboard: None,
            default_action: default_action(),
        }
    }
}

/// Onboarding section: how strangers become contacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnboardConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invite_code: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<f64>,
}

fn default_deny() -> Vec<String> {
    vec!["blocked".to_owned()]
}

fn default_action() -> String {
    "deny".to_owned()
}

/// Split a policy document into `(config, body)`.
///
/// A document without a leading `---` fence has no front-matter: the whole
/// text becomes the body and the config takes its defaults.
pub fn parse_policy(text: &str) -> Result<(PolicyConfig, String)> {
    if !text.starts_with("---") {
        return Ok((PolicyConfig::default(), text.to_owned()));
    }
    let Some(end) = text[3..].find("---").map(|i| i + 3) else {
        return Ok((PolicyConfig::default(), text.to_owned()));
    };

    let yaml = text[3..end].trim();
    let body = text[end + 3..].trim().to_owned();

    let config: PolicyConfig = if yaml.is_empty() {
        PolicyConfig::default()
    } else {
        serde_yaml::from_str(yaml).map_err(|e| Error::Yaml(format!("policy front-matter: {e}")))?
    };
    Ok((config, body))
}

/// Render a `(config, body)` pair back into a policy document.
/// Inverse of [`parse_policy`] for well-formed inputs.
pub fn serialize_policy(config: &PolicyConfig, body: &str) -> Result<String> {
    let yaml = serde_yaml::to_string(config).map_err(|e| Error::Yaml(e.to_string()))?;
    Ok(format!("---\n{yaml}---\n{body}"))
}

/// Resolve a `trust` parameter into a policy document.
///
/// Resolution order: built-in level name, then filesystem path, then inline
/// `---`-prefixed policy text. Anything else is a configuration error.
pub fn resolve_policy(trust: &str) -> Result<(PolicyConfig, String, String)> {
    let lowered = trust.to_lowercase();
    if TRUST_LEVELS.contains(&lowered.as_str()) {
        let text = builtin_policy(&lowered);
        let (config, body) = parse_policy(text)?;
        return Ok((config, body, lowered));
    }

    let path = Path::new(trust);
    if path.is_file() {
        let text = std::fs::read_to_string(path)?;
        let (config, body) = parse_policy(&text)?;
        return Ok((config, body, "custom".to_owned()));
    }

    if trust.starts_with("---") {
        let (config, body) = parse_policy(trust)?;
        return Ok((config, body, "custom".to_owned()));
    }

    Err(Error::Config(format!(
        "trust must be a level ({}), a policy file path, or inline policy text: {trust:?}",
        TRUST_LEVELS.join("/")
    )))
}

fn builtin_policy(level: &str) -> &'static str {
    match level {
        "open" => OPEN_POLICY,
        "strict" => STRICT_POLICY,
        _ => CAREFUL_POLICY,
    }
}

/// Default trust level from `CONNECTONION_ENV`:
/// `development` → `open`, `staging`/`test` → `careful`, `production` → `strict`.
pub fn default_trust_level() -> Option<&'static str> {
    match std::env::var("CONNECTONION_ENV").ok()?.to_lowercase().as_str() {
        "development" => Some("open"),
        "production" => Some("strict"),
        "staging" | "test" => Some("careful"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_front_matter() {
        let text = "---\nallow: [whitelisted, contact]\ndeny: [blocked]\nonboard:\n  invite_code: [BETA]\n  payment: 10\ndefault: ask\n---\nEvaluate carefully.";
        let (config, body) = parse_policy(text).unwrap();
        assert_eq!(config.allow, vec!["whitelisted", "contact"]);
        assert_eq!(config.deny, vec!["blocked"]);
        let onboard = config.onboard.unwrap();
        assert_eq!(onboard.invite_code, vec!["BETA"]);
        assert_eq!(onboard.payment, Some(10.0));
        assert_eq!(config.default_action, "ask");
        assert_eq!(body, "Evaluate carefully.");
    }

    #[test]
    fn no_front_matter_means_defaults() {
        let (config, body) = parse_policy("Just a prompt.").unwrap();
        assert_eq!(config, PolicyConfig::default());
        assert_eq!(config.deny, vec!["blocked"]);
        assert_eq!(config.default_action, "deny");
        assert_eq!(body, "Just a prompt.");
    }

    #[test]
    fn unterminated_fence_is_all_body() {
        let (config, body) = parse_policy("---\nallow: [contact]").unwrap();
        assert_eq!(config, PolicyConfig::default());
        assert_eq!(body, "---\nallow: [contact]");
    }

    #[test]
    fn round_trips() {
        let config = PolicyConfig {
            allow: vec!["whitelisted".into()],
            deny: vec!["blocked".into()],
            onboard: Some(OnboardConfig {
                invite_code: vec!["CODE1".into(), "CODE2".into()],
                payment: Some(5.0),
            }),
            default_action: "ask".into(),
        };
        let text = serialize_policy(&config, "Body text.").unwrap();
        let (parsed, body) = parse_policy(&text).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(body, "Body text.");
    }

    #[test]
    fn builtin_levels_resolve() {
        for level in TRUST_LEVELS {
            let (config, _body, label) = resolve_policy(level).unwrap();
            assert_eq!(&label, level);
            assert_eq!(config.deny, vec!["blocked"]);
        }
        let (open, _, _) = resolve_policy("open").unwrap();
        assert_eq!(open.default_action, "allow");
        let (strict, _, _) = resolve_policy("strict").unwrap();
        assert_eq!(strict.default_action, "deny");
        assert_eq!(strict.allow, vec!["whitelisted"]);
    }

    #[test]
    fn inline_policy_resolves() {
        let (config, _, label) =
            resolve_policy("---\ndefault: allow\n---\nprompt").unwrap();
        assert_eq!(config.default_action, "allow");
        assert_eq!(label, "custom");
    }

    #[test]
    fn unknown_trust_is_config_error() {
        assert!(resolve_policy("no-such-level").is_err());
    }
}
