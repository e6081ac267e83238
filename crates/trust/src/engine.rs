//! Trust decisions: fast rules first, LLM escalation only when the policy
//! says `default: ask`.
//!
//! The engine never fails open. Store errors, evaluator errors, and a
//! missing evaluator all resolve to deny with a reason.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use oo_domain::Result;

use crate::payment::PaymentVerifier;
use crate::policy::{resolve_policy, OnboardConfig, PolicyConfig};
use crate::store::{List, TrustLevel, TrustStore};

/// Result of a trust check.
#[derive(Debug, Clone)]
pub struct Decision {
    pub allow: bool,
    pub reason: String,
    pub used_llm: bool,
}

impl Decision {
    fn fast(allow: bool, reason: &str) -> Self {
        Self {
            allow,
            reason: reason.to_owned(),
            used_llm: false,
        }
    }
}

/// Structured verdict returned by the policy-evaluating LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub allow: bool,
    pub reason: String,
}

/// The narrow seam to the policy-evaluating LLM. The host core never talks
/// to a model directly; implementations carry their own timeout.
#[async_trait]
pub trait TrustEvaluator: Send + Sync {
    async fn evaluate_trust(
        &self,
        policy_prompt: &str,
        identity: &str,
        level: TrustLevel,
        request: &Value,
    ) -> Result<Verdict>;
}

/// Policy-driven trust engine over a [`TrustStore`].
pub struct TrustEngine {
    label: String,
    config: PolicyConfig,
    prompt: String,
    store: TrustStore,
    self_address: Option<String>,
    evaluator: Option<Arc<dyn TrustEvaluator>>,
    payment: Option<PaymentVerifier>,
}

impl TrustEngine {
    /// Build an engine from a trust parameter (level name, policy file path,
    /// or inline policy text). The policy is loaded once and cached.
    pub fn new(trust: &str, store: TrustStore) -> Result<Self> {
        let (config, prompt, label) = resolve_policy(trust)?;
        Ok(Self {
            label,
            config,
            prompt,
            store,
            self_address: None,
            evaluator: None,
            payment: None,
        })
    }

    /// Set the host's own address. It acts as the implicit super-admin and
    /// as the receiving address for payment onboarding.
    pub fn with_self_address(mut self, address: impl Into<String>) -> Self {
        self.self_address = Some(address.into());
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn TrustEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn with_payment_verifier(mut self, verifier: PaymentVerifier) -> Self {
        self.payment = Some(verifier);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn onboard_config(&self) -> Option<&OnboardConfig> {
        self.config.onboard.as_ref()
    }

    pub fn store(&self) -> &TrustStore {
        &self.store
    }

    // ── Main decision path ───────────────────────────────────────────

    /// Decide whether `identity` may run `request`. Fast rules first; the
    /// evaluator only runs for `default: ask` with no rule fired.
    pub async fn should_allow(&self, identity: &str, request: &Value) -> Decision {
        match self.fast_rules(identity, request) {
            Ok(Some(true)) => Decision::fast(true, "allowed by fast rules"),
            Ok(Some(false)) => Decision::fast(false, "denied by fast rules"),
            Ok(None) => self.escalate(identity, request).await,
            Err(e) => {
                tracing::warn!(identity = %oo_domain::short_address(identity), error = %e, "trust store error, denying");
                Decision::fast(false, &format!("trust check failed: {e}"))
            }
        }
    }

    /// Zero-cost rules. `Ok(None)` means the policy wants an LLM decision.
    fn fast_rules(&self, identity: &str, request: &Value) -> Result<Option<bool>> {
        // Deny wins before anything else.
        for condition in &self.config.deny {
            if condition == "blocked" && self.store.contains(List::Blocklist, identity)? {
                return Ok(Some(false));
            }
        }

        for condition in &self.config.allow {
            let matched = match condition.as_str() {
                "whitelisted" => self.store.contains(List::Whitelist, identity)?,
                "contact" => self.store.contains(List::Contacts, identity)?,
                "stranger" => true,
                _ => false,
            };
            if matched {
                return Ok(Some(true));
            }
        }

        // Onboarding: promote a stranger carrying a valid invite code or a
        // sufficient payment, then allow.
        if let Some(onboard) = &self.config.onboard {
            if let Some(code) = request.get("invite_code").and_then(Value::as_str) {
                if onboard.invite_code.iter().any(|c| c == code) {
                    self.store.promote_to_contact(identity)?;
                    return Ok(Some(true));
                }
            }
            if let Some(required) = onboard.payment {
                let offered = request.get("payment").and_then(Value::as_f64).unwrap_or(0.0);
                if offered >= required {
                    self.store.promote_to_contact(identity)?;
                    return Ok(Some(true));
                }
            }
        }

        match self.config.default_action.as_str() {
            "allow" => Ok(Some(true)),
            "ask" => Ok(None),
            // "deny" and anything unrecognized.
            _ => Ok(Some(false)),
        }
    }

    async fn escalate(&self, identity: &str, request: &Value) -> Decision {
        let Some(evaluator) = &self.evaluator else {
            return Decision::fast(false, "no trust evaluator configured");
        };
        let level = match self.store.get_level(identity) {
            Ok(level) => level,
            Err(e) => return Decision::fast(false, &format!("trust check failed: {e}")),
        };
        match evaluator
            .evaluate_trust(&self.prompt, identity, level, request)
            .await
        {
            Ok(verdict) => Decision {
                allow: verdict.allow,
                reason: verdict.reason,
                used_llm: true,
            },
            Err(e) => {
                tracing::warn!(identity = %oo_domain::short_address(identity), error = %e, "trust evaluation failed, denying");
                Decision {
                    allow: false,
                    reason: format!("trust evaluation failed: {e}"),
                    used_llm: true,
                }
            }
        }
    }

    // ── Onboarding entry points (WebSocket handshake) ────────────────

    /// Verify an invite code and promote to contact when it matches.
    pub fn verify_invite(&self, identity: &str, code: &str) -> Result<bool> {
        let valid = self
            .onboard_config()
            .map(|o| o.invite_code.iter().any(|c| c == code))
            .unwrap_or(false);
        if !valid {
            return Ok(false);
        }
        self.store.promote_to_contact(identity)?;
        Ok(true)
    }

    /// Verify a payment through the external verification service and
    /// promote to contact on success.
    pub async fn verify_payment(&self, identity: &str, amount: f64) -> Result<bool> {
        let Some(required) = self.onboard_config().and_then(|o| o.payment) else {
            return Ok(false);
        };
        let Some(verifier) = &self.payment else {
            return Ok(false);
        };
        let Some(self_address) = &self.self_address else {
            return Ok(false);
        };

        let min_amount = if amount > 0.0 { amount } else { required };
        if verifier
            .verify_transfer(identity, self_address, min_amount)
            .await?
        {
            self.store.promote_to_contact(identity)?;
            return Ok(true);
        }
        Ok(false)
    }

    // ── Level queries & mutations ────────────────────────────────────

    pub fn get_level(&self, identity: &str) -> Result<TrustLevel> {
        self.store.get_level(identity)
    }

    pub fn is_blocked(&self, identity: &str) -> Result<bool> {
        self.store.contains(List::Blocklist, identity)
    }

    pub fn promote_to_contact(&self, identity: &str) -> Result<()> {
        self.store.promote_to_contact(identity)
    }

    pub fn promote_to_whitelist(&self, identity: &str) -> Result<()> {
        self.store.promote_to_whitelist(identity)
    }

    pub fn demote_to_contact(&self, identity: &str) -> Result<()> {
        self.store.demote_to_contact(identity)
    }

    pub fn demote_to_stranger(&self, identity: &str) -> Result<()> {
        self.store.demote_to_stranger(identity)
    }

    pub fn block(&self, identity: &str) -> Result<()> {
        self.store.block(identity)
    }

    pub fn unblock(&self, identity: &str) -> Result<()> {
        self.store.unblock(identity)
    }

    // ── Admin management ─────────────────────────────────────────────

    /// The host's own address is always an admin; others come from
    /// `admins.txt`.
    pub fn is_admin(&self, identity: &str) -> Result<bool> {
        if self.is_super_admin(identity) {
            return Ok(true);
        }
        self.store.contains(List::Admins, identity)
    }

    /// Exactly one super-admin exists: the host's own address.
    pub fn is_super_admin(&self, identity: &str) -> bool {
        self.self_address.as_deref() == Some(identity)
    }

    pub fn self_address(&self) -> Option<&str> {
        self.self_address.as_deref()
    }

    /// Add an admin. Callers must have checked super-admin first.
    pub fn add_admin(&self, identity: &str) -> Result<()> {
        self.store.add(List::Admins, identity)
    }

    pub fn remove_admin(&self, identity: &str) -> Result<()> {
        self.store.remove(List::Admins, identity)
    }
}
