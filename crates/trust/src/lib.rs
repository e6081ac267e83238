//! Trust: who may talk to this host, and how strangers become contacts.
//!
//! Three layers, cheapest first:
//! 1. [`store`] — file-backed identity lists (contacts, whitelist, blocklist,
//!    admins) under the host's state directory.
//! 2. [`policy`] — a Markdown policy document with YAML front-matter holding
//!    the zero-cost rules and onboarding configuration.
//! 3. [`engine`] — fast-rule evaluation with optional LLM escalation through
//!    the narrow [`TrustEvaluator`] seam, plus onboarding and admin
//!    management.

pub mod engine;
pub mod payment;
pub mod policy;
pub mod store;

pub use engine::{Decision, TrustEngine, TrustEvaluator, Verdict};
pub use payment::PaymentVerifier;
pub use policy::{default_trust_level, parse_policy, serialize_policy, OnboardConfig, PolicyConfig, TRUST_LEVELS};
pub use store::{TrustLevel, TrustStore};
