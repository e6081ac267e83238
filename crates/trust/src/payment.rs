//! Payment verification against the external onboarding service.
//!
//! The service authenticates hosts with a signed challenge: the host signs
//! `Auth-{public_key}-{timestamp}` with its own key, exchanges it for a
//! bearer token at `POST {base}/auth`, then asks
//! `POST {base}/api/v1/onboard/verify` whether the caller transferred at
//! least the required amount to this host within the last five minutes.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use oo_domain::{AgentKeys, Error, Result};

const DEFAULT_BASE_URL: &str = "https://oo.openonion.ai";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the transfer-verification API.
#[derive(Clone)]
pub struct PaymentVerifier {
    base_url: String,
    client: reqwest::Client,
    keys: Arc<AgentKeys>,
}

impl PaymentVerifier {
    pub fn new(base_url: impl Into<String>, keys: Arc<AgentKeys>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            client,
            keys,
        })
    }

    /// Build a verifier with the base URL taken from the environment:
    /// `OPENONION_DEV` targets localhost, `OPENONION_BASE_URL` overrides,
    /// otherwise the production default.
    pub fn from_env(keys: Arc<AgentKeys>) -> Result<Self> {
        let base_url = if std::env::var("OPENONION_DEV").is_ok() {
            "http://localhost:8000".to_owned()
        } else {
            std::env::var("OPENONION_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned())
        };
        Self::new(base_url, keys)
    }

    /// Whether `from_address` transferred at least `min_amount` to
    /// `to_address` recently. Network and auth failures are errors, not
    /// silent approvals.
    pub async fn verify_transfer(
        &self,
        from_address: &str,
        to_address: &str,
        min_amount: f64,
    ) -> Result<bool> {
        let token = self.authenticate().await?;

        let response = self
            .client
            .post(format!("{}/api/v1/onboard/verify", self.base_url))
            .bearer_auth(token)
            .json(&json!({
                "from_address": from_address,
                "to_address": to_address,
                "min_amount": min_amount,
            }))
            .send()
            .await
            .map_err(|e| Error::Http(format!("onboard verify: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "onboard verify returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Http(format!("onboard verify body: {e}")))?;
        Ok(body.get("verified").and_then(|v| v.as_bool()).unwrap_or(false))
    }

    /// Exchange a signed challenge for a bearer token.
    async fn authenticate(&self) -> Result<String> {
        let public_key = self.keys.public_key_hex();
        let timestamp = chrono::Utc::now().timestamp();
        let message = format!("Auth-{public_key}-{timestamp}");
        let signature = self.keys.sign_hex(message.as_bytes());

        let response = self
            .client
            .post(format!("{}/auth", self.base_url))
            .json(&json!({
                "public_key": public_key,
                "message": message,
                "signature": signature,
            }))
            .send()
            .await
            .map_err(|e| Error::Http(format!("payment auth: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "payment auth returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Http(format!("payment auth body: {e}")))?;
        body.get("token")
            .and_then(|t| t.as_str())
            .map(str::to_owned)
            .ok_or_else(|| Error::Http("payment auth response missing token".into()))
    }
}
