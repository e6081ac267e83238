//! The relay uplink loop.
//!
//! Lifecycle per connection: connect → send signed ANNOUNCE → receive with a
//! heartbeat timeout. A receive timeout re-announces (fresh timestamp and
//! signature); an `INPUT` spawns its own task so slow agents never block the
//! receive loop; a closed socket returns to the supervisor, which reconnects
//! with jittered exponential back-off.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use oo_domain::{AgentKeys, Result};
use oo_protocol::RelayMessage;

use crate::announce::{discover_endpoints, signed_announce};
use crate::backoff::ReconnectBackoff;

/// Executes one forwarded task on behalf of a remote caller.
#[async_trait::async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, prompt: String, from_address: Option<String>) -> Result<String>;
}

/// A relay client bound to one host identity.
pub struct RelayClient {
    relay_url: String,
    keys: Arc<AgentKeys>,
    summary: String,
    port: u16,
    heartbeat: Duration,
    backoff: ReconnectBackoff,
}

impl RelayClient {
    pub fn new(
        relay_url: impl Into<String>,
        keys: Arc<AgentKeys>,
        summary: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            relay_url: relay_url.into(),
            keys,
            summary: summary.into(),
            port,
            heartbeat: Duration::from_secs(60),
            backoff: ReconnectBackoff::default(),
        }
    }

    /// Override the heartbeat interval (ANNOUNCE resend cadence).
    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Run the uplink until `shutdown` is cancelled. Reconnects forever;
    /// relay failures never affect locally-served requests.
    pub async fn run(self, handler: Arc<dyn TaskHandler>, shutdown: CancellationToken) {
        let endpoints = discover_endpoints(self.port).await;
        let mut attempt: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                return;
            }

            let outcome = tokio::select! {
                r = self.connect_and_serve(&endpoints, &handler) => r,
                _ = shutdown.cancelled() => {
                    tracing::info!("relay uplink shutting down");
                    return;
                }
            };

            match outcome {
                Ok(()) => {
                    tracing::info!(relay = %self.relay_url, "relay connection closed");
                    attempt = 0;
                }
                Err(e) => {
                    tracing::warn!(relay = %self.relay_url, attempt, error = %e, "relay connection lost");
                }
            }

            let delay = self.backoff.delay_for_attempt(attempt);
            tracing::info!(
                relay = %self.relay_url,
                delay_ms = delay.as_millis() as u64,
                "reconnecting to relay"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => return,
            }
            attempt += 1;
        }
    }

    fn announce_text(&self, endpoints: &[String]) -> Result<String> {
        let announce = signed_announce(&self.keys, &self.summary, endpoints, Some(&self.relay_url));
        Ok(serde_json::to_string(&announce)?)
    }

    /// One connection lifecycle: announce, then serve until the socket dies.
    async fn connect_and_serve(
        &self,
        endpoints: &[String],
        handler: &Arc<dyn TaskHandler>,
    ) -> Result<()> {
        let (ws, _response) = tokio_tungstenite::connect_async(&self.relay_url)
            .await
            .map_err(|e| oo_domain::Error::Http(format!("relay connect: {e}")))?;
        let (mut sink, mut stream) = ws.split();

        tracing::info!(
            relay = %self.relay_url,
            address = %oo_domain::short_address(self.keys.address()),
            "connected to relay"
        );

        // Writer task: ANNOUNCEs and OUTPUTs from concurrently running
        // tasks funnel through one channel so the sink has a single owner.
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(64);
        let writer = tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        if outbound_tx.send(self.announce_text(endpoints)?).await.is_err() {
            writer.abort();
            return Err(oo_domain::Error::Http("relay send failed".into()));
        }

        let served = loop {
            match tokio::time::timeout(self.heartbeat, stream.next()).await {
                // Heartbeat: no traffic for a full interval, re-announce
                // with a fresh timestamp and signature.
                Err(_elapsed) => {
                    if outbound_tx.send(self.announce_text(endpoints)?).await.is_err() {
                        break Ok(());
                    }
                }
                Ok(Some(Ok(Message::Text(text)))) => {
                    self.dispatch(&text, handler, &outbound_tx).await;
                }
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break Ok(()),
                Ok(Some(Ok(_other))) => {}
                Ok(Some(Err(e))) => {
                    break Err(oo_domain::Error::Http(format!("relay receive: {e}")))
                }
            }
        };

        drop(outbound_tx);
        let _ = writer.await;
        served
    }

    /// Handle one inbound relay message. INPUTs run in their own task so
    /// concurrent tasks never block the receive loop.
    async fn dispatch(
        &self,
        text: &str,
        handler: &Arc<dyn TaskHandler>,
        outbound: &mpsc::Sender<String>,
    ) {
        let msg = match serde_json::from_str::<RelayMessage>(text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unparseable relay message");
                return;
            }
        };

        match msg {
            RelayMessage::Input {
                input_id,
                prompt,
                from_address,
                ..
            } => {
                tracing::info!(
                    input_id = %input_id,
                    from = %from_address.as_deref().map(oo_domain::short_address).unwrap_or_default(),
                    "relay INPUT"
                );
                let handler = handler.clone();
                let outbound = outbound.clone();
                tokio::spawn(async move {
                    let output = match handler.handle(prompt, from_address).await {
                        Ok(result) => RelayMessage::Output {
                            input_id,
                            result,
                            success: true,
                        },
                        Err(e) => RelayMessage::Output {
                            input_id,
                            result: e.to_string(),
                            success: false,
                        },
                    };
                    if let Ok(text) = serde_json::to_string(&output) {
                        let _ = outbound.send(text).await;
                    }
                });
            }
            RelayMessage::Error { message } => {
                tracing::warn!(message = %message, "relay reported error");
            }
            RelayMessage::Output { .. } | RelayMessage::Unknown => {}
        }
    }
}
