//! Builds the application state, starts the HTTP/WebSocket server, and
//! supervises the relay uplink in the same runtime.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use oo_domain::{AgentKeys, Result};
use oo_relay::{RelayClient, TaskHandler};
use oo_sessions::SessionLog;
use oo_trust::{PaymentVerifier, TrustEngine, TrustEvaluator, TrustStore};

use crate::agent::AgentFactory;
use crate::channel::io_channel;
use crate::config::HostConfig;
use crate::invoker::invoke_agent;
use crate::logfile::ActivityLog;
use crate::state::{admin_token_hash_from_env, AppState};

/// Assemble the shared state from config, identity, and the agent factory.
pub fn build_state(
    config: HostConfig,
    keys: AgentKeys,
    factory: Arc<dyn AgentFactory>,
    evaluator: Option<Arc<dyn TrustEvaluator>>,
) -> Result<AppState> {
    let keys = Arc::new(keys);
    let config = Arc::new(config);

    let store = TrustStore::new(&config.co_dir);
    let mut trust = TrustEngine::new(&config.effective_trust(), store)?
        .with_self_address(keys.address())
        .with_payment_verifier(PaymentVerifier::from_env(keys.clone())?);
    if let Some(evaluator) = evaluator {
        trust = trust.with_evaluator(evaluator);
    }

    let blacklist = config.resolve_blacklist()?;
    let whitelist = config.resolve_whitelist()?;
    let activity = ActivityLog::new(&config.co_dir, factory.name());

    Ok(AppState {
        sessions: Arc::new(SessionLog::new(config.session_log_path())),
        trust: Arc::new(trust),
        activity: Arc::new(activity),
        blacklist: Arc::new(blacklist),
        whitelist: Arc::new(whitelist),
        started_at: Instant::now(),
        admin_token_hash: admin_token_hash_from_env(),
        config,
        keys,
        factory,
    })
}

/// Relay-side task execution: each forwarded INPUT runs a fresh agent and
/// persists its session record exactly like a local request.
struct RelayInvoker {
    state: AppState,
}

#[async_trait::async_trait]
impl TaskHandler for RelayInvoker {
    async fn handle(&self, prompt: String, from_address: Option<String>) -> Result<String> {
        if let Some(from) = &from_address {
            tracing::debug!(from = %oo_domain::short_address(from), "relay task");
        }
        let (io, _remote) = io_channel();
        let result = invoke_agent(
            self.state.factory.clone(),
            self.state.sessions.clone(),
            prompt,
            None,
            io,
            self.state.config.result_ttl,
        )
        .await?;
        Ok(result.result)
    }
}

/// Serve until shutdown. Returns an error on startup failure (port in use,
/// malformed policy) so the binary exits non-zero.
pub async fn serve(state: AppState, shutdown: CancellationToken) -> Result<()> {
    let summary = state
        .config
        .summary
        .clone()
        .unwrap_or_else(|| format!("{} agent", state.factory.name()));

    // Relay uplink runs beside the server; its failures never affect
    // locally-served requests.
    let mut relay_task = None;
    if let Some(relay_url) = &state.config.relay_url {
        let client = RelayClient::new(
            relay_url.clone(),
            state.keys.clone(),
            summary,
            state.config.port,
        );
        let handler = Arc::new(RelayInvoker {
            state: state.clone(),
        });
        let relay_shutdown = shutdown.clone();
        relay_task = Some(tokio::spawn(async move {
            client.run(handler, relay_shutdown).await;
        }));
        tracing::info!(relay = %relay_url, "relay uplink enabled");
    } else {
        tracing::info!("relay uplink disabled");
    }

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| oo_domain::Error::Config(format!("bind {addr}: {e}")))?;

    tracing::info!(
        address = %state.keys.address(),
        port = state.config.port,
        trust = %state.trust.label(),
        workers = state.config.workers,
        "host listening"
    );

    let router = crate::api::router(state);
    let server_shutdown = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await
        .map_err(|e| oo_domain::Error::Http(e.to_string()))?;

    if let Some(task) = relay_task {
        shutdown.cancel();
        let _ = task.await;
    }
    Ok(())
}
