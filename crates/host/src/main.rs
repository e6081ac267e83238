use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use oo_domain::AgentKeys;
use oo_host::agent::EchoFactory;
use oo_host::{serve, HostConfig};

#[derive(Parser)]
#[command(name = "openonion-host", version, about = "Host an agent over HTTP/WebSocket with relay discovery")]
struct Cli {
    /// State directory (identity, trust lists, session log).
    #[arg(long, default_value = ".co")]
    co_dir: PathBuf,

    /// HTTP port.
    #[arg(long)]
    port: Option<u16>,

    /// Trust level (open/careful/strict), policy file path, or inline policy.
    #[arg(long)]
    trust: Option<String>,

    /// Seconds finished results stay visible.
    #[arg(long)]
    result_ttl: Option<i64>,

    /// Relay uplink URL.
    #[arg(long)]
    relay_url: Option<String>,

    /// Disable the relay uplink.
    #[arg(long)]
    no_relay: bool,

    /// Summary announced to the relay.
    #[arg(long)]
    summary: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = HostConfig::load(&cli.co_dir)?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.trust.is_some() {
        config.trust = cli.trust;
    }
    if let Some(ttl) = cli.result_ttl {
        config.result_ttl = ttl;
    }
    if cli.no_relay {
        config.relay_url = None;
    } else if cli.relay_url.is_some() {
        config.relay_url = cli.relay_url;
    }
    if cli.summary.is_some() {
        config.summary = cli.summary;
    }

    let keys = AgentKeys::load_or_generate(&config.co_dir)?;

    // The binary hosts the built-in echo agent; embedders wire their own
    // factory (and a trust evaluator) through the library API.
    let state = oo_host::server::build_state(config, keys, Arc::new(EchoFactory::default()), None)?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            signal_token.cancel();
        }
    });

    serve(state, shutdown).await?;
    Ok(())
}
