//! The agent host: an HTTP + WebSocket server that authenticates signed
//! requests, enforces the trust policy, streams agent events, persists
//! session results, and keeps a relay uplink for inbound reachability.
//!
//! Embedders supply an [`agent::AgentFactory`] and call [`serve`]; the
//! `openonion-host` binary wires the built-in echo agent.

pub mod agent;
pub mod api;
pub mod auth;
pub mod channel;
pub mod config;
pub mod invoker;
pub mod logfile;
pub mod server;
pub mod state;
pub mod ws;

pub use config::HostConfig;
pub use server::serve;
pub use state::AppState;
