//! Relay uplink: keeps this host reachable without inbound connectivity.
//!
//! The client holds one outbound WebSocket to a relay, announces itself with
//! a signed `ANNOUNCE`, re-announces as a heartbeat, and executes `INPUT`
//! tasks forwarded on behalf of remote callers. The [`dial`] module is the
//! caller side: a one-shot INPUT/OUTPUT exchange against a peer's relay
//! endpoint.

pub mod announce;
pub mod backoff;
pub mod client;
pub mod dial;

pub use announce::{discover_endpoints, signed_announce};
pub use backoff::ReconnectBackoff;
pub use client::{RelayClient, TaskHandler};
pub use dial::{dial, DialOutput};
