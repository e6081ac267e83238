//! Session results: an append-only JSONL log with TTL.
//!
//! Every agent invocation writes a `running` record before the agent starts
//! and a `done` record when it finishes. The most recent line for a
//! `session_id` wins, so a crashed invocation simply leaves its `running`
//! line to expire. Disconnected clients recover results by id.

mod log;
mod record;

pub use log::SessionLog;
pub use record::{unix_now, SessionRecord, SessionStatus};
