//! The agent invocation contract.
//!
//! The host never looks inside an agent. It asks a factory for a fresh
//! instance per request (tools with internal state must be constructed in
//! `create` so concurrent requests stay isolated), hands it a prompt, an
//! optional continuation session, and an I/O channel, and takes back a
//! result plus the agent's post-run session state.

use serde_json::{json, Value};

use oo_domain::Result;

use crate::channel::IoChannel;

/// What an agent returns from one invocation.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub result: String,
    /// Opaque post-run state, surfaced verbatim for client-side
    /// continuation. The host never interprets it.
    pub session: Value,
}

/// One agent instance, valid for a single invocation.
///
/// `run` executes on a blocking worker thread; it may block freely on the
/// I/O channel (e.g. waiting for an approval reply).
pub trait Agent: Send {
    fn run(&mut self, prompt: &str, session: Option<Value>, io: &IoChannel) -> Result<AgentOutcome>;
}

/// Produces a fresh agent per request.
pub trait AgentFactory: Send + Sync {
    fn create(&self) -> Box<dyn Agent>;

    /// Display name, shown by `/health` and `/info`.
    fn name(&self) -> &str;

    /// Tool names advertised by `/info`.
    fn tools(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Built-in agent that streams one `thinking` event and echoes the prompt.
/// Default for the binary; exercises the full streaming path in tests.
pub struct EchoAgent;

impl Agent for EchoAgent {
    fn run(&mut self, prompt: &str, session: Option<Value>, io: &IoChannel) -> Result<AgentOutcome> {
        io.emit(json!({
            "type": "thinking",
            "text": format!("echoing {} characters", prompt.len()),
        }));
        Ok(AgentOutcome {
            result: format!("echo: {prompt}"),
            session: session.unwrap_or_else(|| json!({})),
        })
    }
}

/// Factory for [`EchoAgent`].
pub struct EchoFactory {
    name: String,
}

impl EchoFactory {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for EchoFactory {
    fn default() -> Self {
        Self::new("echo")
    }
}

impl AgentFactory for EchoFactory {
    fn create(&self) -> Box<dyn Agent> {
        Box::new(EchoAgent)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tools(&self) -> Vec<String> {
        vec!["echo".to_owned()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::io_channel;

    #[test]
    fn echo_agent_emits_and_returns() {
        let (io, mut remote) = io_channel();
        let mut agent = EchoFactory::default().create();
        let outcome = agent.run("hi", None, &io).unwrap();
        assert_eq!(outcome.result, "echo: hi");

        let event = remote.outgoing.try_recv().unwrap();
        assert_eq!(event["type"], "thinking");
        assert!(event["id"].is_string());
    }

    #[test]
    fn echo_agent_passes_session_through() {
        let (io, _remote) = io_channel();
        let mut agent = EchoFactory::default().create();
        let session = json!({"session_id": "s1", "turns": 3});
        let outcome = agent.run("hi", Some(session.clone()), &io).unwrap();
        assert_eq!(outcome.session, session);
    }
}
