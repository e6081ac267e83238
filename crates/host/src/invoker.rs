//! Runs one agent invocation end to end.
//!
//! Writes a `running` record before the agent starts, executes the agent on
//! a blocking worker thread, and re-saves the record as `done` only on
//! clean completion. A failed agent leaves the `running` line to expire
//! naturally; callers surface the error (HTTP 500 / WS `ERROR`).

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};

use oo_domain::{Error, Result};
use oo_sessions::{SessionLog, SessionRecord};

use crate::agent::AgentFactory;
use crate::channel::IoChannel;

/// What one invocation hands back to the transport layer.
#[derive(Debug, Clone)]
pub struct InvocationResult {
    pub session_id: String,
    pub result: String,
    pub duration_ms: u64,
    pub session: Value,
}

/// Invoke a fresh agent for `prompt`, persisting the session record.
///
/// The server owns `session_id`: it reuses the one inside `session` when a
/// client continues a conversation, otherwise mints a UUID. The session
/// value itself is treated as per-request and immutable on the host side.
pub async fn invoke_agent(
    factory: Arc<dyn AgentFactory>,
    sessions: Arc<SessionLog>,
    prompt: String,
    session: Option<Value>,
    io: IoChannel,
    result_ttl: i64,
) -> Result<InvocationResult> {
    let session_id = session
        .as_ref()
        .and_then(|s| s.get("session_id"))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut agent_session = session.unwrap_or_else(|| json!({}));
    if let Value::Object(map) = &mut agent_session {
        map.insert("session_id".to_owned(), json!(session_id.clone()));
    }

    let mut record = SessionRecord::running(&session_id, &prompt, result_ttl);
    sessions.save(&record)?;

    let started = Instant::now();
    let outcome = tokio::task::spawn_blocking(move || {
        let mut agent = factory.create();
        agent.run(&prompt, Some(agent_session), &io)
    })
    .await
    .map_err(|e| Error::Agent(format!("agent worker panicked: {e}")))??;
    let duration_ms = started.elapsed().as_millis() as u64;

    record.complete(&outcome.result, duration_ms);
    sessions.save(&record)?;

    Ok(InvocationResult {
        session_id,
        result: outcome.result,
        duration_ms,
        session: outcome.session,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentOutcome, EchoFactory};
    use crate::channel::io_channel;
    use oo_sessions::SessionStatus;

    fn session_log() -> (tempfile::TempDir, Arc<SessionLog>) {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(SessionLog::new(dir.path().join("sessions.jsonl")));
        (dir, log)
    }

    #[tokio::test]
    async fn clean_run_persists_done_record() {
        let (_dir, sessions) = session_log();
        let (io, _remote) = io_channel();
        let result = invoke_agent(
            Arc::new(EchoFactory::default()),
            sessions.clone(),
            "hello".into(),
            None,
            io,
            3600,
        )
        .await
        .unwrap();

        assert_eq!(result.result, "echo: hello");
        let record = sessions.get(&result.session_id).unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Done);
        assert_eq!(record.result.as_deref(), Some("echo: hello"));
        assert!(record.duration_ms.is_some());
    }

    #[tokio::test]
    async fn continuation_reuses_session_id() {
        let (_dir, sessions) = session_log();
        let (io, _remote) = io_channel();
        let session = json!({"session_id": "existing", "turns": 1});
        let result = invoke_agent(
            Arc::new(EchoFactory::default()),
            sessions,
            "again".into(),
            Some(session),
            io,
            3600,
        )
        .await
        .unwrap();
        assert_eq!(result.session_id, "existing");
        assert_eq!(result.session["session_id"], "existing");
    }

    struct FailingAgent;

    impl Agent for FailingAgent {
        fn run(
            &mut self,
            _prompt: &str,
            _session: Option<Value>,
            _io: &IoChannel,
        ) -> Result<AgentOutcome> {
            Err(Error::Agent("tool exploded".into()))
        }
    }

    struct FailingFactory;

    impl AgentFactory for FailingFactory {
        fn create(&self) -> Box<dyn Agent> {
            Box::new(FailingAgent)
        }
        fn name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn failed_run_leaves_record_running() {
        let (_dir, sessions) = session_log();
        let (io, _remote) = io_channel();
        let err = invoke_agent(
            Arc::new(FailingFactory),
            sessions.clone(),
            "boom".into(),
            Some(json!({"session_id": "failing-run"})),
            io,
            3600,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("tool exploded"));

        let record = sessions.get("failing-run").unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Running);
        assert!(record.result.is_none());
    }
}
