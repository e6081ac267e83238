//! Per-invocation I/O channel between an agent and its connected client.
//!
//! Two unbounded queues: outgoing (agent → pump) and incoming (pump →
//! agent). The agent side is synchronous — it runs on a blocking thread —
//! while the pump side is async. The channel lives exactly as long as one
//! invocation.

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

/// Agent-facing half: emit events, receive client replies.
pub struct IoChannel {
    outgoing: mpsc::UnboundedSender<Value>,
    incoming: Mutex<mpsc::UnboundedReceiver<Value>>,
}

/// Pump-facing half. Dropping `incoming` closes the channel: a blocked
/// agent `recv` unblocks with `None`.
pub struct IoRemote {
    pub outgoing: mpsc::UnboundedReceiver<Value>,
    pub incoming: mpsc::UnboundedSender<Value>,
}

/// Create a fresh channel pair for one invocation.
pub fn io_channel() -> (IoChannel, IoRemote) {
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
    (
        IoChannel {
            outgoing: outgoing_tx,
            incoming: Mutex::new(incoming_rx),
        },
        IoRemote {
            outgoing: outgoing_rx,
            incoming: incoming_tx,
        },
    )
}

impl IoChannel {
    /// Emit one event toward the client. The host stamps `id` and `ts`
    /// here, on the emitting side, so ordering survives the queue. Events
    /// emitted after the client is gone are silently dropped.
    pub fn emit(&self, mut event: Value) {
        oo_protocol::stamp_event(&mut event);
        let _ = self.outgoing.send(event);
    }

    /// Block until the client replies (approval responses, answers) or the
    /// channel closes. Used from the agent's worker thread only.
    pub fn recv_blocking(&self) -> Option<Value> {
        self.incoming.lock().blocking_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_are_stamped_and_ordered() {
        let (io, mut remote) = io_channel();
        io.emit(json!({"type": "tool_call", "name": "search"}));
        io.emit(json!({"type": "tool_result", "name": "search"}));

        let first = remote.outgoing.try_recv().unwrap();
        let second = remote.outgoing.try_recv().unwrap();
        assert_eq!(first["type"], "tool_call");
        assert_eq!(second["type"], "tool_result");
        assert_ne!(first["id"], second["id"]);
    }

    #[test]
    fn emit_after_client_gone_is_dropped() {
        let (io, remote) = io_channel();
        drop(remote);
        io.emit(json!({"type": "thinking"}));
    }

    #[test]
    fn closed_incoming_unblocks_agent() {
        let (io, remote) = io_channel();
        drop(remote.incoming);
        // Outside a runtime, blocking_recv returns immediately on a closed
        // channel.
        assert!(io.recv_blocking().is_none());
    }

    #[test]
    fn client_reply_reaches_agent() {
        let (io, remote) = io_channel();
        remote.incoming.send(json!({"approved": true})).unwrap();
        drop(remote.incoming);
        assert_eq!(io.recv_blocking().unwrap()["approved"], true);
    }
}
