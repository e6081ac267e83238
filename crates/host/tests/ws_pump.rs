//! WebSocket pump scenarios over a real server socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

use oo_domain::AgentKeys;
use oo_host::agent::{Agent, AgentFactory, AgentOutcome, EchoFactory};
use oo_host::channel::IoChannel;
use oo_host::server::build_state;
use oo_host::{AppState, HostConfig};
use oo_protocol::build_envelope;

fn now() -> i64 {
    oo_sessions::unix_now()
}

fn test_state(trust: &str, factory: Arc<dyn AgentFactory>) -> (tempfile::TempDir, AppState, AgentKeys) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = HostConfig::default();
    config.co_dir = dir.path().to_path_buf();
    config.trust = Some(trust.to_owned());
    config.relay_url = None;

    let host_keys = AgentKeys::load_or_generate(dir.path()).unwrap();
    let caller = AgentKeys::generate();
    let state = build_state(config, host_keys, factory, None).unwrap();
    (dir, state, caller)
}

async fn spawn_server(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = oo_host::api::router(state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn signed_input(caller: &AgentKeys, prompt: &str, session: Option<Value>) -> Value {
    let mut input = build_envelope(caller, json!({"prompt": prompt, "timestamp": now()}));
    input["type"] = json!("INPUT");
    if let Some(session) = session {
        input["session"] = session;
    }
    input
}

async fn recv_json(
    ws: &mut (impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for message")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn input_streams_events_then_output() {
    let (_dir, state, caller) = test_state("open", Arc::new(EchoFactory::default()));
    let addr = spawn_server(state).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();

    let input = signed_input(&caller, "stream me", None);
    ws.send(Message::Text(input.to_string())).await.unwrap();

    // First the agent's thinking event, stamped by the server.
    let event = recv_json(&mut ws).await;
    assert_eq!(event["type"], "thinking");
    assert!(event["id"].is_string());
    assert!(event["ts"].is_i64());

    // Then the single final OUTPUT.
    let output = recv_json(&mut ws).await;
    assert_eq!(output["type"], "OUTPUT");
    assert_eq!(output["result"], "echo: stream me");
    assert!(output["session_id"].is_string());
    assert!(output["duration_ms"].is_u64());
}

#[tokio::test]
async fn invalid_json_gets_error() {
    let (_dir, state, _caller) = test_state("open", Arc::new(EchoFactory::default()));
    let addr = spawn_server(state).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    ws.send(Message::Text("{broken".into())).await.unwrap();
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "ERROR");
    assert_eq!(reply["message"], "Invalid JSON");
}

#[tokio::test]
async fn unsigned_input_gets_error() {
    let (_dir, state, _caller) = test_state("open", Arc::new(EchoFactory::default()));
    let addr = spawn_server(state).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    ws.send(Message::Text(json!({"type": "INPUT", "prompt": "hi"}).to_string()))
        .await
        .unwrap();
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "ERROR");
    assert_eq!(reply["message"], "unauthorized: signed request required");
}

#[tokio::test]
async fn wrong_path_closes_with_4004() {
    let (_dir, state, _caller) = test_state("open", Arc::new(EchoFactory::default()));
    let addr = spawn_server(state).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/other"))
        .await
        .unwrap();
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match msg {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 4004),
        other => panic!("expected close frame, got {other:?}"),
    }
}

const ONBOARD_TRUST: &str = "---\nallow: [whitelisted, contact]\ndeny: [blocked]\nonboard:\n  invite_code: [BETA]\ndefault: deny\n---\nbody";

#[tokio::test]
async fn onboarding_flow_invite_code() {
    let (_dir, state, caller) = test_state(ONBOARD_TRUST, Arc::new(EchoFactory::default()));
    let addr = spawn_server(state).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();

    // A stranger's INPUT is answered with onboarding requirements, not a
    // bare error.
    ws.send(Message::Text(signed_input(&caller, "hi", None).to_string()))
        .await
        .unwrap();
    let required = recv_json(&mut ws).await;
    assert_eq!(required["type"], "ONBOARD_REQUIRED");
    assert!(required["methods"]
        .as_array()
        .unwrap()
        .contains(&json!("invite_code")));

    // Submit the invite code (signed, like everything else).
    let mut submit = build_envelope(
        &caller,
        json!({"invite_code": "BETA", "timestamp": now()}),
    );
    submit["type"] = json!("ONBOARD_SUBMIT");
    ws.send(Message::Text(submit.to_string())).await.unwrap();
    let success = recv_json(&mut ws).await;
    assert_eq!(success["type"], "ONBOARD_SUCCESS");
    assert_eq!(success["level"], "contact");

    // Now a contact: the same INPUT goes through to the agent.
    ws.send(Message::Text(signed_input(&caller, "hi again", None).to_string()))
        .await
        .unwrap();
    loop {
        let msg = recv_json(&mut ws).await;
        if msg["type"] == "OUTPUT" {
            assert_eq!(msg["result"], "echo: hi again");
            break;
        }
    }
}

#[tokio::test]
async fn wrong_invite_code_rejected() {
    let (_dir, state, caller) = test_state(ONBOARD_TRUST, Arc::new(EchoFactory::default()));
    let addr = spawn_server(state).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    let mut submit = build_envelope(
        &caller,
        json!({"invite_code": "WRONG", "timestamp": now()}),
    );
    submit["type"] = json!("ONBOARD_SUBMIT");
    ws.send(Message::Text(submit.to_string())).await.unwrap();
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "ERROR");
    assert_eq!(reply["message"], "Invalid invite code");
}

/// Agent that takes long enough for the client to walk away.
struct SlowAgent;

impl Agent for SlowAgent {
    fn run(
        &mut self,
        prompt: &str,
        session: Option<Value>,
        _io: &IoChannel,
    ) -> oo_domain::Result<AgentOutcome> {
        std::thread::sleep(Duration::from_millis(300));
        Ok(AgentOutcome {
            result: format!("slow: {prompt}"),
            session: session.unwrap_or_else(|| json!({})),
        })
    }
}

struct SlowFactory;

impl AgentFactory for SlowFactory {
    fn create(&self) -> Box<dyn Agent> {
        Box::new(SlowAgent)
    }
    fn name(&self) -> &str {
        "slow"
    }
}

#[tokio::test]
async fn disconnect_mid_run_result_recoverable_over_http() {
    let (_dir, state, caller) = test_state("open", Arc::new(SlowFactory));
    let addr = spawn_server(state.clone()).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    let input = signed_input(
        &caller,
        "finish without me",
        Some(json!({"session_id": "recover-1"})),
    );
    ws.send(Message::Text(input.to_string())).await.unwrap();
    drop(ws); // Walk away before the agent finishes.

    // The agent keeps running and persists its record.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let req = axum::http::Request::builder()
            .uri("/sessions/recover-1")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = oo_host::api::router(state.clone()).oneshot(req).await.unwrap();
        if response.status() == axum::http::StatusCode::OK {
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let record: Value = serde_json::from_slice(&bytes).unwrap();
            if record["status"] == "done" {
                assert_eq!(record["result"], "slow: finish without me");
                break;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "record never reached done"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

const ADMIN_TRUST: &str = "---\nallow: [whitelisted, contact]\ndeny: [blocked]\ndefault: deny\n---\nbody";

#[tokio::test]
async fn admin_flow_via_super_admin() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = HostConfig::default();
    config.co_dir = dir.path().to_path_buf();
    config.trust = Some(ADMIN_TRUST.to_owned());
    config.relay_url = None;

    // The host's own identity is the super-admin; load a second copy of the
    // same keys to sign admin messages as the host.
    let host_keys = AgentKeys::load_or_generate(dir.path()).unwrap();
    let admin_keys = AgentKeys::load_or_generate(dir.path()).unwrap();
    let state = build_state(config, host_keys, Arc::new(EchoFactory::default()), None).unwrap();
    let addr = spawn_server(state).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();

    let admin_msg = |msg_type: &str, payload: Value| {
        let mut payload = payload;
        payload["timestamp"] = json!(now());
        let mut envelope = build_envelope(&admin_keys, payload);
        envelope["type"] = json!(msg_type);
        // Admin identity is the address form of the same key.
        envelope["from"] = json!(admin_keys.address());
        envelope
    };

    // Promote a client, check its level, block, unblock.
    ws.send(Message::Text(
        admin_msg("ADMIN_PROMOTE", json!({"client_id": "0xclient"})).to_string(),
    ))
    .await
    .unwrap();
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "ADMIN_RESULT");
    assert_eq!(reply["action"], "promote");
    assert_eq!(reply["success"], true);

    ws.send(Message::Text(
        admin_msg("ADMIN_GET_LEVEL", json!({"client_id": "0xclient"})).to_string(),
    ))
    .await
    .unwrap();
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["level"], "contact");

    ws.send(Message::Text(
        admin_msg("ADMIN_BLOCK", json!({"client_id": "0xclient", "reason": "spam"})).to_string(),
    ))
    .await
    .unwrap();
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["action"], "block");

    ws.send(Message::Text(
        admin_msg("ADMIN_UNBLOCK", json!({"client_id": "0xclient"})).to_string(),
    ))
    .await
    .unwrap();
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["action"], "unblock");

    // Super-admin only: managing the admin set.
    ws.send(Message::Text(
        admin_msg("ADMIN_ADD", json!({"admin_id": "0xdeputy"})).to_string(),
    ))
    .await
    .unwrap();
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["action"], "add_admin");
}

#[tokio::test]
async fn non_admin_rejected() {
    let (_dir, state, caller) = test_state("open", Arc::new(EchoFactory::default()));
    let addr = spawn_server(state).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    let mut envelope = build_envelope(
        &caller,
        json!({"client_id": "0xclient", "timestamp": now()}),
    );
    envelope["type"] = json!("ADMIN_PROMOTE");
    ws.send(Message::Text(envelope.to_string())).await.unwrap();
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "ERROR");
    assert_eq!(reply["message"], "forbidden: admin only");
}
