//! The WebSocket pump at `/ws`.
//!
//! One socket serves a sequence of client messages. An `INPUT` starts an
//! agent and enters the pump: three concerns multiplexed in one
//! `tokio::select!` loop — draining agent events to the socket, reading
//! client messages (replies go to the agent, `PONG` is dropped), and a 30 s
//! `PING` keep-alive. When the agent finishes, the remaining events are
//! drained and a single final `OUTPUT` (or `ERROR`) is sent — unless the
//! client disconnected, in which case the persisted session record serves
//! recovery via `GET /sessions/{id}`.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};

use oo_domain::short_address;
use oo_protocol::msg;

use crate::auth::{extract_and_authenticate, verify_signed, GateError};
use crate::channel::{io_channel, IoRemote};
use crate::invoker::invoke_agent;
use crate::state::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(30);

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let data: Value = match serde_json::from_str(&text) {
            Ok(data) => data,
            Err(_) => {
                let _ = send_error(&mut sink, "Invalid JSON").await;
                continue;
            }
        };

        match data.get("type").and_then(Value::as_str) {
            Some(msg::ONBOARD_SUBMIT) => {
                let _ = handle_onboard_submit(&state, &data, &mut sink).await;
            }
            Some(t) if t.starts_with(msg::ADMIN_PREFIX) => {
                let _ = handle_admin(&state, &data, t, &mut sink).await;
            }
            Some(msg::PONG) => {}
            Some(msg::INPUT) => {
                run_input(&state, data, &mut sink, &mut stream).await;
            }
            _ => {
                // No agent is running on this socket yet; nothing can
                // consume the message.
                let _ = send_error(&mut sink, "INPUT required").await;
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// INPUT: auth, agent start, and the pump
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_input(state: &AppState, data: Value, sink: &mut WsSink, stream: &mut WsStream) {
    let authed = match extract_and_authenticate(
        &data,
        &state.trust,
        &state.blacklist,
        &state.whitelist,
        Some(state.keys.address()),
    )
    .await
    {
        Ok(authed) => authed,
        Err(GateError::Forbidden(reason)) => {
            // A denied stranger gets the onboarding requirements instead of
            // a bare error, when the policy offers any.
            let identity = data.get("from").and_then(Value::as_str).unwrap_or_default();
            if let Some(mut requirements) = onboard_requirements(state) {
                requirements["type"] = json!(msg::ONBOARD_REQUIRED);
                requirements["identity"] = json!(identity);
                let _ = send_json(sink, &requirements).await;
            } else {
                let _ = send_error(sink, &format!("forbidden: {reason}")).await;
            }
            return;
        }
        Err(err) => {
            let _ = send_error(sink, &err.to_string()).await;
            return;
        }
    };

    if authed.prompt.is_empty() {
        let _ = send_error(sink, "prompt required").await;
        return;
    }

    // Continuation session rides either inside the signed payload or on the
    // message itself.
    let session = data["payload"]
        .get("session")
        .or_else(|| data.get("session"))
        .cloned();
    let (io, remote) = io_channel();
    let IoRemote {
        mut outgoing,
        incoming,
    } = remote;
    let mut incoming_tx = Some(incoming);

    let mut agent_task = tokio::spawn(invoke_agent(
        state.factory.clone(),
        state.sessions.clone(),
        authed.prompt,
        session,
        io,
        state.config.result_ttl,
    ));

    let mut ping = tokio::time::interval_at(
        tokio::time::Instant::now() + PING_INTERVAL,
        PING_INTERVAL,
    );
    let mut disconnected = false;
    let mut outgoing_open = true;

    // The pump: runs until the agent worker completes.
    let joined = loop {
        tokio::select! {
            joined = &mut agent_task => break joined,

            maybe_event = outgoing.recv(), if outgoing_open => {
                match maybe_event {
                    Some(event) => {
                        if !disconnected && send_json(sink, &event).await.is_err() {
                            disconnected = true;
                            incoming_tx = None;
                        }
                    }
                    None => outgoing_open = false,
                }
            }

            client_msg = stream.next(), if !disconnected => {
                match client_msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(value) = serde_json::from_str::<Value>(&text) {
                            match value.get("type").and_then(Value::as_str) {
                                Some(msg::PONG) => {}
                                _ => {
                                    // Approval responses and answers flow to
                                    // the agent's incoming queue.
                                    if let Some(tx) = &incoming_tx {
                                        let _ = tx.send(value);
                                    }
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        disconnected = true;
                        // Dropping the sender closes the channel; a blocked
                        // agent recv unblocks with None.
                        incoming_tx = None;
                    }
                    Some(Err(_)) => {
                        disconnected = true;
                        incoming_tx = None;
                    }
                    Some(Ok(_)) => {}
                }
            }

            _ = ping.tick(), if !disconnected => {
                if send_json(sink, &json!({"type": msg::PING})).await.is_err() {
                    disconnected = true;
                    incoming_tx = None;
                }
            }
        }
    };

    // Agent is done: drain whatever events it emitted before returning.
    while let Ok(event) = outgoing.try_recv() {
        if !disconnected && send_json(sink, &event).await.is_err() {
            disconnected = true;
        }
    }

    if disconnected {
        // Result already persisted; the client recovers via GET /sessions/{id}.
        tracing::info!("client disconnected mid-run; result persisted for recovery");
        return;
    }

    match joined {
        Ok(Ok(result)) => {
            let _ = send_json(
                sink,
                &json!({
                    "type": msg::OUTPUT,
                    "result": result.result,
                    "session_id": result.session_id,
                    "duration_ms": result.duration_ms,
                    "session": result.session,
                }),
            )
            .await;
        }
        Ok(Err(e)) => {
            state.activity.append(&format!("agent failure: {e}"));
            let _ = send_error(sink, &format!("internal: {e}")).await;
        }
        Err(e) => {
            tracing::error!(error = %e, "agent worker task failed");
            let _ = send_error(sink, "internal: agent worker failed").await;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Onboarding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Onboarding methods the policy offers, or `None` when it offers none.
/// Payment onboarding includes the host's receiving address.
pub(crate) fn onboard_requirements(state: &AppState) -> Option<Value> {
    let onboard = state.trust.onboard_config()?;
    let mut methods = Vec::new();
    let mut requirements = json!({});

    if !onboard.invite_code.is_empty() {
        methods.push("invite_code");
    }
    if let Some(amount) = onboard.payment {
        methods.push("payment");
        requirements["payment_amount"] = json!(amount);
        requirements["payment_address"] = json!(state.keys.address());
    }

    if methods.is_empty() {
        return None;
    }
    requirements["methods"] = json!(methods);
    Some(requirements)
}

async fn handle_onboard_submit(
    state: &AppState,
    data: &Value,
    sink: &mut WsSink,
) -> Result<(), axum::Error> {
    // Signature is always required, even during onboarding.
    let identity = match verify_signed(data, &state.blacklist, Some(state.keys.address())) {
        Ok(identity) => identity,
        Err(err) => return send_error(sink, &err.to_string()).await,
    };

    // Blocked before onboarding: don't burn invite codes or payments.
    if state.trust.is_blocked(&identity).unwrap_or(true) {
        return send_error(sink, "forbidden: blocked").await;
    }

    let payload = &data["payload"];
    let invite_code = payload.get("invite_code").and_then(Value::as_str);
    let payment = payload.get("payment").and_then(Value::as_f64).unwrap_or(0.0);

    if let Some(code) = invite_code {
        return match state.trust.verify_invite(&identity, code) {
            Ok(true) => {
                let level = level_name(state, &identity);
                state.activity.append(&format!(
                    "verified {} with invite code {code} -> {level}",
                    short_address(&identity)
                ));
                send_json(
                    sink,
                    &json!({
                        "type": msg::ONBOARD_SUCCESS,
                        "identity": identity,
                        "level": level,
                        "message": format!("Invite code verified. You are now a {level}."),
                    }),
                )
                .await
            }
            Ok(false) => {
                state.activity.append(&format!(
                    "invalid invite code {code} from {}",
                    short_address(&identity)
                ));
                send_error(sink, "Invalid invite code").await
            }
            Err(e) => send_error(sink, &format!("internal: {e}")).await,
        };
    }

    if payment > 0.0 {
        return match state.trust.verify_payment(&identity, payment).await {
            Ok(true) => {
                let level = level_name(state, &identity);
                state.activity.append(&format!(
                    "verified {} with payment {payment} -> {level}",
                    short_address(&identity)
                ));
                send_json(
                    sink,
                    &json!({
                        "type": msg::ONBOARD_SUCCESS,
                        "identity": identity,
                        "level": level,
                        "message": format!("Payment verified. You are now a {level}."),
                    }),
                )
                .await
            }
            Ok(false) => {
                state.activity.append(&format!(
                    "insufficient payment {payment} from {}",
                    short_address(&identity)
                ));
                send_error(sink, "Insufficient payment").await
            }
            Err(e) => send_error(sink, &format!("internal: {e}")).await,
        };
    }

    send_error(sink, "invite_code or payment required").await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Admin messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn handle_admin(
    state: &AppState,
    data: &Value,
    msg_type: &str,
    sink: &mut WsSink,
) -> Result<(), axum::Error> {
    let identity = match verify_signed(data, &state.blacklist, Some(state.keys.address())) {
        Ok(identity) => identity,
        Err(err) => return send_error(sink, &err.to_string()).await,
    };

    if !state.trust.is_admin(&identity).unwrap_or(false) {
        return send_error(sink, "forbidden: admin only").await;
    }

    let payload = &data["payload"];
    let outcome = dispatch_admin(state, &identity, msg_type, payload);

    match outcome {
        Ok(reply) => {
            state.activity.append(&format!(
                "admin {} by {}: {}",
                msg_type,
                short_address(&identity),
                reply["message"].as_str().unwrap_or("ok")
            ));
            send_json(sink, &reply).await
        }
        Err(message) => send_error(sink, &message).await,
    }
}

/// Execute one admin action. Returns the `ADMIN_RESULT` reply, or an error
/// message for the `ERROR` path.
fn dispatch_admin(
    state: &AppState,
    identity: &str,
    msg_type: &str,
    payload: &Value,
) -> Result<Value, String> {
    let client_id = payload.get("client_id").and_then(Value::as_str);

    let result = |action: &str, message: String| {
        json!({
            "type": msg::ADMIN_RESULT,
            "action": action,
            "success": true,
            "message": message,
        })
    };

    let store_err = |e: oo_domain::Error| format!("internal: {e}");

    match msg_type {
        "ADMIN_PROMOTE" => {
            let client_id = client_id.ok_or("client_id required")?;
            // Default promotion target is contact; "whitelist" lifts fully.
            match payload.get("level").and_then(Value::as_str) {
                Some("whitelist") => state
                    .trust
                    .promote_to_whitelist(client_id)
                    .map_err(store_err)?,
                _ => state.trust.promote_to_contact(client_id).map_err(store_err)?,
            }
            let level = level_name(state, client_id);
            Ok(result("promote", format!("{client_id} promoted to {level}")))
        }
        "ADMIN_DEMOTE" => {
            let client_id = client_id.ok_or("client_id required")?;
            match payload.get("level").and_then(Value::as_str) {
                Some("contact") => state.trust.demote_to_contact(client_id).map_err(store_err)?,
                _ => state.trust.demote_to_stranger(client_id).map_err(store_err)?,
            }
            let level = level_name(state, client_id);
            Ok(result("demote", format!("{client_id} demoted to {level}")))
        }
        "ADMIN_BLOCK" => {
            let client_id = client_id.ok_or("client_id required")?;
            state.trust.block(client_id).map_err(store_err)?;
            let reason = payload.get("reason").and_then(Value::as_str).unwrap_or("");
            Ok(result(
                "block",
                if reason.is_empty() {
                    format!("{client_id} blocked")
                } else {
                    format!("{client_id} blocked: {reason}")
                },
            ))
        }
        "ADMIN_UNBLOCK" => {
            let client_id = client_id.ok_or("client_id required")?;
            state.trust.unblock(client_id).map_err(store_err)?;
            Ok(result("unblock", format!("{client_id} unblocked")))
        }
        "ADMIN_GET_LEVEL" => {
            let client_id = client_id.ok_or("client_id required")?;
            let level = state
                .trust
                .get_level(client_id)
                .map_err(store_err)?;
            Ok(json!({
                "type": msg::ADMIN_RESULT,
                "action": "get_level",
                "success": true,
                "client_id": client_id,
                "level": level.as_str(),
            }))
        }
        "ADMIN_ADD" => {
            if !state.trust.is_super_admin(identity) {
                return Err("forbidden: super admin only".to_owned());
            }
            let admin_id = payload
                .get("admin_id")
                .and_then(Value::as_str)
                .ok_or("admin_id required")?;
            state.trust.add_admin(admin_id).map_err(store_err)?;
            Ok(result("add_admin", format!("{admin_id} is now an admin")))
        }
        "ADMIN_REMOVE" => {
            if !state.trust.is_super_admin(identity) {
                return Err("forbidden: super admin only".to_owned());
            }
            let admin_id = payload
                .get("admin_id")
                .and_then(Value::as_str)
                .ok_or("admin_id required")?;
            state.trust.remove_admin(admin_id).map_err(store_err)?;
            Ok(result("remove_admin", format!("{admin_id} removed from admins")))
        }
        other => Err(format!("Unknown admin action: {other}")),
    }
}

fn level_name(state: &AppState, identity: &str) -> String {
    state
        .trust
        .get_level(identity)
        .map(|l| l.as_str().to_owned())
        .unwrap_or_else(|_| "unknown".to_owned())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Socket helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn send_json(sink: &mut WsSink, value: &Value) -> Result<(), axum::Error> {
    let text = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_owned());
    sink.send(Message::Text(text)).await
}

async fn send_error(sink: &mut WsSink, message: &str) -> Result<(), axum::Error> {
    send_json(sink, &json!({"type": msg::ERROR, "message": message})).await
}
