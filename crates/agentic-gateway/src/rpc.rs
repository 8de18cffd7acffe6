//! RPC router — dispatches JSON-RPC method calls to handlers
//!
//! Each RPC method (chat.send, chat.history, sessions.list, etc.) is handled
//! by a dedicated async function. The router maps method names to handlers.

use agentic_agent::{AgentEvent, AgentRuntime, SessionKey};
use agentic_core::{EventMessage, RpcResponse};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::info;

/// An [`AgentEvent`] paired with the session name the turn was run against.
/// Events themselves carry a `task_id` (fresh per turn, §3), not the
/// long-lived session name a client subscribes by, so the forwarding task
/// that drives a turn tags each event with the session it knows it's
/// running before putting it on the broadcast channel.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub session: String,
    pub event: AgentEvent,
}

/// Connection context passed to RPC handlers.
pub struct ConnectionContext {
    pub authenticated: bool,
    pub agent: Arc<AgentRuntime>,
    pub output_tx: broadcast::Sender<SessionEvent>,
}

/// Result type for RPC handlers.
pub type RpcResult = Result<Value, (i32, String)>;

/// Route an RPC method call to the appropriate handler.
pub async fn route_rpc(method: &str, params: Value, ctx: &ConnectionContext) -> RpcResult {
    // Auth check — most methods require authentication
    if !ctx.authenticated && method != "auth" {
        return Err((-32000, "Not authenticated".to_string()));
    }

    match method {
        "chat.send" => handle_chat_send(params, ctx).await,
        "chat.history" => handle_chat_history(params, ctx).await,
        "chat.abort" => handle_chat_abort(params, ctx).await,
        "sessions.list" => handle_sessions_list(ctx).await,
        "sessions.usage" => handle_sessions_usage(params, ctx).await,
        "sessions.delete" => handle_sessions_delete(params, ctx).await,
        "ctx.read" => handle_ctx_read(params, ctx).await,
        "health" => handle_health(ctx).await,
        "tools.list" => handle_tools_list(ctx).await,
        "echo" => Ok(params),
        _ => Err((-32601, format!("Method not found: {}", method))),
    }
}

/// Convert an RPC result to an RpcResponse.
pub fn to_response(id: &str, result: RpcResult) -> RpcResponse {
    match result {
        Ok(value) => RpcResponse::ok(id, value),
        Err((code, message)) => RpcResponse::err(id, code, message),
    }
}

// ---------------------------------------------------------------------------
// chat.send — send a message to a session
// ---------------------------------------------------------------------------

async fn handle_chat_send(params: Value, ctx: &ConnectionContext) -> RpcResult {
    let session = params["session"]
        .as_str()
        .ok_or_else(|| (-32602, "Missing required param: session".to_string()))?
        .to_string();
    let message = params["message"]
        .as_str()
        .ok_or_else(|| (-32602, "Missing required param: message".to_string()))?
        .to_string();
    let model = params["model"].as_str().map(String::from);

    let session_key = SessionKey::new(&session);

    // Set model if provided
    if let Some(m) = model {
        if let Some(sess) = ctx.agent.sessions().get(&session_key) {
            sess.set_model(&m).await;
        }
    }

    info!(
        "chat.send: session={} message={}",
        session,
        &message[..message.len().min(50)]
    );

    // Spawn the agent turn in the background
    let agent = ctx.agent.clone();
    let output_tx = ctx.output_tx.clone();
    let session_clone = session.clone();
    let sk = session_key.clone();

    tokio::spawn(async move {
        let (event_tx, mut event_rx) = agentic_agent::events::event_channel(256);

        let fwd_output_tx = output_tx.clone();
        let fwd_session = session_clone.clone();
        let forward_task = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let _ = fwd_output_tx.send(SessionEvent { session: fwd_session.clone(), event });
            }
        });

        let result = agent.run_turn(&sk, &message, event_tx).await;
        let _ = forward_task.await;

        if let Err(e) = result {
            let _ = output_tx.send(SessionEvent {
                session: session_clone,
                event: AgentEvent::Error { task_id: String::new(), message: e },
            });
        }
    });

    // Return immediately — events stream via the broadcast channel
    Ok(serde_json::json!({ "ok": true }))
}

// ---------------------------------------------------------------------------
// chat.history — get conversation history
// ---------------------------------------------------------------------------

async fn handle_chat_history(params: Value, ctx: &ConnectionContext) -> RpcResult {
    let session = params["session"]
        .as_str()
        .ok_or_else(|| (-32602, "Missing required param: session".to_string()))?;

    let session_key = SessionKey::new(session);
    let sess = ctx
        .agent
        .sessions()
        .get(&session_key)
        .ok_or_else(|| (-32001, format!("Session not found: {}", session)))?;

    let transcript = sess.get_transcript().await;
    let token_count = sess.token_count().await;
    let model = sess.model().await;

    let msg_json: Vec<Value> = transcript
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": m.role,
                "content": m.content,
                "tool_call_id": m.tool_call_id,
                "tool_name": m.tool_name,
            })
        })
        .collect();

    Ok(serde_json::json!({
        "session": session,
        "messages": msg_json,
        "token_count": token_count,
        "model": model,
    }))
}

// ---------------------------------------------------------------------------
// chat.abort — abort the current agent turn
// ---------------------------------------------------------------------------

async fn handle_chat_abort(params: Value, ctx: &ConnectionContext) -> RpcResult {
    let session = params["session"]
        .as_str()
        .ok_or_else(|| (-32602, "Missing required param: session".to_string()))?;

    let session_key = SessionKey::new(session);
    if let Some(sess) = ctx.agent.sessions().get(&session_key) {
        sess.abort().await;
        info!("Aborted session: {}", session);
        Ok(serde_json::json!({ "ok": true }))
    } else {
        Err((-32001, format!("Session not found: {}", session)))
    }
}

// ---------------------------------------------------------------------------
// sessions.list — list all sessions
// ---------------------------------------------------------------------------

async fn handle_sessions_list(ctx: &ConnectionContext) -> RpcResult {
    let sessions: Vec<String> = ctx
        .agent
        .sessions()
        .list()
        .into_iter()
        .map(|k| k.as_str().to_string())
        .collect();
    Ok(serde_json::json!({ "sessions": sessions }))
}

// ---------------------------------------------------------------------------
// sessions.usage — get token usage for a session
// ---------------------------------------------------------------------------

async fn handle_sessions_usage(params: Value, ctx: &ConnectionContext) -> RpcResult {
    let session = params["session"]
        .as_str()
        .ok_or_else(|| (-32602, "Missing required param: session".to_string()))?;

    let session_key = SessionKey::new(session);
    let sess = ctx
        .agent
        .sessions()
        .get(&session_key)
        .ok_or_else(|| (-32001, format!("Session not found: {}", session)))?;

    let token_count = sess.token_count().await;
    let message_count = sess.message_count().await;
    let model = sess.model().await;

    Ok(serde_json::json!({
        "session": session,
        "token_count": token_count,
        "message_count": message_count,
        "model": model,
    }))
}

// ---------------------------------------------------------------------------
// sessions.delete — delete a session
// ---------------------------------------------------------------------------

async fn handle_sessions_delete(params: Value, ctx: &ConnectionContext) -> RpcResult {
    let session = params["session"]
        .as_str()
        .ok_or_else(|| (-32602, "Missing required param: session".to_string()))?;

    let session_key = SessionKey::new(session);
    match ctx.agent.sessions().remove(&session_key) {
        Some(_) => {
            info!("Deleted session: {}", session);
            Ok(serde_json::json!({ "ok": true }))
        }
        None => Err((-32001, format!("Session not found: {}", session))),
    }
}

// ---------------------------------------------------------------------------
// ctx.read — return full .ctx file contents for a session
// ---------------------------------------------------------------------------

async fn handle_ctx_read(params: Value, ctx: &ConnectionContext) -> RpcResult {
    let session = params["session"]
        .as_str()
        .ok_or_else(|| (-32602, "Missing required param: session".to_string()))?;

    let session_key = SessionKey::new(session);
    let sess = ctx
        .agent
        .sessions()
        .get(&session_key)
        .ok_or_else(|| (-32002, format!("Session not found: {}", session)))?;

    match sess.read_ctx() {
        Some(content) => Ok(serde_json::json!({
            "session": session,
            "content": content,
        })),
        None => Ok(serde_json::json!({
            "session": session,
            "content": null,
        })),
    }
}

// ---------------------------------------------------------------------------
// health — gateway health check
// ---------------------------------------------------------------------------

async fn handle_health(ctx: &ConnectionContext) -> RpcResult {
    Ok(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": ctx.agent.sessions().list().len(),
        "tools": ctx.agent.tool_definitions().await.len(),
    }))
}

// ---------------------------------------------------------------------------
// tools.list — list available tools
// ---------------------------------------------------------------------------

async fn handle_tools_list(ctx: &ConnectionContext) -> RpcResult {
    let tools: Vec<Value> = ctx
        .agent
        .tool_definitions()
        .await
        .into_iter()
        .map(|t| {
            serde_json::json!({
                "name": t.name,
                "description": t.description,
            })
        })
        .collect();
    Ok(serde_json::json!({ "tools": tools }))
}

/// Convert a session-tagged [`AgentEvent`] into the wire [`EventMessage`].
pub fn session_event_to_message(evt: &SessionEvent) -> EventMessage {
    let session = evt.session.as_str();
    match &evt.event {
        AgentEvent::Status { message, .. } => {
            EventMessage::chat(session, "status", serde_json::json!({ "message": message }))
        }
        AgentEvent::Analysis { text, .. } => {
            EventMessage::chat(session, "analysis", serde_json::json!({ "text": text }))
        }
        AgentEvent::Iteration { n, .. } => {
            EventMessage::chat(session, "iteration", serde_json::json!({ "n": n }))
        }
        AgentEvent::ThinkingResult { text, .. } => EventMessage::chat_thinking(session, text),
        AgentEvent::TokenDelta { text, .. } => EventMessage::chat_delta(session, text),
        AgentEvent::ToolStart { call_id, name, .. } => {
            EventMessage::chat_tool_call(session, call_id, name)
        }
        AgentEvent::ToolArgsDelta { call_id, arguments, .. } => {
            EventMessage::chat_tool_call_delta(session, call_id, arguments)
        }
        AgentEvent::ToolResult { call_id, name, content, is_error, .. } => {
            EventMessage::chat_tool_result(session, call_id, name, content, *is_error)
        }
        AgentEvent::ToolError { call_id, name, error, .. } => EventMessage::chat(
            session,
            "tool_error",
            serde_json::json!({ "id": call_id, "name": name, "error": error }),
        ),
        AgentEvent::TokenUsage { prompt_tokens, completion_tokens, .. } => EventMessage::chat(
            session,
            "token_usage",
            serde_json::json!({ "prompt_tokens": prompt_tokens, "completion_tokens": completion_tokens }),
        ),
        AgentEvent::MessageIntegration { summary, .. } => {
            EventMessage::chat(session, "message_integration", serde_json::json!({ "summary": summary }))
        }
        AgentEvent::SubagentCompression { before_messages, after_messages, .. } => EventMessage::chat(
            session,
            "subagent_compression",
            serde_json::json!({ "before_messages": before_messages, "after_messages": after_messages }),
        ),
        AgentEvent::EmergencyCompression { before_tokens, after_tokens, .. } => EventMessage::chat(
            session,
            "emergency_compression",
            serde_json::json!({ "before_tokens": before_tokens, "after_tokens": after_tokens }),
        ),
        AgentEvent::SubAgentStart { child_task_id, purpose, .. } => EventMessage::chat(
            session,
            "subagent_start",
            serde_json::json!({ "child_task_id": child_task_id, "purpose": purpose }),
        ),
        AgentEvent::SubAgentComplete { child_task_id, success, .. } => EventMessage::chat(
            session,
            "subagent_complete",
            serde_json::json!({ "child_task_id": child_task_id, "success": success }),
        ),
        AgentEvent::SubAgentError { child_task_id, error, .. } => EventMessage::chat(
            session,
            "subagent_error",
            serde_json::json!({ "child_task_id": child_task_id, "error": error }),
        ),
        AgentEvent::SubAgentPanicRecovery { child_task_id, .. } => EventMessage::chat(
            session,
            "subagent_panic_recovery",
            serde_json::json!({ "child_task_id": child_task_id }),
        ),
        AgentEvent::FinalAnswer { text, confidence, .. } => EventMessage::chat(
            session,
            "final_answer",
            serde_json::json!({ "text": text, "confidence": confidence }),
        ),
        AgentEvent::MaxIterations { iterations, .. } => EventMessage::chat(
            session,
            "max_iterations",
            serde_json::json!({ "iterations": iterations }),
        ),
        AgentEvent::Error { message, .. } => EventMessage::chat_error(session, message),
        AgentEvent::Complete { .. } => EventMessage::chat_done(session),
    }
}
