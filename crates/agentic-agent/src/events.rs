//! The stable event taxonomy (C7) emitted by a running task.
//!
//! Every iteration of the executor emits events through an [`EventSink`]
//! rather than writing to a broadcast channel directly — this is what lets
//! the gateway, a CLI progress bar, and a test harness all observe the same
//! run without the executor knowing who's listening.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One observable occurrence during task execution. Variants are named for
/// what happened, not for which subsystem raised them, so they read the same
/// whether a human or a sub-agent triggered them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Status { task_id: String, message: String },
    Analysis { task_id: String, text: String },
    Iteration { task_id: String, n: u32 },
    ThinkingResult { task_id: String, text: String },
    TokenDelta { task_id: String, text: String },
    ToolStart { task_id: String, call_id: String, name: String },
    ToolArgsDelta { task_id: String, call_id: String, arguments: String },
    ToolResult { task_id: String, call_id: String, name: String, content: String, is_error: bool },
    ToolError { task_id: String, call_id: String, name: String, error: String },
    TokenUsage { task_id: String, prompt_tokens: u32, completion_tokens: u32 },
    MessageIntegration { task_id: String, summary: String },
    SubagentCompression { task_id: String, before_messages: usize, after_messages: usize },
    EmergencyCompression { task_id: String, before_tokens: usize, after_tokens: usize },
    SubAgentStart { task_id: String, child_task_id: String, purpose: String },
    SubAgentComplete { task_id: String, child_task_id: String, success: bool },
    SubAgentError { task_id: String, child_task_id: String, error: String },
    SubAgentPanicRecovery { task_id: String, child_task_id: String },
    FinalAnswer { task_id: String, text: String, confidence: Option<f32> },
    MaxIterations { task_id: String, iterations: u32 },
    Error { task_id: String, message: String },
    Complete { task_id: String },
}

impl AgentEvent {
    pub fn task_id(&self) -> &str {
        match self {
            Self::Status { task_id, .. }
            | Self::Analysis { task_id, .. }
            | Self::Iteration { task_id, .. }
            | Self::ThinkingResult { task_id, .. }
            | Self::TokenDelta { task_id, .. }
            | Self::ToolStart { task_id, .. }
            | Self::ToolArgsDelta { task_id, .. }
            | Self::ToolResult { task_id, .. }
            | Self::ToolError { task_id, .. }
            | Self::TokenUsage { task_id, .. }
            | Self::MessageIntegration { task_id, .. }
            | Self::SubagentCompression { task_id, .. }
            | Self::EmergencyCompression { task_id, .. }
            | Self::SubAgentStart { task_id, .. }
            | Self::SubAgentComplete { task_id, .. }
            | Self::SubAgentError { task_id, .. }
            | Self::SubAgentPanicRecovery { task_id, .. }
            | Self::FinalAnswer { task_id, .. }
            | Self::MaxIterations { task_id, .. }
            | Self::Error { task_id, .. }
            | Self::Complete { task_id } => task_id,
        }
    }
}

/// Where task events go. A bounded `mpsc::Sender` is the common case; tests
/// can implement this over a `Vec` to assert on emitted sequences without a
/// channel.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: AgentEvent);
}

/// Backpressure policy for a channel-backed sink: block the emitter or drop
/// the event and log it. Default is `Block` — losing an event silently is
/// worse than slowing the producer down, except where callers explicitly
/// accept drops (§4.7 — high-frequency streaming deltas under a slow client).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressurePolicy {
    Block,
    DropOldest,
}

pub struct ChannelEventSink {
    tx: mpsc::Sender<AgentEvent>,
    policy: BackpressurePolicy,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::Sender<AgentEvent>) -> Self {
        Self { tx, policy: BackpressurePolicy::Block }
    }

    pub fn with_policy(tx: mpsc::Sender<AgentEvent>, policy: BackpressurePolicy) -> Self {
        Self { tx, policy }
    }
}

#[async_trait::async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: AgentEvent) {
        match self.policy {
            BackpressurePolicy::Block => {
                let _ = self.tx.send(event).await;
            }
            BackpressurePolicy::DropOldest => {
                if self.tx.try_send(event).is_err() {
                    tracing::warn!("event sink full, dropping event");
                }
            }
        }
    }
}

/// Create a bounded channel pair sized for a single task's event volume.
pub fn event_channel(capacity: usize) -> (mpsc::Sender<AgentEvent>, mpsc::Receiver<AgentEvent>) {
    mpsc::channel(capacity)
}
