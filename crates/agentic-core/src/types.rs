//! Core data model (§3): transcript entries, tool calls/results, execution
//! steps, and the terminal `TaskResult`/`SubAgentResult` shapes shared by the
//! ReAct loop executor and the sub-agent spawner. Also carries the gateway's
//! wire-facing types (`GatewayConfig`, `BindMode`, `AuthConfig`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Session identifier - cheaply cloneable
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct SessionKey(Arc<str>);

impl SessionKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Message role
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Where a transcript message came from, for debugging and for compression
/// to tell "real" history from synthetic notes it inserted itself.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MessageSource {
    Prompt,
    User,
    Assistant,
    ToolResult,
    Summary,
    Debug,
}

/// One transcript entry (§3 `Message`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub source: MessageSource,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            tool_name: None,
            timestamp: chrono::Utc::now(),
            source: MessageSource::Prompt,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            tool_name: None,
            timestamp: chrono::Utc::now(),
            source: MessageSource::User,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            tool_name: None,
            timestamp: chrono::Utc::now(),
            source: MessageSource::Assistant,
        }
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            tool_name: None,
            timestamp: chrono::Utc::now(),
            source: MessageSource::Assistant,
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
            timestamp: chrono::Utc::now(),
            source: MessageSource::ToolResult,
        }
    }

    pub fn summary(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            tool_name: None,
            timestamp: chrono::Utc::now(),
            source: MessageSource::Summary,
        }
    }

    pub fn debug_note(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            tool_name: None,
            timestamp: chrono::Utc::now(),
            source: MessageSource::Debug,
        }
    }
}

/// A tool call requested by the assistant (§3 `ToolCall`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    /// Non-empty, unique within its assistant message.
    pub id: String,
    pub name: String,
    /// JSON-encoded argument object (string form, as emitted by the model).
    pub arguments: String,
}

/// The outcome of one `ToolCall` (§3 `ToolResult`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub success: bool,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    /// The arguments the call was actually invoked with, echoed back for
    /// observability independent of what the model originally sent.
    pub tool_args: String,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            success: true,
            content: content.into(),
            data: None,
            error: None,
            duration_ms: 0,
            tool_args: String::new(),
        }
    }

    pub fn failed(call_id: impl Into<String>, tool_name: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            success: false,
            content: error.clone(),
            data: None,
            error: Some(error),
            duration_ms: 0,
            tool_args: String::new(),
        }
    }
}

/// Tool definition exposed to the model (schema, not an implementation).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Streaming delta from LLM
#[derive(Clone, Debug)]
pub enum StreamDelta {
    Text(String),
    Thinking(String),
    ToolCallStart { id: String, name: String },
    ToolCallDelta { id: String, arguments: String },
    ToolCallEnd { id: String },
    Done,
    Error(String),
}

/// One loop iteration record (§3 `ExecutionStep`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionStep {
    /// 1-based.
    pub iteration: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
    pub duration_ms: u64,
    pub tokens_used: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Terminal classification of a `TaskResult` (§7, §8).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    FinalAnswer,
    MaxIterations,
    FatalError,
    Cancelled,
}

/// Terminal output of a task execution (§3 `TaskResult`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub answer: String,
    /// 0.0-1.0
    pub confidence: f32,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
    pub iterations: usize,
    pub steps: Vec<ExecutionStep>,
    pub stop_reason: StopReason,
    pub duration_ms: u64,
}

impl TaskResult {
    pub fn max_iterations(steps: Vec<ExecutionStep>, duration_ms: u64, tokens: (usize, usize)) -> Self {
        Self {
            success: false,
            answer: "maximum iterations reached".to_string(),
            confidence: 0.5,
            prompt_tokens: tokens.0,
            completion_tokens: tokens.1,
            total_tokens: tokens.0 + tokens.1,
            iterations: steps.len(),
            steps,
            stop_reason: StopReason::MaxIterations,
            duration_ms,
        }
    }

    pub fn cancelled(steps: Vec<ExecutionStep>, duration_ms: u64) -> Self {
        let iterations = steps.len();
        Self {
            success: false,
            answer: String::new(),
            confidence: 0.0,
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            iterations,
            steps,
            stop_reason: StopReason::Cancelled,
            duration_ms,
        }
    }
}

/// Configuration snapshot carried by a `TaskExecutionContext`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskConfig {
    pub model: String,
    pub max_tokens: usize,
    pub max_iterations: usize,
    pub temperature: f32,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            model: "claude-opus-4-6-20250929".to_string(),
            max_tokens: 8192,
            max_iterations: 25,
            temperature: 0.7,
        }
    }
}

/// The immutable inputs plus mutable transcript for one loop invocation
/// (§3 `TaskExecutionContext`).
#[derive(Clone, Debug)]
pub struct TaskExecutionContext {
    pub task_id: String,
    pub session_id: String,
    pub parent_task_id: Option<String>,
    pub goal: String,
    pub transcript: Vec<Message>,
    pub tool_schema: Vec<ToolDefinition>,
    pub config: TaskConfig,
    pub working_dir: PathBuf,
}

impl TaskExecutionContext {
    pub fn new(
        task_id: impl Into<String>,
        session_id: impl Into<String>,
        goal: impl Into<String>,
        working_dir: PathBuf,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            session_id: session_id.into(),
            parent_task_id: None,
            goal: goal.into(),
            transcript: Vec::new(),
            tool_schema: Vec::new(),
            config: TaskConfig::default(),
            working_dir,
        }
    }
}

/// Inputs to a delegated sub-agent execution (§3 `SubAgentConfig`).
#[derive(Clone, Debug)]
pub struct SubAgentConfig {
    pub session_id: String,
    /// `None` means "inherit whatever the parent registry exposes"; the
    /// sub-agent tool itself is always stripped regardless.
    pub allowed_tools: Option<Vec<String>>,
    pub max_iterations: usize,
    pub cache_enabled: bool,
}

impl Default for SubAgentConfig {
    fn default() -> Self {
        Self {
            session_id: String::new(),
            allowed_tools: None,
            max_iterations: 50,
            cache_enabled: true,
        }
    }
}

/// Outputs of a delegated sub-agent execution (§3 `SubAgentResult`): the same
/// fields as `TaskResult` plus the child's own identifiers for the parent to
/// log and attribute.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubAgentResult {
    pub session_id: String,
    pub task_id: String,
    pub result: TaskResult,
}

/// Gateway configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub bind: BindMode,
    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_port() -> u16 {
    18789
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: BindMode::default(),
            auth: AuthConfig::default(),
        }
    }
}

/// Bind mode for the gateway
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    Loopback,
    #[default]
    Lan,
}

impl BindMode {
    pub fn to_addr(&self) -> &str {
        match self {
            BindMode::Loopback => "127.0.0.1",
            BindMode::Lan => "0.0.0.0",
        }
    }
}

/// Authentication configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    pub token: Option<String>,
}

/// Authentication mode
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Token,
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_ok_and_failed_set_success_flag() {
        let ok = ToolResult::ok("c1", "read", "contents");
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = ToolResult::failed("c2", "read", "not found");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("not found"));
    }

    #[test]
    fn max_iterations_result_has_expected_shape() {
        let result = TaskResult::max_iterations(Vec::new(), 10, (100, 50));
        assert!(!result.success);
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.stop_reason, StopReason::MaxIterations);
        assert_eq!(result.total_tokens, 150);
    }
}
