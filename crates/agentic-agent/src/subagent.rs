//! Subagent registry — tracks all spawned child agents with lifecycle control.
//!
//! Every subagent gets a purpose-hash name (e.g. `fix-slider-css-a3f9b`) that is:
//! - Human-readable prefix from purpose
//! - Short hash suffix for uniqueness
//! - Addressable by HITL or parent agent
//! - Stable for the subagent's lifetime

use crate::context::{AiSummarizer, ContextManager};
use crate::events::{AgentEvent, EventSink};
use crate::executor::Executor;
use agentic_core::config::{ContextSettings, SubAgentSettings};
use agentic_core::{Carrier, ToolCall, ToolResult as CoreToolResult, TaskExecutionContext};
use agentic_llm::LlmProvider;
use agentic_tools::registry::{Tool, ToolResult as RegistryToolResult};
use agentic_tools::ToolRegistry;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde_json::{json, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, info, warn};

/// Status of a subagent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubagentStatus {
    Running,
    Paused,
    Complete,
    Failed,
    Killed,
}

impl std::fmt::Display for SubagentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
            Self::Killed => write!(f, "killed"),
        }
    }
}

/// Metadata for a tracked subagent.
pub struct SubagentEntry {
    /// The purpose-hash name (e.g. `fix-slider-css-a3f9b`)
    pub name: String,
    /// Original purpose string
    pub purpose: String,
    /// Internal session key used by the runtime
    pub session_id: String,
    /// Current status
    pub status: SubagentStatus,
    /// Token estimate (updated on completion)
    pub tokens: usize,
    /// Wall clock start
    pub started_at: Instant,
    /// Wall clock end (if finished)
    pub ended_at: Option<Instant>,
    /// Last output text (truncated to 500 chars)
    pub last_output: String,
    /// Parent subagent name (None if top-level)
    pub parent: Option<String>,
    /// Children subagent names
    pub children: Vec<String>,
    /// Pause gate — when set, the subagent's LLM loop waits on this notify.
    pub pause_gate: Arc<Notify>,
    /// Whether the pause gate is closed (subagent should wait before next iteration).
    pub is_paused: bool,
    /// Kill signal
    pub kill_requested: bool,
}

/// Generate a purpose-hash name from a purpose string.
///
/// Takes the first few words of the purpose (lowercased, kebab-cased),
/// appends a 5-char hash suffix for uniqueness.
pub fn purpose_hash_name(purpose: &str) -> String {
    // Extract first ~3 meaningful words
    let words: Vec<&str> = purpose
        .split_whitespace()
        .filter(|w| w.len() > 1) // skip tiny words
        .take(4)
        .collect();

    let prefix = if words.is_empty() {
        "agent".to_string()
    } else {
        words
            .iter()
            .map(|w| {
                w.to_lowercase()
                    .chars()
                    .filter(|c| c.is_alphanumeric())
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("-")
    };

    // Truncate prefix to 20 chars
    let prefix = if prefix.len() > 20 {
        prefix[..20].to_string()
    } else {
        prefix
    };

    // Hash the full purpose + timestamp for uniqueness
    let mut hasher = DefaultHasher::new();
    purpose.hash(&mut hasher);
    // Add entropy from current time
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    let hash = hasher.finish();
    let suffix = format!("{:05x}", hash & 0xFFFFF); // 5 hex chars

    format!("{}-{}", prefix, suffix)
}

/// Registry of all subagents. Thread-safe, concurrent access.
#[derive(Default)]
pub struct SubagentRegistry {
    agents: DashMap<String, SubagentEntry>,
}

impl SubagentRegistry {
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
        }
    }

    /// Register a new subagent. Returns the purpose-hash name.
    pub fn register(&self, purpose: &str, session_id: &str, parent: Option<&str>) -> String {
        let name = purpose_hash_name(purpose);
        let entry = SubagentEntry {
            name: name.clone(),
            purpose: purpose.to_string(),
            session_id: session_id.to_string(),
            status: SubagentStatus::Running,
            tokens: 0,
            started_at: Instant::now(),
            ended_at: None,
            last_output: String::new(),
            parent: parent.map(String::from),
            children: Vec::new(),
            pause_gate: Arc::new(Notify::new()),
            is_paused: false,
            kill_requested: false,
        };

        // Register with parent
        if let Some(parent_name) = parent {
            if let Some(mut parent_entry) = self.agents.get_mut(parent_name) {
                parent_entry.children.push(name.clone());
            }
        }

        info!(name = %name, purpose = %purpose, session = %session_id, "Subagent registered");
        self.agents.insert(name.clone(), entry);
        name
    }

    /// Mark a subagent as complete with output and token count.
    pub fn mark_complete(&self, name: &str, output: &str, tokens: usize) {
        if let Some(mut entry) = self.agents.get_mut(name) {
            entry.status = SubagentStatus::Complete;
            entry.tokens = tokens;
            entry.ended_at = Some(Instant::now());
            entry.last_output = if output.len() > 500 {
                format!("{}...", &output[..497])
            } else {
                output.to_string()
            };
            info!(name = %name, tokens = tokens, "Subagent completed");
        }
    }

    /// Mark a subagent as failed.
    pub fn mark_failed(&self, name: &str, error: &str) {
        if let Some(mut entry) = self.agents.get_mut(name) {
            entry.status = SubagentStatus::Failed;
            entry.ended_at = Some(Instant::now());
            entry.last_output = format!("ERROR: {}", error);
            info!(name = %name, error = %error, "Subagent failed");
        }
    }

    /// Pause a subagent and all its children (recursive).
    pub fn pause(&self, name: &str) -> Result<(), String> {
        let children = {
            let mut entry = self
                .agents
                .get_mut(name)
                .ok_or_else(|| format!("Subagent '{}' not found", name))?;

            if entry.status != SubagentStatus::Running {
                return Err(format!(
                    "Subagent '{}' is not running (status: {})",
                    name, entry.status
                ));
            }

            entry.is_paused = true;
            entry.status = SubagentStatus::Paused;
            debug!(name = %name, "Subagent paused");
            entry.children.clone()
        };

        // Recursive pause of children
        for child in children {
            let _ = self.pause(&child); // best-effort recursive
        }

        Ok(())
    }

    /// Resume a subagent and all its children (recursive).
    pub fn resume(&self, name: &str) -> Result<(), String> {
        let (gate, children) = {
            let mut entry = self
                .agents
                .get_mut(name)
                .ok_or_else(|| format!("Subagent '{}' not found", name))?;

            if entry.status != SubagentStatus::Paused {
                return Err(format!(
                    "Subagent '{}' is not paused (status: {})",
                    name, entry.status
                ));
            }

            entry.is_paused = false;
            entry.status = SubagentStatus::Running;
            let gate = entry.pause_gate.clone();
            debug!(name = %name, "Subagent resumed");
            (gate, entry.children.clone())
        };

        // Notify the paused loop to continue
        gate.notify_one();

        // Recursive resume of children
        for child in children {
            let _ = self.resume(&child);
        }

        Ok(())
    }

    /// Kill a subagent and all its children (recursive).
    pub fn kill(&self, name: &str) -> Result<(), String> {
        let (gate, children) = {
            let mut entry = self
                .agents
                .get_mut(name)
                .ok_or_else(|| format!("Subagent '{}' not found", name))?;

            match entry.status {
                SubagentStatus::Complete | SubagentStatus::Failed | SubagentStatus::Killed => {
                    return Err(format!(
                        "Subagent '{}' already terminated (status: {})",
                        name, entry.status
                    ));
                }
                _ => {}
            }

            entry.kill_requested = true;
            entry.status = SubagentStatus::Killed;
            entry.ended_at = Some(Instant::now());
            let gate = entry.pause_gate.clone();
            debug!(name = %name, "Subagent killed");
            (gate, entry.children.clone())
        };

        // Wake if paused so it can see the kill flag
        gate.notify_one();

        // Recursive kill of children
        for child in children {
            let _ = self.kill(&child);
        }

        Ok(())
    }

    /// Query a subagent's status.
    pub fn query(&self, name: &str) -> Result<SubagentInfo, String> {
        let entry = self
            .agents
            .get(name)
            .ok_or_else(|| format!("Subagent '{}' not found", name))?;

        Ok(SubagentInfo {
            name: entry.name.clone(),
            purpose: entry.purpose.clone(),
            status: entry.status,
            tokens: entry.tokens,
            elapsed_ms: entry.started_at.elapsed().as_millis() as u64,
            last_output: entry.last_output.clone(),
            children: entry.children.clone(),
            parent: entry.parent.clone(),
        })
    }

    /// List all subagents.
    pub fn list(&self) -> Vec<SubagentInfo> {
        self.agents
            .iter()
            .map(|entry| SubagentInfo {
                name: entry.name.clone(),
                purpose: entry.purpose.clone(),
                status: entry.status,
                tokens: entry.tokens,
                elapsed_ms: entry.started_at.elapsed().as_millis() as u64,
                last_output: entry.last_output.clone(),
                children: entry.children.clone(),
                parent: entry.parent.clone(),
            })
            .collect()
    }

    /// Check if a subagent is paused (should wait before next LLM iteration).
    pub fn is_paused(&self, name: &str) -> bool {
        self.agents.get(name).map(|e| e.is_paused).unwrap_or(false)
    }

    /// Check if a subagent has been killed.
    pub fn is_killed(&self, name: &str) -> bool {
        self.agents
            .get(name)
            .map(|e| e.kill_requested)
            .unwrap_or(false)
    }

    /// Get the pause gate for a subagent (used to wait when paused).
    pub fn pause_gate(&self, name: &str) -> Option<Arc<Notify>> {
        self.agents.get(name).map(|e| e.pause_gate.clone())
    }

    /// Remove completed/failed/killed subagents older than the given duration.
    pub fn gc(&self, max_age: std::time::Duration) {
        let now = Instant::now();
        let to_remove: Vec<String> = self
            .agents
            .iter()
            .filter(|e| {
                matches!(
                    e.status,
                    SubagentStatus::Complete | SubagentStatus::Failed | SubagentStatus::Killed
                ) && e.ended_at.is_some_and(|t| now.duration_since(t) > max_age)
            })
            .map(|e| e.name.clone())
            .collect();

        for name in to_remove {
            self.agents.remove(&name);
        }
    }

    /// Find a subagent by prefix match (for fuzzy addressing).
    pub fn find_by_prefix(&self, prefix: &str) -> Option<String> {
        let prefix_lower = prefix.to_lowercase();
        self.agents
            .iter()
            .find(|e| e.name.starts_with(&prefix_lower))
            .map(|e| e.name.clone())
    }
}

/// Read-only snapshot of a subagent's state.
#[derive(Debug, Clone)]
pub struct SubagentInfo {
    pub name: String,
    pub purpose: String,
    pub status: SubagentStatus,
    pub tokens: usize,
    pub elapsed_ms: u64,
    pub last_output: String,
    pub children: Vec<String>,
    pub parent: Option<String>,
}

impl std::fmt::Display for SubagentInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] — {} ({}ms, ~{}tok)",
            self.name, self.status, self.purpose, self.elapsed_ms, self.tokens
        )?;
        if !self.last_output.is_empty() {
            let preview = if self.last_output.len() > 100 {
                format!("{}...", &self.last_output[..97])
            } else {
                self.last_output.clone()
            };
            write!(f, "\n  └─ {}", preview)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SubagentControl trait implementation — bridges agent → tools crate
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl agentic_tools::SubagentControl for SubagentRegistry {
    fn register(&self, purpose: &str, session_id: &str, parent: Option<&str>) -> String {
        SubagentRegistry::register(self, purpose, session_id, parent)
    }

    fn mark_complete(&self, name: &str, output: &str, tokens: usize) {
        SubagentRegistry::mark_complete(self, name, output, tokens)
    }

    fn mark_failed(&self, name: &str, error: &str) {
        SubagentRegistry::mark_failed(self, name, error)
    }

    fn is_paused(&self, name: &str) -> bool {
        SubagentRegistry::is_paused(self, name)
    }

    fn is_killed(&self, name: &str) -> bool {
        SubagentRegistry::is_killed(self, name)
    }

    async fn wait_for_resume(&self, name: &str) {
        if let Some(gate) = self.pause_gate(name) {
            gate.notified().await;
        }
    }

    fn pause(&self, name: &str) -> Result<(), String> {
        SubagentRegistry::pause(self, name)
    }

    fn resume(&self, name: &str) -> Result<(), String> {
        SubagentRegistry::resume(self, name)
    }

    fn kill(&self, name: &str) -> Result<(), String> {
        SubagentRegistry::kill(self, name)
    }

    fn query(&self, name: &str) -> Result<agentic_tools::SubagentInfoSnapshot, String> {
        SubagentRegistry::query(self, name).map(|info| agentic_tools::SubagentInfoSnapshot {
            name: info.name,
            purpose: info.purpose,
            status: info.status.to_string(),
            tokens: info.tokens,
            elapsed_ms: info.elapsed_ms,
            last_output: info.last_output,
            children: info.children,
            parent: info.parent,
        })
    }

    fn list_all(&self) -> Vec<agentic_tools::SubagentInfoSnapshot> {
        SubagentRegistry::list(self)
            .into_iter()
            .map(|info| agentic_tools::SubagentInfoSnapshot {
                name: info.name,
                purpose: info.purpose,
                status: info.status.to_string(),
                tokens: info.tokens,
                elapsed_ms: info.elapsed_ms,
                last_output: info.last_output,
                children: info.children,
                parent: info.parent,
            })
            .collect()
    }

    fn find_by_prefix(&self, prefix: &str) -> Option<String> {
        SubagentRegistry::find_by_prefix(self, prefix)
    }
}

// ---------------------------------------------------------------------------
// SubAgentSpawner — C6: creates isolated executors for delegated tasks and
// dispatches them serial (one call) or through a bounded worker pool
// (multiple calls in the same iteration), per §4.6.
// ---------------------------------------------------------------------------

/// Creates and runs isolated [`Executor`] instances for `spawn_subagent` tool
/// calls. One call executes inline; two or more in the same batch run
/// concurrently behind a bounded [`Semaphore`], with results reordered back
/// to the original call order before they reach the transcript.
pub struct SubAgentSpawner {
    provider: Arc<dyn LlmProvider>,
    workspace_root: PathBuf,
    model: String,
    context_settings: ContextSettings,
    summarizer: Option<Arc<dyn AiSummarizer>>,
    registry: Arc<SubagentRegistry>,
    concurrency: usize,
    task_timeout: Duration,
    max_depth: u32,
}

impl SubAgentSpawner {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        workspace_root: PathBuf,
        model: impl Into<String>,
        context_settings: ContextSettings,
        summarizer: Option<Arc<dyn AiSummarizer>>,
        settings: &SubAgentSettings,
    ) -> Self {
        Self {
            provider,
            workspace_root,
            model: model.into(),
            context_settings,
            summarizer,
            registry: Arc::new(SubagentRegistry::new()),
            concurrency: settings.pool_concurrency.clamp(1, 10),
            task_timeout: Duration::from_secs(settings.task_timeout_secs),
            max_depth: settings.max_depth,
        }
    }

    /// The lifecycle registry backing the `subagent` (list/query/pause/
    /// resume/kill) tool — shared so both tools observe the same bookkeeping.
    pub fn registry(&self) -> Arc<SubagentRegistry> {
        self.registry.clone()
    }

    /// Dispatch every `spawn_subagent` call from one iteration. Serial inline
    /// for a single call; a bounded worker pool otherwise. Returned results
    /// line up with `calls` by index regardless of completion order (§4.6,
    /// §8 — "results are reordered to match call order").
    pub async fn dispatch(
        &self,
        calls: &[ToolCall],
        parent_carrier: &Carrier,
        sink: &dyn EventSink,
        parent_task_id: &str,
    ) -> Vec<CoreToolResult> {
        if calls.len() <= 1 {
            let mut out = Vec::with_capacity(calls.len());
            for call in calls {
                out.push(self.spawn_one(call, parent_carrier, sink, parent_task_id).await);
            }
            return out;
        }

        let semaphore = Semaphore::new(self.concurrency);
        let indexed: Vec<(usize, CoreToolResult)> = stream::iter(calls.iter().enumerate())
            .map(|(idx, call)| {
                let semaphore = &semaphore;
                async move {
                    let _permit = semaphore.acquire().await.expect("semaphore never closed");
                    let result = self.spawn_one(call, parent_carrier, sink, parent_task_id).await;
                    (idx, result)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut ordered: Vec<Option<CoreToolResult>> = (0..calls.len()).map(|_| None).collect();
        for (idx, result) in indexed {
            ordered[idx] = Some(result);
        }
        ordered.into_iter().map(|r| r.expect("every call produced a result")).collect()
    }

    async fn spawn_one(
        &self,
        call: &ToolCall,
        parent_carrier: &Carrier,
        sink: &dyn EventSink,
        parent_task_id: &str,
    ) -> CoreToolResult {
        if parent_carrier.depth() >= self.max_depth {
            return CoreToolResult::failed(
                call.id.clone(),
                &call.name,
                format!("maximum sub-agent recursion depth ({}) reached", self.max_depth),
            );
        }

        let args: Value = serde_json::from_str(&call.arguments).unwrap_or_else(|_| json!({}));
        let task = match args.get("task").and_then(|v| v.as_str()) {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => return CoreToolResult::failed(call.id.clone(), &call.name, "'task' is required"),
        };
        let purpose = args.get("purpose").and_then(|v| v.as_str()).unwrap_or(&task).to_string();
        let max_iterations = args
            .get("max_iterations")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(50);
        let allowed_tools: Option<Vec<String>> = args.get("allowed_tools").and_then(|v| v.as_array()).map(|arr| {
            arr.iter().filter_map(|v| v.as_str().map(String::from)).collect()
        });

        let child_session = agentic_core::ids::new_session_id();
        let child_carrier = parent_carrier.derive_child(child_session.clone());
        let child_task_id = child_carrier.ids().task_id.clone();
        let name = self.registry.register(&purpose, &child_session, None);

        sink.emit(AgentEvent::SubAgentStart {
            task_id: parent_task_id.to_string(),
            child_task_id: child_task_id.clone(),
            purpose: purpose.clone(),
        })
        .await;

        let tool_registry: Arc<ToolRegistry> = match &allowed_tools {
            Some(names) => {
                let refs: Vec<&str> = names.iter().map(String::as_str).collect();
                Arc::new(agentic_tools::create_policy_registry(&self.workspace_root, &refs))
            }
            None => Arc::new(agentic_tools::create_subagent_registry(&self.workspace_root)),
        };

        let mut ctx = TaskExecutionContext::new(
            child_task_id.clone(),
            child_session.clone(),
            task,
            self.workspace_root.clone(),
        );
        ctx.parent_task_id = Some(parent_task_id.to_string());
        ctx.config.max_iterations = max_iterations;
        ctx.config.model = self.model.clone();

        let context_manager = ContextManager::new(self.context_settings.clone(), true);
        let executor = Executor::new(
            self.provider.clone(),
            tool_registry,
            context_manager,
            self.summarizer.clone(),
        );

        let fut = executor.process_task(&mut ctx, &child_carrier, sink, None);
        let outcome = tokio::time::timeout(
            self.task_timeout,
            std::panic::AssertUnwindSafe(fut).catch_unwind(),
        )
        .await;

        match outcome {
            Ok(Ok(result)) => {
                self.registry.mark_complete(&name, &result.answer, result.total_tokens);
                sink.emit(AgentEvent::SubAgentComplete {
                    task_id: parent_task_id.to_string(),
                    child_task_id,
                    success: result.success,
                })
                .await;
                if result.success {
                    CoreToolResult::ok(call.id.clone(), &call.name, result.answer)
                } else {
                    CoreToolResult::failed(call.id.clone(), &call.name, result.answer)
                }
            }
            Ok(Err(panic_payload)) => {
                let message = panic_message(&panic_payload);
                self.registry.mark_failed(&name, &message);
                warn!(name = %name, %message, "sub-agent panicked");
                sink.emit(AgentEvent::SubAgentPanicRecovery {
                    task_id: parent_task_id.to_string(),
                    child_task_id: child_task_id.clone(),
                })
                .await;
                CoreToolResult::failed(call.id.clone(), &call.name, format!("sub-agent panicked: {message}"))
            }
            Err(_elapsed) => {
                let message = format!("sub-agent timed out after {:?}", self.task_timeout);
                self.registry.mark_failed(&name, &message);
                sink.emit(AgentEvent::SubAgentError {
                    task_id: parent_task_id.to_string(),
                    child_task_id,
                    error: message.clone(),
                })
                .await;
                CoreToolResult::failed(call.id.clone(), &call.name, message)
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Schema-only registration of the `spawn_subagent` tool name: the executor
/// intercepts calls to this name before they reach the ordinary invoker path
/// (the multi-call-in-one-iteration concurrency decision needs visibility
/// across the whole batch, which a single `Tool::execute` never has).
/// `execute` below only runs if something bypasses that interception.
pub struct SpawnSubagentTool;

#[async_trait::async_trait]
impl Tool for SpawnSubagentTool {
    fn name(&self) -> &str {
        "spawn_subagent"
    }

    fn description(&self) -> &str {
        "Delegate a subtask to an isolated sub-agent with its own session and tool schema."
    }

    fn prompt(&self) -> &str {
        "Use spawn_subagent to delegate focused, self-contained subtasks to a child agent. \
         Provide 'task' (what the child should do) and optionally 'purpose' (a short label), \
         'max_iterations', and 'allowed_tools' (a name allow-list). Emit multiple spawn_subagent \
         calls in the same turn to run them in parallel."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["task"],
            "properties": {
                "task": { "type": "string", "description": "The subtask to delegate" },
                "purpose": { "type": "string", "description": "Short label for the sub-agent" },
                "max_iterations": { "type": "integer", "description": "Override the default iteration cap" },
                "allowed_tools": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Restrict the sub-agent to this tool name set"
                }
            }
        })
    }

    async fn execute(&self, _args: Value) -> RegistryToolResult {
        RegistryToolResult::error("spawn_subagent must be dispatched through the executor, not invoked directly")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purpose_hash_name_format() {
        let name = purpose_hash_name("Fix slider CSS bug in dashboard");
        // Should have kebab-case prefix + 5-char hex suffix
        assert!(name.contains('-'));
        let parts: Vec<&str> = name.rsplitn(2, '-').collect();
        assert_eq!(parts[0].len(), 5);
        assert!(parts[0].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_purpose_hash_uniqueness() {
        // Same purpose should produce different names (time-based entropy)
        let name1 = purpose_hash_name("Fix slider CSS");
        std::thread::sleep(std::time::Duration::from_millis(1));
        let name2 = purpose_hash_name("Fix slider CSS");
        assert_ne!(name1, name2);
    }

    #[test]
    fn test_purpose_hash_truncation() {
        let name =
            purpose_hash_name("This is a very long purpose that exceeds twenty characters by far");
        // prefix should be at most 20 chars + dash + 5 hex = max 26 total
        let parts: Vec<&str> = name.rsplitn(2, '-').collect();
        assert!(parts[1].len() <= 20);
    }

    #[test]
    fn test_registry_register_and_query() {
        let registry = SubagentRegistry::new();
        let name = registry.register("Fix slider CSS", "session-1", None);

        let info = registry.query(&name).unwrap();
        assert_eq!(info.purpose, "Fix slider CSS");
        assert_eq!(info.status, SubagentStatus::Running);
        assert!(info.children.is_empty());
    }

    #[test]
    fn test_registry_pause_resume() {
        let registry = SubagentRegistry::new();
        let name = registry.register("Fix slider", "session-1", None);

        assert!(!registry.is_paused(&name));
        registry.pause(&name).unwrap();
        assert!(registry.is_paused(&name));
        assert_eq!(
            registry.query(&name).unwrap().status,
            SubagentStatus::Paused
        );

        registry.resume(&name).unwrap();
        assert!(!registry.is_paused(&name));
        assert_eq!(
            registry.query(&name).unwrap().status,
            SubagentStatus::Running
        );
    }

    #[test]
    fn test_registry_kill() {
        let registry = SubagentRegistry::new();
        let name = registry.register("Fix slider", "session-1", None);

        registry.kill(&name).unwrap();
        assert!(registry.is_killed(&name));
        assert_eq!(
            registry.query(&name).unwrap().status,
            SubagentStatus::Killed
        );
    }

    #[test]
    fn test_recursive_pause() {
        let registry = SubagentRegistry::new();
        let parent = registry.register("Parent task", "session-1", None);
        let child = registry.register("Child task", "session-2", Some(&parent));

        registry.pause(&parent).unwrap();
        assert!(registry.is_paused(&parent));
        assert!(registry.is_paused(&child));
    }

    #[test]
    fn test_registry_list() {
        let registry = SubagentRegistry::new();
        registry.register("Task A", "session-1", None);
        registry.register("Task B", "session-2", None);

        let list = registry.list();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_mark_complete() {
        let registry = SubagentRegistry::new();
        let name = registry.register("Fix bug", "session-1", None);

        registry.mark_complete(&name, "Fixed the bug successfully", 1500);
        let info = registry.query(&name).unwrap();
        assert_eq!(info.status, SubagentStatus::Complete);
        assert_eq!(info.tokens, 1500);
    }

    #[test]
    fn test_find_by_prefix() {
        let registry = SubagentRegistry::new();
        let name = registry.register("Fix slider CSS", "session-1", None);

        let found = registry.find_by_prefix("fix-slider");
        assert!(found.is_some());
        assert_eq!(found.unwrap(), name);
    }
}
