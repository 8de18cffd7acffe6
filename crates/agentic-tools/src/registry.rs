//! Tool registry (C2): static built-ins, dynamic lazily-resolved providers,
//! and MCP-provided tools merged in after an async initializer completes.
//!
//! Reads (`get`, `list_definitions`) are lock-free via `DashMap`; writes
//! (`register_static`, `register_dynamic`, `refresh_from_mcp`) take the
//! map's per-shard locks only for the duration of the insert, so concurrent
//! readers are never blocked behind a single writer for long.

use agentic_llm::LlmTool;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// The tool name(s) reserved for sub-agent delegation. In sub-agent mode
/// these are never surfaced, even if a caller registers a tool under one of
/// these names by mistake — structural absence, not runtime filtering.
pub const SUBAGENT_TOOL_NAMES: &[&str] = &["spawn_subagent"];

#[derive(Clone, Debug)]
pub enum ToolResult {
    Text(String),
    Json(Value),
    Error(String),
}

impl ToolResult {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }
    pub fn error(s: impl Into<String>) -> Self {
        Self::Error(s.into())
    }

    pub fn to_content_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Json(v) => serde_json::to_string_pretty(v).unwrap_or_default(),
            Self::Error(e) => format!("Error: {}", e),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// The Tool trait — implement this to add a new capability.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name (e.g. "bash", "read", "glob").
    fn name(&self) -> &str;

    /// Human-readable description sent to the LLM.
    fn description(&self) -> &str;

    /// System prompt fragment for this tool (injected into LLM context).
    fn prompt(&self) -> &str {
        ""
    }

    /// JSON Schema for input parameters.
    fn input_schema(&self) -> Value;

    /// Whether this tool only reads state (no side effects).
    fn is_read_only(&self) -> bool {
        false
    }

    /// Whether this tool is currently enabled.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: Value) -> ToolResult;

    /// Execute with cancellation support. Default: race execute() against cancellation.
    /// Tools that manage child processes (like BashTool) should override this to
    /// kill the process on cancellation.
    async fn execute_cancellable(&self, args: Value, cancel: CancellationToken) -> ToolResult {
        tokio::select! {
            result = self.execute(args) => result,
            _ = cancel.cancelled() => ToolResult::text("[cancelled]"),
        }
    }

    /// Convert to the LLM tool definition format.
    fn to_llm_tool(&self) -> LlmTool {
        LlmTool {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// A tool resolved lazily on first use rather than eagerly constructed.
/// `available` is checked cheaply on every `list_definitions` call; `get`
/// does the (possibly expensive) construction once availability holds.
#[async_trait::async_trait]
pub trait DynamicToolProvider: Send + Sync {
    fn name(&self) -> &str;
    fn available(&self) -> bool;
    async fn get(&self) -> Option<Arc<dyn Tool>>;
}

pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
    dynamic: DashMap<String, Arc<dyn DynamicToolProvider>>,
    /// When true, `SUBAGENT_TOOL_NAMES` are structurally absent from every
    /// read operation regardless of what has been registered (§4.2, §4.6).
    sub_agent_mode: bool,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
            dynamic: DashMap::new(),
            sub_agent_mode: false,
        }
    }

    /// A registry materialized for a sub-agent: the sub-agent tool is
    /// structurally absent from every read path, regardless of whether the
    /// caller happens to register something under that name (§4.6).
    pub fn new_for_subagent() -> Self {
        Self {
            tools: DashMap::new(),
            dynamic: DashMap::new(),
            sub_agent_mode: true,
        }
    }

    pub fn is_sub_agent_mode(&self) -> bool {
        self.sub_agent_mode
    }

    fn is_hidden(&self, name: &str) -> bool {
        self.sub_agent_mode && SUBAGENT_TOOL_NAMES.contains(&name)
    }

    /// Register a static tool. Idempotent by name; a later registration
    /// replaces an earlier one under the same name (last wins, logged).
    pub fn register_static(&self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            warn!(tool = %name, "replacing previously registered tool");
        }
        self.tools.insert(name, Arc::new(tool));
    }

    /// Back-compat alias matching the teacher's original method name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_static(tool);
    }

    /// Register a dynamic provider: a tool that resolves lazily and may
    /// become unavailable again (e.g. an MCP server that restarts).
    pub fn register_dynamic(&self, provider: impl DynamicToolProvider + 'static) {
        self.dynamic.insert(provider.name().to_string(), Arc::new(provider));
    }

    pub fn remove(&self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    /// Resolve a tool by name: checks static tools first, then dynamic
    /// providers (if available). Returns `None` rather than the spec's
    /// `ToolNotFound` directly — callers (the invoker) convert absence into
    /// the typed error at the call site where the call-id is known.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        if self.is_hidden(name) {
            return None;
        }
        if let Some(tool) = self.tools.get(name) {
            return Some(tool.clone());
        }
        if let Some(provider) = self.dynamic.get(name) {
            if provider.available() {
                return provider.get().await;
            }
        }
        None
    }

    pub async fn execute(&self, name: &str, args: Value) -> ToolResult {
        match self.get(name).await {
            Some(tool) if tool.is_enabled() => tool.execute(args).await,
            Some(_) => ToolResult::Error(format!("Tool '{}' is disabled", name)),
            None => ToolResult::Error(format!("Tool not found: {}", name)),
        }
    }

    /// Execute a tool with cancellation support.
    pub async fn execute_cancellable(
        &self,
        name: &str,
        args: Value,
        cancel: CancellationToken,
    ) -> ToolResult {
        match self.get(name).await {
            Some(tool) if tool.is_enabled() => tool.execute_cancellable(args, cancel).await,
            Some(_) => ToolResult::Error(format!("Tool '{}' is disabled", name)),
            None => ToolResult::Error(format!("Tool not found: {}", name)),
        }
    }

    /// Get LLM tool definitions for all enabled tools, static and dynamic
    /// (when available), omitting the sub-agent tool in sub-agent mode.
    /// Call `refresh_from_mcp` beforehand to pick up late-initializing
    /// MCP servers (§4.2).
    pub async fn list_definitions(&self) -> Vec<LlmTool> {
        let mut defs: Vec<LlmTool> = self
            .tools
            .iter()
            .filter(|e| e.value().is_enabled() && !self.is_hidden(e.key()))
            .map(|e| e.value().to_llm_tool())
            .collect();

        for entry in self.dynamic.iter() {
            let name = entry.key();
            if self.is_hidden(name) || !entry.value().available() {
                continue;
            }
            if let Some(tool) = entry.value().get().await {
                if tool.is_enabled() {
                    defs.push(tool.to_llm_tool());
                }
            }
        }

        defs
    }

    /// Merge freshly-initialized MCP tools into the dynamic provider set.
    /// Safe to call repeatedly; later calls replace earlier entries for the
    /// same tool name (consistent with `register_static`'s last-wins rule).
    pub fn refresh_from_mcp(&self, tools: Vec<Arc<dyn Tool>>) {
        for tool in tools {
            let name = tool.name().to_string();
            self.dynamic.insert(name, Arc::new(StaticProvider(tool)));
        }
    }

    /// Get system prompt fragments from all enabled static tools.
    pub fn combined_prompts(&self) -> String {
        self.tools
            .iter()
            .filter(|e| e.value().is_enabled() && !self.is_hidden(e.key()))
            .map(|e| e.value().prompt().to_string())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn list(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| !self.is_hidden(k))
            .collect()
    }

    /// List only read-only tools.
    pub fn list_read_only(&self) -> Vec<String> {
        self.tools
            .iter()
            .filter(|e| e.value().is_read_only() && !self.is_hidden(e.key()))
            .map(|e| e.key().clone())
            .collect()
    }
}

/// Wraps an already-resolved tool (e.g. from an MCP server) as a
/// `DynamicToolProvider` whose `get` is a cheap clone.
struct StaticProvider(Arc<dyn Tool>);

#[async_trait::async_trait]
impl DynamicToolProvider for StaticProvider {
    fn name(&self) -> &str {
        self.0.name()
    }
    fn available(&self) -> bool {
        self.0.is_enabled()
    }
    async fn get(&self) -> Option<Arc<dyn Tool>> {
        Some(self.0.clone())
    }
}
