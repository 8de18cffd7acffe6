//! Subagent lifecycle tool — list, query, pause, resume, kill running sub-agents.
//!
//! Exposes the sub-agent pool (owned by the agent crate's dispatcher) to the
//! LLM so a running task can inspect or steer its own children. The control
//! surface is a trait so this crate never depends on `agentic-agent`.

use crate::registry::{Tool, ToolResult};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared handle to the sub-agent pool for lifecycle management.
pub type SubagentRegistryHandle = Arc<dyn SubagentControl>;

/// Lifecycle control surface for the running sub-agent pool. Decouples the
/// tool layer from the concrete dispatcher in `agentic-agent`.
#[async_trait::async_trait]
pub trait SubagentControl: Send + Sync {
    /// Register a new sub-agent, returns its display name.
    fn register(&self, purpose: &str, session_id: &str, parent: Option<&str>) -> String;
    /// Mark complete with output and tokens.
    fn mark_complete(&self, name: &str, output: &str, tokens: usize);
    /// Mark failed.
    fn mark_failed(&self, name: &str, error: &str);
    /// Check if paused.
    fn is_paused(&self, name: &str) -> bool;
    /// Check if killed.
    fn is_killed(&self, name: &str) -> bool;
    /// Wait on the pause gate (blocks until resumed or killed).
    async fn wait_for_resume(&self, name: &str);
    /// Pause a sub-agent (recursive to its children).
    fn pause(&self, name: &str) -> Result<(), String>;
    /// Resume a sub-agent (recursive to its children).
    fn resume(&self, name: &str) -> Result<(), String>;
    /// Kill a sub-agent (recursive to its children).
    fn kill(&self, name: &str) -> Result<(), String>;
    /// Query sub-agent info.
    fn query(&self, name: &str) -> Result<SubagentInfoSnapshot, String>;
    /// List all sub-agents.
    fn list_all(&self) -> Vec<SubagentInfoSnapshot>;
    /// Find by prefix.
    fn find_by_prefix(&self, prefix: &str) -> Option<String>;
}

/// Snapshot of sub-agent info (decoupled from the agent crate's own types).
#[derive(Debug, Clone)]
pub struct SubagentInfoSnapshot {
    pub name: String,
    pub purpose: String,
    pub status: String,
    pub tokens: usize,
    pub elapsed_ms: u64,
    pub last_output: String,
    pub children: Vec<String>,
    pub parent: Option<String>,
}

impl std::fmt::Display for SubagentInfoSnapshot {
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

pub struct SubagentTool {
    registry: Arc<RwLock<Option<SubagentRegistryHandle>>>,
}

impl SubagentTool {
    pub fn new(registry: Arc<RwLock<Option<SubagentRegistryHandle>>>) -> Self {
        Self { registry }
    }
}

#[async_trait::async_trait]
impl Tool for SubagentTool {
    fn name(&self) -> &str {
        "subagent"
    }

    fn description(&self) -> &str {
        "Manage sub-agent lifecycles: list, query, pause, resume, or kill running sub-agents."
    }

    fn prompt(&self) -> &str {
        "Use the subagent tool to control child agents:\n\
         - list: show all sub-agents with status\n\
         - query <name>: get detailed status of a specific sub-agent\n\
         - pause <name>: suspend a running sub-agent (recursive to children)\n\
         - resume <name>: resume a paused sub-agent (recursive to children)\n\
         - kill <name>: terminate a sub-agent (recursive to children)\n\n\
         Prefix matching works on names."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["command"],
            "properties": {
                "command": {
                    "type": "string",
                    "enum": ["list", "query", "pause", "resume", "kill"],
                    "description": "Lifecycle command"
                },
                "name": {
                    "type": "string",
                    "description": "Sub-agent name or prefix (required for query/pause/resume/kill)"
                }
            }
        })
    }

    fn is_read_only(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let command = match args.get("command").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return ToolResult::error("'command' is required"),
        };

        let guard = self.registry.read().await;
        let registry = match guard.as_ref() {
            Some(r) => r,
            None => return ToolResult::error("Sub-agent registry not initialized"),
        };

        match command {
            "list" => {
                let agents = registry.list_all();
                if agents.is_empty() {
                    ToolResult::text("No sub-agents running.")
                } else {
                    let output: Vec<String> = agents.iter().map(|a| a.to_string()).collect();
                    ToolResult::text(output.join("\n"))
                }
            }

            "query" | "pause" | "resume" | "kill" => {
                let name_input = match args.get("name").and_then(|v| v.as_str()) {
                    Some(n) => n,
                    None => {
                        return ToolResult::error(format!("'name' is required for '{}'", command))
                    }
                };

                let resolved_name = if registry.query(name_input).is_ok() {
                    name_input.to_string()
                } else {
                    match registry.find_by_prefix(name_input) {
                        Some(n) => n,
                        None => {
                            return ToolResult::error(format!(
                                "Sub-agent '{}' not found",
                                name_input
                            ))
                        }
                    }
                };

                match command {
                    "query" => match registry.query(&resolved_name) {
                        Ok(info) => ToolResult::text(info.to_string()),
                        Err(e) => ToolResult::error(e),
                    },
                    "pause" => match registry.pause(&resolved_name) {
                        Ok(()) => ToolResult::text(format!("Paused: {}", resolved_name)),
                        Err(e) => ToolResult::error(e),
                    },
                    "resume" => match registry.resume(&resolved_name) {
                        Ok(()) => ToolResult::text(format!("Resumed: {}", resolved_name)),
                        Err(e) => ToolResult::error(e),
                    },
                    "kill" => match registry.kill(&resolved_name) {
                        Ok(()) => ToolResult::text(format!("Killed: {}", resolved_name)),
                        Err(e) => ToolResult::error(e),
                    },
                    _ => unreachable!(),
                }
            }

            _ => ToolResult::error(format!("Unknown command: {}", command)),
        }
    }
}
