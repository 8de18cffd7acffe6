//! Agentic Tools — modular tool implementations (C2)
//!
//! Each tool is a self-contained file in src/tools/.
//! To add a tool: create the file, implement the Tool trait, register below.
//! To remove a tool: delete the file, remove from tools/mod.rs and the registry below.

pub mod mcp;
pub mod registry;
pub mod tools;

pub use mcp::{McpManager, McpServerConfig};
pub use registry::{DynamicToolProvider, Tool, ToolRegistry, ToolResult, SUBAGENT_TOOL_NAMES};
pub use tools::subagent_tool::{SubagentControl, SubagentInfoSnapshot, SubagentRegistryHandle, SubagentTool};

use std::path::Path;

/// Build the default tool registry for an outer (non-sub-agent) task.
///
/// Edit this function to add or remove tools from the agent. The sub-agent
/// lifecycle tool is wired in separately by the agent crate once the pool's
/// control handle exists, via [`ToolRegistry::register_static`].
pub fn create_default_registry(workspace_root: impl AsRef<Path>) -> ToolRegistry {
    let registry = ToolRegistry::new();
    register_builtins(&registry, workspace_root.as_ref());
    registry
}

/// Build a registry for a sub-agent: the `spawn_subagent` tool is
/// structurally absent regardless of what callers register afterward
/// (§4.6 — depth is bounded by construction, not by a runtime check).
pub fn create_subagent_registry(workspace_root: impl AsRef<Path>) -> ToolRegistry {
    let registry = ToolRegistry::new_for_subagent();
    register_builtins(&registry, workspace_root.as_ref());
    registry
}

fn register_builtins(registry: &ToolRegistry, root: &Path) {
    registry.register_static(tools::read::ReadTool::new(root));
    registry.register_static(tools::glob::GlobTool::new(root));
    registry.register_static(tools::grep::GrepTool::new(root));

    registry.register_static(tools::write::WriteTool::new(root));
    registry.register_static(tools::edit::EditTool::new(root));
    registry.register_static(tools::bash::BashTool::new(root));
}

/// Build a policy-scoped tool registry.
///
/// Only registers tools whose names appear in `allowed_tools`. Used by
/// gateway deployments to enforce policy at the tool registration level:
/// if a tool isn't registered, the LLM never sees it and can't call it.
pub fn create_policy_registry(workspace_root: impl AsRef<Path>, allowed_tools: &[&str]) -> ToolRegistry {
    let registry = ToolRegistry::new();
    let root = workspace_root.as_ref();

    for name in allowed_tools {
        match *name {
            "read" => registry.register_static(tools::read::ReadTool::new(root)),
            "glob" => registry.register_static(tools::glob::GlobTool::new(root)),
            "grep" => registry.register_static(tools::grep::GrepTool::new(root)),
            "write" => registry.register_static(tools::write::WriteTool::new(root)),
            "edit" => registry.register_static(tools::edit::EditTool::new(root)),
            "bash" => registry.register_static(tools::bash::BashTool::new(root)),
            _ => tracing::warn!("Unknown tool in policy: {}", name),
        }
    }

    registry
}
