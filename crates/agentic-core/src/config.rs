//! `agentic.toml` configuration — loaded once at startup and handed down as
//! an `Arc` to the CLI/gateway entry points. Pure types and parsing only;
//! nothing here watches the filesystem or owns global state.

use crate::types::{AuthConfig, BindMode, GatewayConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level `agentic.toml` shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentFileConfig {
    pub agent: AgentSettings,
    pub context: ContextSettings,
    pub subagent: SubAgentSettings,
    pub gateway: GatewaySettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub model: String,
    pub max_tokens: usize,
    pub max_iterations: usize,
    pub temperature: f32,
    pub workspace: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: "claude-opus-4-6-20250929".to_string(),
            max_tokens: 8192,
            max_iterations: 25,
            temperature: 0.7,
            workspace: None,
        }
    }
}

/// Compression thresholds (§4.4 table): outer executor vs sub-agent.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    pub outer_token_limit: usize,
    pub outer_message_limit: usize,
    pub subagent_token_limit: usize,
    pub subagent_message_limit: usize,
    pub subagent_hard_force_tokens: usize,
    pub subagent_hard_force_messages: usize,
    /// Fraction of the per-call max that triggers emergency pre-call
    /// compression even if ordinary thresholds weren't met.
    pub emergency_fraction: f32,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            outer_token_limit: 100_000,
            outer_message_limit: 15,
            subagent_token_limit: 50_000,
            subagent_message_limit: 10,
            subagent_hard_force_tokens: 30_000,
            subagent_hard_force_messages: 8,
            emergency_fraction: 0.8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubAgentSettings {
    pub default_max_iterations: usize,
    pub pool_concurrency: usize,
    pub task_timeout_secs: u64,
    /// Total sub-agent recursion depth allowed, including the structural
    /// level-1 bound (§9 Open Question; default resolves to 2).
    pub max_depth: u32,
}

impl Default for SubAgentSettings {
    fn default() -> Self {
        Self {
            default_max_iterations: 50,
            pool_concurrency: 3,
            task_timeout_secs: 120,
            max_depth: 2,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub auth_mode: Option<String>,
    pub token: Option<String>,
}

impl GatewaySettings {
    pub fn to_gateway_config(&self) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = &self.bind {
            config.bind = match bind.as_str() {
                "loopback" | "localhost" | "127.0.0.1" => BindMode::Loopback,
                _ => BindMode::Lan,
            };
        }
        config.auth = AuthConfig {
            mode: match self.auth_mode.as_deref() {
                Some("none") => crate::types::AuthMode::None,
                _ => crate::types::AuthMode::Token,
            },
            token: self.token.clone(),
        };
        config
    }
}

impl AgentFileConfig {
    /// Load from a specific path; missing or malformed files fall back to
    /// defaults rather than failing startup.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Discover `./agentic.toml`, falling back to `~/.agentic/agentic.toml`.
    pub fn discover() -> Self {
        let cwd_path = PathBuf::from("agentic.toml");
        if cwd_path.exists() {
            return Self::load(&cwd_path);
        }
        Self::load(&Self::default_path())
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".agentic")
            .join("agentic.toml")
    }

    pub fn workspace(&self) -> PathBuf {
        self.agent
            .workspace
            .as_ref()
            .map(|w| expand_tilde(w))
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_default())
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
