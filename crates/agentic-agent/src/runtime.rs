//! Compatibility facade over the executor (C5): a session-oriented "run one
//! turn" API for callers — the gateway, a CLI — that don't want to build a
//! [`TaskExecutionContext`] and drive [`Executor::process_task`] themselves.
//!
//! `AgentRuntime` owns the long-lived pieces (provider, tool registry,
//! session registry, sub-agent spawner) and wires them into one [`Executor`]
//! per construction. A turn replays the session's persisted transcript into a
//! fresh context, runs it to completion, and folds whatever the executor
//! appended back into the session.

use crate::context::{AiSummarizer, ContextManager, LlmSummarizer};
use crate::events::{AgentEvent, ChannelEventSink};
use crate::executor::Executor;
use crate::session::{Session, SessionRegistry};
use crate::subagent::SubAgentSpawner;
use agentic_core::config::{ContextSettings, SubAgentSettings};
use agentic_core::{Carrier, Message, Role, TaskConfig, TaskExecutionContext};
use agentic_llm::{AnthropicProvider, LlmProvider, LlmTool};
use agentic_tools::tools::subagent_tool::{SubagentControl, SubagentTool};
use agentic_tools::ToolRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

pub use crate::session::SessionKey;

/// Static configuration an `AgentRuntime` is built from. Compression and
/// sub-agent tuning are the same `agentic_core::config` structs that
/// `agentic.toml` deserializes into (§4.4, §4.6), so a caller loading
/// `AgentFileConfig` can hand its sections straight through.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub default_model: String,
    pub max_tokens: usize,
    pub max_tool_iterations: usize,
    pub temperature: f32,
    pub system_prompt: Option<String>,
    pub workspace_root: PathBuf,
    pub context: ContextSettings,
    pub subagent: SubAgentSettings,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_model: "claude-opus-4-6-20250929".to_string(),
            max_tokens: 8192,
            max_tool_iterations: 25,
            temperature: 0.7,
            system_prompt: None,
            workspace_root: std::env::current_dir().unwrap_or_default(),
            context: ContextSettings::default(),
            subagent: SubAgentSettings::default(),
        }
    }
}

/// The running agent: one provider, one tool registry, one session registry,
/// one executor wired with a sub-agent spawner.
pub struct AgentRuntime {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    sessions: Arc<SessionRegistry>,
    executor: Arc<Executor>,
    config: AgentConfig,
}

impl AgentRuntime {
    pub fn new(api_key: &str, tools: ToolRegistry, config: AgentConfig) -> Self {
        Self::with_provider(Arc::new(AnthropicProvider::new(api_key)), tools, config)
    }

    pub fn with_provider(provider: Arc<dyn LlmProvider>, tools: ToolRegistry, config: AgentConfig) -> Self {
        let tools = Arc::new(tools);

        let summarizer: Arc<dyn AiSummarizer> =
            Arc::new(LlmSummarizer::new(provider.clone(), config.default_model.clone()));
        let context = ContextManager::new(config.context.clone(), false);

        let spawner = Arc::new(SubAgentSpawner::new(
            provider.clone(),
            config.workspace_root.clone(),
            config.default_model.clone(),
            config.context.clone(),
            Some(summarizer.clone()),
            &config.subagent,
        ));

        // Expose the spawner's lifecycle registry to the LLM through the
        // `subagent` tool, so a running task can list/pause/resume/kill its
        // own children (§4.6's "addressable by parent agent").
        let control: Arc<dyn SubagentControl> = spawner.registry();
        let handle = Arc::new(RwLock::new(Some(control)));
        tools.register_static(SubagentTool::new(handle));

        let executor = Arc::new(
            Executor::new(provider.clone(), tools.clone(), context, Some(summarizer)).with_spawner(spawner),
        );

        Self { provider, tools, sessions: Arc::new(SessionRegistry::new()), executor, config }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub async fn tool_definitions(&self) -> Vec<LlmTool> {
        self.tools.list_definitions().await
    }

    pub fn workspace(&self) -> &Path {
        &self.config.workspace_root
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn get_session(&self, key: &SessionKey) -> Arc<Session> {
        self.sessions
            .create_with_ctx(key, self.config.system_prompt.as_deref(), &self.config.workspace_root)
    }

    /// Run one turn to completion, uncancellable from the outside.
    pub async fn run_turn(
        &self,
        session_key: &SessionKey,
        user_message: &str,
        event_tx: mpsc::Sender<AgentEvent>,
    ) -> Result<(), String> {
        self.run_turn_cancellable(session_key, user_message, event_tx, CancellationToken::new()).await
    }

    /// Run one turn to completion. `cancel` is bridged onto the carrier's own
    /// token so an external abort (the gateway's `chat.abort`) reaches every
    /// tool call and sub-agent this turn spawns, not just the model stream.
    pub async fn run_turn_cancellable(
        &self,
        session_key: &SessionKey,
        user_message: &str,
        event_tx: mpsc::Sender<AgentEvent>,
        cancel: CancellationToken,
    ) -> Result<(), String> {
        let session = self.get_session(session_key);
        session.add_user_message(user_message).await;

        let mut transcript = session.get_transcript().await;
        if let Some(prompt) = session.system_prompt().await {
            if !transcript.iter().any(|m| matches!(m.role, Role::System)) {
                transcript.insert(0, Message::system(prompt));
            }
        }
        let baseline = transcript.len();

        let model = session.model().await.unwrap_or_else(|| self.config.default_model.clone());
        let task_id = agentic_core::ids::new_task_id();

        let mut ctx = TaskExecutionContext::new(
            task_id,
            session_key.as_str().to_string(),
            user_message.to_string(),
            self.config.workspace_root.clone(),
        );
        ctx.transcript = transcript;
        ctx.config = TaskConfig {
            model,
            max_tokens: self.config.max_tokens,
            max_iterations: self.config.max_tool_iterations,
            temperature: self.config.temperature,
        };

        let carrier = Carrier::new(session_key.as_str().to_string());
        let internal_cancel = carrier.cancellation_token();
        let bridge = tokio::spawn(async move {
            cancel.cancelled().await;
            internal_cancel.cancel();
        });

        let sink = ChannelEventSink::new(event_tx);
        let result = self.executor.process_task(&mut ctx, &carrier, &sink, None).await;
        bridge.abort();

        // Fold whatever the executor appended onto the end of the context's
        // transcript back into the persisted session, replaying through the
        // same `Session::add_*` calls a live caller would have used so the
        // `.ctx` file stays append-only and in sync with the in-memory copy.
        let appended = if ctx.transcript.len() > baseline {
            ctx.transcript.split_off(baseline)
        } else {
            Vec::new()
        };
        for message in appended {
            match message.role {
                Role::Assistant => match message.tool_calls {
                    Some(calls) if !calls.is_empty() => {
                        session.add_assistant_with_tool_calls(&message.content, calls).await;
                    }
                    _ => session.add_assistant_text(&message.content).await,
                },
                Role::Tool => {
                    let call_id = message.tool_call_id.clone().unwrap_or_default();
                    let tool_name = message.tool_name.clone().unwrap_or_default();
                    // The transcript message only carries the result's
                    // content, not whether it was an error — the executor
                    // folds error text into `content` either way, so replay
                    // with `is_error: false` and let the `.ctx` reader see
                    // the content as-is.
                    session.add_tool_result(&call_id, &tool_name, &message.content, false).await;
                }
                Role::User => session.add_user_message(&message.content).await,
                Role::System => {}
            }
        }

        if !result.success && !matches!(result.stop_reason, agentic_core::StopReason::Cancelled) {
            return Err(result.answer);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentic_llm::{LlmError, LlmRequest, LlmResult, LlmStream};
    use agentic_tools::registry::ToolRegistry as Registry;

    struct OneShotProvider;

    #[async_trait::async_trait]
    impl LlmProvider for OneShotProvider {
        fn name(&self) -> &str {
            "one-shot"
        }
        fn models(&self) -> &[&str] {
            &["test-model"]
        }
        async fn complete_stream(
            &self,
            _request: LlmRequest,
            _cancel: Option<CancellationToken>,
        ) -> LlmResult<LlmStream> {
            let deltas = vec![
                Ok(agentic_llm::StreamDelta::Text("ok".into())),
                Ok(agentic_llm::StreamDelta::Done { stop_reason: Some("end_turn".into()), usage: None }),
            ];
            Ok(Box::pin(futures::stream::iter(deltas)))
        }
    }

    struct AlwaysFailsProvider;

    #[async_trait::async_trait]
    impl LlmProvider for AlwaysFailsProvider {
        fn name(&self) -> &str {
            "always-fails"
        }
        fn models(&self) -> &[&str] {
            &["test-model"]
        }
        async fn complete_stream(
            &self,
            _request: LlmRequest,
            _cancel: Option<CancellationToken>,
        ) -> LlmResult<LlmStream> {
            Err(LlmError::AuthFailed("bad key".into()))
        }
    }

    fn test_config() -> AgentConfig {
        AgentConfig {
            default_model: "test-model".to_string(),
            workspace_root: std::env::temp_dir(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn run_turn_persists_user_and_assistant_messages_to_the_session() {
        let runtime = AgentRuntime::with_provider(Arc::new(OneShotProvider), Registry::new(), test_config());
        let key = SessionKey::new("s1");
        let (tx, _rx) = crate::events::event_channel(64);

        runtime.run_turn(&key, "hello", tx).await.unwrap();

        let session = runtime.sessions().get(&key).unwrap();
        let transcript = session.get_transcript().await;
        assert!(transcript.iter().any(|m| matches!(m.role, Role::User) && m.content == "hello"));
        assert!(transcript.iter().any(|m| matches!(m.role, Role::Assistant) && m.content == "ok"));
    }

    #[tokio::test]
    async fn run_turn_surfaces_fatal_model_errors() {
        let runtime = AgentRuntime::with_provider(Arc::new(AlwaysFailsProvider), Registry::new(), test_config());
        let key = SessionKey::new("s1");
        let (tx, _rx) = crate::events::event_channel(64);

        let result = runtime.run_turn(&key, "hello", tx).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn tool_definitions_includes_the_builtin_subagent_tool() {
        let runtime = AgentRuntime::with_provider(Arc::new(OneShotProvider), Registry::new(), test_config());
        let defs = runtime.tool_definitions().await;
        assert!(defs.iter().any(|d| d.name == "subagent"));
    }
}
