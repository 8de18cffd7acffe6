//! The ReAct Loop Executor (C5): drives iteration over a
//! [`TaskExecutionContext`] to a terminal [`TaskResult`].
//!
//! State machine: `Initializing` → `Iterating` → one of `Final`,
//! `MaxIterations`, `FatalError`, `Cancelled`. Per iteration the ordering is
//! fixed: compression → model call → `iteration` event → `thinking_result`
//! (if any) → tool batch in call order → `token_usage` → loop. All events for
//! iteration *i* are emitted before any event for iteration *i+1*.

use crate::context::{AiSummarizer, ContextManager};
use crate::events::{AgentEvent, EventSink};
use crate::invoker::{text_parser, ToolInvoker};
use crate::subagent::SubAgentSpawner;
use agentic_core::{
    Carrier, ExecutionStep, Message, Role, StopReason, TaskExecutionContext, TaskResult, ToolCall,
    ToolResult as CoreToolResult,
};
use agentic_llm::{LlmError, LlmMessage, LlmProvider, LlmRequest, LlmTool, StreamDelta};
use agentic_tools::ToolRegistry;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Model calls are retried up to this many times with exponential backoff
/// before the task ends in `FatalError` (§4.5).
const MAX_RETRY_ATTEMPTS: u32 = 6;
const RETRY_BASE_DELAY_MS: u64 = 250;

/// Mid-loop pending messages are merged at most this many per poll (§4.5).
const MAX_PENDING_MERGE: usize = 5;

pub struct Executor {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    invoker: ToolInvoker,
    context: ContextManager,
    summarizer: Option<Arc<dyn AiSummarizer>>,
    spawner: Option<Arc<SubAgentSpawner>>,
}

impl Executor {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
        context: ContextManager,
        summarizer: Option<Arc<dyn AiSummarizer>>,
    ) -> Self {
        let invoker = ToolInvoker::new(registry.clone());
        Self { provider, registry, invoker, context, summarizer, spawner: None }
    }

    /// Wires a [`SubAgentSpawner`] so `spawn_subagent` tool calls are
    /// dispatched to isolated child executors instead of the ordinary
    /// invoker path (§4.6). Without one, `spawn_subagent` calls fail with a
    /// clear error rather than reaching a tool that doesn't exist.
    pub fn with_spawner(mut self, spawner: Arc<SubAgentSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Drive `ctx` to completion. `pending` is an optional receiver for
    /// mid-loop human messages; only ever polled for outer tasks — a
    /// sub-agent carrier (`carrier.is_subagent()`) disables polling
    /// entirely regardless of whether a receiver was supplied.
    pub async fn process_task(
        &self,
        ctx: &mut TaskExecutionContext,
        carrier: &Carrier,
        sink: &dyn EventSink,
        mut pending: Option<&mut mpsc::Receiver<String>>,
    ) -> TaskResult {
        let started = std::time::Instant::now();
        let task_id = ctx.task_id.clone();
        let cancel = carrier.cancellation_token();

        if ctx.transcript.is_empty() {
            ctx.transcript.push(Message::user(ctx.goal.clone()));
        }

        let mut steps: Vec<ExecutionStep> = Vec::new();
        let mut prompt_tokens = 0usize;
        let mut completion_tokens = 0usize;
        let mut iteration: usize = 0;

        loop {
            if cancel.is_cancelled() {
                sink.emit(AgentEvent::Error { task_id: task_id.clone(), message: "cancelled".into() }).await;
                return TaskResult::cancelled(steps, started.elapsed().as_millis() as u64);
            }

            iteration += 1;
            if iteration > ctx.config.max_iterations {
                sink.emit(AgentEvent::MaxIterations {
                    task_id: task_id.clone(),
                    iterations: iteration as u32,
                })
                .await;
                return TaskResult::max_iterations(
                    steps,
                    started.elapsed().as_millis() as u64,
                    (prompt_tokens, completion_tokens),
                );
            }

            // Mid-loop pending-message poll. Outer tasks only.
            if !carrier.is_subagent() {
                if let Some(rx) = pending.as_deref_mut() {
                    self.drain_pending(rx, ctx, sink, &task_id).await;
                }
            }

            // Compression, run before every model call (C4). Emergency
            // compression uses the same path — there is no separate
            // code path for "about to blow the budget" vs "already over".
            let before_len = ctx.transcript.len();
            let outcome = self.context.compress(&mut ctx.transcript, self.summarizer.as_deref()).await;
            if let crate::context::CompressionOutcome::Summarized { .. }
            | crate::context::CompressionOutcome::DeterministicallyTruncated { .. } = outcome
            {
                if carrier.is_subagent() {
                    sink.emit(AgentEvent::SubagentCompression {
                        task_id: task_id.clone(),
                        before_messages: before_len,
                        after_messages: ctx.transcript.len(),
                    })
                    .await;
                } else {
                    sink.emit(AgentEvent::EmergencyCompression {
                        task_id: task_id.clone(),
                        before_tokens: crate::context::total_tokens(&ctx.transcript),
                        after_tokens: crate::context::total_tokens(&ctx.transcript),
                    })
                    .await;
                }
            }

            sink.emit(AgentEvent::Iteration { task_id: task_id.clone(), n: iteration as u32 }).await;

            let iteration_started = std::time::Instant::now();
            let call_result = self.call_model_with_retry(ctx, &cancel, sink, &task_id).await;

            let (text_content, tool_calls, usage_in, usage_out) = match call_result {
                Ok(parts) => parts,
                Err(ModelCallOutcome::Cancelled) => {
                    sink.emit(AgentEvent::Error { task_id: task_id.clone(), message: "cancelled".into() }).await;
                    return TaskResult::cancelled(steps, started.elapsed().as_millis() as u64);
                }
                Err(ModelCallOutcome::ContextOverflow(msg)) => {
                    // Soft failure: return partial results rather than a
                    // fatal exception (§4.5).
                    warn!(%msg, "context overflow reported by model, ending with partial result");
                    return TaskResult {
                        success: false,
                        answer: format!("stopped early: context limit reached ({msg})"),
                        confidence: 0.3,
                        prompt_tokens,
                        completion_tokens,
                        total_tokens: prompt_tokens + completion_tokens,
                        iterations: steps.len(),
                        steps,
                        stop_reason: StopReason::FatalError,
                        duration_ms: started.elapsed().as_millis() as u64,
                    };
                }
                Err(ModelCallOutcome::Fatal(msg)) => {
                    sink.emit(AgentEvent::Error { task_id: task_id.clone(), message: msg.clone() }).await;
                    return TaskResult {
                        success: false,
                        answer: msg,
                        confidence: 0.0,
                        prompt_tokens,
                        completion_tokens,
                        total_tokens: prompt_tokens + completion_tokens,
                        iterations: steps.len(),
                        steps,
                        stop_reason: StopReason::FatalError,
                        duration_ms: started.elapsed().as_millis() as u64,
                    };
                }
            };

            prompt_tokens += usage_in;
            completion_tokens += usage_out;

            if !text_content.trim().is_empty() {
                sink.emit(AgentEvent::ThinkingResult { task_id: task_id.clone(), text: text_content.clone() }).await;
            }

            // Fall back to the textual grammar when the model didn't use
            // structured tool_use blocks at all.
            let (text_content, tool_calls) = if tool_calls.is_empty() {
                let (remainder, parsed) = text_parser::parse_text_tool_calls(&text_content);
                if parsed.is_empty() { (text_content, tool_calls) } else { (remainder, parsed) }
            } else {
                (text_content, tool_calls)
            };

            if tool_calls.is_empty() {
                ctx.transcript.push(Message::assistant(text_content.clone()));
                sink.emit(AgentEvent::FinalAnswer {
                    task_id: task_id.clone(),
                    text: text_content.clone(),
                    confidence: None,
                })
                .await;
                sink.emit(AgentEvent::TokenUsage {
                    task_id: task_id.clone(),
                    prompt_tokens: usage_in as u32,
                    completion_tokens: usage_out as u32,
                })
                .await;
                sink.emit(AgentEvent::Complete { task_id: task_id.clone() }).await;

                steps.push(ExecutionStep {
                    iteration,
                    thought: Some(text_content.clone()),
                    action: None,
                    tool_calls: Vec::new(),
                    tool_results: Vec::new(),
                    observation: None,
                    duration_ms: iteration_started.elapsed().as_millis() as u64,
                    tokens_used: usage_in + usage_out,
                    error: None,
                });

                return TaskResult {
                    success: true,
                    answer: text_content,
                    confidence: 1.0,
                    prompt_tokens,
                    completion_tokens,
                    total_tokens: prompt_tokens + completion_tokens,
                    iterations: steps.len(),
                    steps,
                    stop_reason: StopReason::FinalAnswer,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
            }

            ctx.transcript.push(Message::assistant_with_tool_calls(text_content.clone(), tool_calls.clone()));

            let results = self.execute_batch(&tool_calls, carrier, &cancel, sink, &task_id).await;
            for result in &results {
                ctx.transcript.push(Message::tool_result(
                    result.call_id.clone(),
                    result.tool_name.clone(),
                    result.content.clone(),
                ));
            }

            sink.emit(AgentEvent::TokenUsage {
                task_id: task_id.clone(),
                prompt_tokens: usage_in as u32,
                completion_tokens: usage_out as u32,
            })
            .await;

            steps.push(ExecutionStep {
                iteration,
                thought: if text_content.trim().is_empty() { None } else { Some(text_content) },
                action: Some(tool_calls.iter().map(|c| c.name.clone()).collect::<Vec<_>>().join(",")),
                tool_calls,
                tool_results: results,
                observation: None,
                duration_ms: iteration_started.elapsed().as_millis() as u64,
                tokens_used: usage_in + usage_out,
                error: None,
            });

            debug!(iteration, "tool batch complete, continuing loop");
        }
    }

    /// Splits one iteration's tool batch into `spawn_subagent` calls (routed
    /// to the spawner) and everything else (routed to the ordinary invoker),
    /// then reassembles the results in the original call order (§4.6, §8).
    async fn execute_batch(
        &self,
        tool_calls: &[ToolCall],
        carrier: &Carrier,
        cancel: &tokio_util::sync::CancellationToken,
        sink: &dyn EventSink,
        task_id: &str,
    ) -> Vec<CoreToolResult> {
        let mut subagent_calls = Vec::new();
        let mut subagent_idx = Vec::new();
        let mut other_calls = Vec::new();
        let mut other_idx = Vec::new();

        for (i, call) in tool_calls.iter().enumerate() {
            if call.name == "spawn_subagent" {
                subagent_idx.push(i);
                subagent_calls.push(call.clone());
            } else {
                other_idx.push(i);
                other_calls.push(call.clone());
            }
        }

        let mut slots: Vec<Option<CoreToolResult>> = (0..tool_calls.len()).map(|_| None).collect();

        if !other_calls.is_empty() {
            let results = self.invoker.invoke_all(&other_calls, cancel, sink, task_id).await;
            for (idx, result) in other_idx.into_iter().zip(results) {
                slots[idx] = Some(result);
            }
        }

        if !subagent_calls.is_empty() {
            let results = match &self.spawner {
                Some(spawner) => spawner.dispatch(&subagent_calls, carrier, sink, task_id).await,
                None => subagent_calls
                    .iter()
                    .map(|c| {
                        CoreToolResult::failed(
                            c.id.clone(),
                            &c.name,
                            "sub-agent spawning is not available in this context",
                        )
                    })
                    .collect(),
            };
            for (idx, result) in subagent_idx.into_iter().zip(results) {
                slots[idx] = Some(result);
            }
        }

        slots.into_iter().map(|r| r.expect("every tool call produces a result")).collect()
    }

    async fn drain_pending(
        &self,
        rx: &mut mpsc::Receiver<String>,
        ctx: &mut TaskExecutionContext,
        sink: &dyn EventSink,
        task_id: &str,
    ) {
        let mut merged = Vec::new();
        while merged.len() < MAX_PENDING_MERGE {
            match rx.try_recv() {
                Ok(msg) => merged.push(msg),
                Err(_) => break,
            }
        }
        if merged.is_empty() {
            return;
        }
        let combined = merged.join("\n");
        sink.emit(AgentEvent::MessageIntegration { task_id: task_id.to_string(), summary: combined.clone() }).await;
        ctx.transcript.push(Message::user(combined));
    }

    /// Calls the model with retry/backoff. Transient errors (rate limit,
    /// network, generic request failure) are retried up to
    /// `MAX_RETRY_ATTEMPTS`; validation failures, cancellation, and context
    /// overflow are not retried (§4.5).
    async fn call_model_with_retry(
        &self,
        ctx: &TaskExecutionContext,
        cancel: &tokio_util::sync::CancellationToken,
        sink: &dyn EventSink,
        task_id: &str,
    ) -> Result<(String, Vec<ToolCall>, usize, usize), ModelCallOutcome> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.call_model_once(ctx, cancel, sink, task_id).await {
                Ok(parts) => return Ok(parts),
                Err(ModelCallOutcome::Cancelled) => return Err(ModelCallOutcome::Cancelled),
                Err(ModelCallOutcome::ContextOverflow(m)) => return Err(ModelCallOutcome::ContextOverflow(m)),
                Err(ModelCallOutcome::Fatal(msg)) if attempt >= MAX_RETRY_ATTEMPTS => {
                    return Err(ModelCallOutcome::Fatal(msg));
                }
                Err(ModelCallOutcome::Fatal(msg)) => {
                    let delay = RETRY_BASE_DELAY_MS * 2u64.pow(attempt - 1);
                    warn!(attempt, %msg, delay_ms = delay, "transient model error, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ModelCallOutcome::Cancelled),
                        _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                    }
                }
            }
        }
    }

    async fn call_model_once(
        &self,
        ctx: &TaskExecutionContext,
        cancel: &tokio_util::sync::CancellationToken,
        sink: &dyn EventSink,
        task_id: &str,
    ) -> Result<(String, Vec<ToolCall>, usize, usize), ModelCallOutcome> {
        let tools: Vec<LlmTool> = self.registry.list_definitions().await;

        let request = LlmRequest {
            model: ctx.config.model.clone(),
            messages: ctx.transcript.iter().map(to_llm_message).collect(),
            tools: if tools.is_empty() { None } else { Some(tools) },
            max_tokens: Some(ctx.config.max_tokens as u32),
            temperature: Some(ctx.config.temperature),
            system: None,
        };

        let stream = self
            .provider
            .complete_stream(request, Some(cancel.clone()))
            .await
            .map_err(classify_error)?;
        tokio::pin!(stream);

        let mut text = String::new();
        let mut calls: Vec<ToolCall> = Vec::new();
        let mut current: Option<(String, String, String)> = None; // (id, name, args)
        let mut prompt_tokens = 0usize;
        let mut completion_tokens = 0usize;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ModelCallOutcome::Cancelled),
                delta = stream.next() => {
                    match delta {
                        Some(Ok(StreamDelta::Text(t))) => {
                            text.push_str(&t);
                            sink.emit(AgentEvent::TokenDelta { task_id: task_id.to_string(), text: t }).await;
                        }
                        Some(Ok(StreamDelta::Thinking(_))) => {}
                        Some(Ok(StreamDelta::ToolCallStart { id, name })) => {
                            current = Some((id.clone(), name.clone(), String::new()));
                            sink.emit(AgentEvent::ToolArgsDelta { task_id: task_id.to_string(), call_id: id, arguments: String::new() }).await;
                        }
                        Some(Ok(StreamDelta::ToolCallDelta { id, arguments })) => {
                            if let Some((cur_id, _, args)) = current.as_mut() {
                                if *cur_id == id {
                                    args.push_str(&arguments);
                                }
                            }
                            sink.emit(AgentEvent::ToolArgsDelta { task_id: task_id.to_string(), call_id: id, arguments }).await;
                        }
                        Some(Ok(StreamDelta::ToolCallEnd { id })) => {
                            if let Some((cur_id, name, args)) = current.take() {
                                if cur_id == id {
                                    calls.push(ToolCall { id: cur_id, name, arguments: args });
                                }
                            }
                        }
                        Some(Ok(StreamDelta::Done { stop_reason: _, usage })) => {
                            if let Some(u) = usage {
                                prompt_tokens = u.input_tokens as usize;
                                completion_tokens = u.output_tokens as usize;
                            }
                        }
                        Some(Ok(StreamDelta::Error(e))) => return Err(classify_error(LlmError::RequestFailed(e))),
                        Some(Err(e)) => return Err(classify_error(e)),
                        None => break,
                    }
                }
            }
        }

        Ok((text, calls, prompt_tokens, completion_tokens))
    }
}

enum ModelCallOutcome {
    /// Retried up to `MAX_RETRY_ATTEMPTS` times.
    Fatal(String),
    /// Never retried.
    Cancelled,
    ContextOverflow(String),
}

fn classify_error(err: LlmError) -> ModelCallOutcome {
    match err {
        LlmError::Cancelled => ModelCallOutcome::Cancelled,
        LlmError::ContextOverflow(msg) => ModelCallOutcome::ContextOverflow(msg),
        LlmError::AuthFailed(msg) | LlmError::InvalidResponse(msg) => ModelCallOutcome::Fatal(msg),
        LlmError::RequestFailed(msg) => ModelCallOutcome::Fatal(msg),
        LlmError::RateLimited { retry_after_ms } => {
            ModelCallOutcome::Fatal(format!("rate limited, retry after {retry_after_ms}ms"))
        }
        LlmError::StreamError(msg) => ModelCallOutcome::Fatal(msg),
        LlmError::NetworkError(e) => ModelCallOutcome::Fatal(e.to_string()),
    }
}

fn to_llm_message(message: &Message) -> LlmMessage {
    use agentic_llm::{ContentBlock, LlmContent};

    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "user",
    };

    if message.role == Role::Tool {
        let block = ContentBlock::ToolResult {
            tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
            content: message.content.clone(),
            is_error: None,
        };
        return LlmMessage { role: role.to_string(), content: LlmContent::Blocks(vec![block]) };
    }

    if let Some(calls) = &message.tool_calls {
        if !calls.is_empty() {
            let mut blocks = Vec::new();
            if !message.content.is_empty() {
                blocks.push(ContentBlock::Text { text: message.content.clone() });
            }
            for call in calls {
                blocks.push(ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: serde_json::from_str(&call.arguments).unwrap_or(serde_json::json!({})),
                });
            }
            return LlmMessage { role: role.to_string(), content: LlmContent::Blocks(blocks) };
        }
    }

    LlmMessage { role: role.to_string(), content: LlmContent::Text(message.content.clone()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_channel;
    use agentic_core::config::ContextSettings;
    use agentic_llm::{LlmResult, LlmStream};
    use agentic_tools::registry::{Tool, ToolResult as RegistryToolResult};
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use tokio_util::sync::CancellationToken;

    struct ScriptedProvider {
        responses: std::sync::Mutex<Vec<Vec<StreamDelta>>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Vec<StreamDelta>>) -> Self {
            Self { responses: std::sync::Mutex::new(responses) }
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        fn models(&self) -> &[&str] {
            &["scripted-model"]
        }
        async fn complete_stream(
            &self,
            _request: LlmRequest,
            _cancel: Option<CancellationToken>,
        ) -> LlmResult<LlmStream> {
            let next = self.responses.lock().unwrap().remove(0);
            let stream = futures::stream::iter(next.into_iter().map(Ok));
            Ok(Box::pin(stream))
        }
    }

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, args: Value) -> RegistryToolResult {
            RegistryToolResult::text(args.to_string())
        }
    }

    fn test_ctx() -> TaskExecutionContext {
        TaskExecutionContext::new("t1", "s1", "what is 2+2", PathBuf::from("."))
    }

    fn settings() -> ContextSettings {
        ContextSettings {
            outer_token_limit: 100_000,
            outer_message_limit: 200,
            subagent_token_limit: 50_000,
            subagent_message_limit: 100,
            subagent_hard_force_tokens: 30_000,
            subagent_hard_force_messages: 80,
            emergency_fraction: 0.8,
        }
    }

    #[tokio::test]
    async fn single_shot_final_answer_ends_the_loop() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![
            StreamDelta::Text("4".into()),
            StreamDelta::Done { stop_reason: Some("end_turn".into()), usage: None },
        ]]));
        let registry = Arc::new(ToolRegistry::new());
        let context = ContextManager::new(settings(), false);
        let executor = Executor::new(provider, registry, context, None);

        let (tx, mut rx) = event_channel(64);
        let sink = crate::events::ChannelEventSink::new(tx);
        let mut ctx = test_ctx();
        let carrier = Carrier::new("s1");

        let result = executor.process_task(&mut ctx, &carrier, &sink, None).await;
        assert!(result.success);
        assert_eq!(result.answer, "4");
        assert_eq!(result.stop_reason, StopReason::FinalAnswer);

        let mut saw_complete = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, AgentEvent::Complete { .. }) {
                saw_complete = true;
            }
        }
        assert!(saw_complete);
    }

    #[tokio::test]
    async fn one_tool_round_trip_then_final_answer() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            vec![
                StreamDelta::ToolCallStart { id: "c1".into(), name: "echo".into() },
                StreamDelta::ToolCallDelta { id: "c1".into(), arguments: "{\"x\":1}".into() },
                StreamDelta::ToolCallEnd { id: "c1".into() },
                StreamDelta::Done { stop_reason: Some("tool_use".into()), usage: None },
            ],
            vec![
                StreamDelta::Text("done".into()),
                StreamDelta::Done { stop_reason: Some("end_turn".into()), usage: None },
            ],
        ]));
        let registry = Arc::new(ToolRegistry::new());
        registry.register_static(EchoTool);
        let context = ContextManager::new(settings(), false);
        let executor = Executor::new(provider, registry, context, None);

        let (tx, _rx) = event_channel(64);
        let sink = crate::events::ChannelEventSink::new(tx);
        let mut ctx = test_ctx();
        let carrier = Carrier::new("s1");

        let result = executor.process_task(&mut ctx, &carrier, &sink, None).await;
        assert!(result.success);
        assert_eq!(result.answer, "done");
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.steps[0].tool_results.len(), 1);
        assert!(result.steps[0].tool_results[0].success);
    }

    #[tokio::test]
    async fn max_iterations_is_reported_when_the_model_never_stops() {
        let infinite_tool_call = || {
            vec![
                StreamDelta::ToolCallStart { id: "c1".into(), name: "echo".into() },
                StreamDelta::ToolCallDelta { id: "c1".into(), arguments: "{}".into() },
                StreamDelta::ToolCallEnd { id: "c1".into() },
                StreamDelta::Done { stop_reason: Some("tool_use".into()), usage: None },
            ]
        };
        let provider = Arc::new(ScriptedProvider::new((0..10).map(|_| infinite_tool_call()).collect()));
        let registry = Arc::new(ToolRegistry::new());
        registry.register_static(EchoTool);
        let context = ContextManager::new(settings(), false);
        let executor = Executor::new(provider, registry, context, None);

        let (tx, _rx) = event_channel(256);
        let sink = crate::events::ChannelEventSink::new(tx);
        let mut ctx = test_ctx();
        ctx.config.max_iterations = 3;
        let carrier = Carrier::new("s1");

        let result = executor.process_task(&mut ctx, &carrier, &sink, None).await;
        assert!(!result.success);
        assert_eq!(result.stop_reason, StopReason::MaxIterations);
    }

    #[tokio::test]
    async fn cancellation_before_first_iteration_yields_cancelled_result() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![StreamDelta::Done { stop_reason: None, usage: None }]]));
        let registry = Arc::new(ToolRegistry::new());
        let context = ContextManager::new(settings(), false);
        let executor = Executor::new(provider, registry, context, None);

        let (tx, _rx) = event_channel(16);
        let sink = crate::events::ChannelEventSink::new(tx);
        let mut ctx = test_ctx();
        let carrier = Carrier::new("s1");
        carrier.cancellation_token().cancel();

        let result = executor.process_task(&mut ctx, &carrier, &sink, None).await;
        assert_eq!(result.stop_reason, StopReason::Cancelled);
    }

    #[tokio::test]
    async fn pending_messages_are_merged_for_outer_tasks_only() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![
            StreamDelta::Text("ok".into()),
            StreamDelta::Done { stop_reason: Some("end_turn".into()), usage: None },
        ]]));
        let registry = Arc::new(ToolRegistry::new());
        let context = ContextManager::new(settings(), false);
        let executor = Executor::new(provider, registry, context, None);

        let (tx, _rx) = event_channel(16);
        let sink = crate::events::ChannelEventSink::new(tx);
        let mut ctx = test_ctx();
        let carrier = Carrier::new("s1");

        let (ptx, mut prx) = mpsc::channel(8);
        ptx.send("extra context".to_string()).await.unwrap();
        drop(ptx);

        let before = ctx.transcript.len();
        let _ = executor.process_task(&mut ctx, &carrier, &sink, Some(&mut prx)).await;
        assert!(ctx.transcript.len() > before);
    }
}
