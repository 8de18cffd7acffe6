//! Context window management (C4): token accounting, the two-tier
//! compression threshold table, and the AI-summarize-with-fallback pipeline.
//!
//! Thresholds come from `agentic_core::config::ContextSettings` so outer
//! tasks and sub-agents can be tuned independently from `agentic.toml`
//! without a code change (§4.4).

use agentic_core::config::ContextSettings;
use agentic_core::{Message, MessageSource, Role};
use agentic_llm::{LlmContent, LlmMessage, LlmProvider, LlmRequest};
use std::sync::Arc;

const CHARS_PER_TOKEN: f32 = 4.0;

pub fn estimate_tokens(text: &str) -> usize {
    (text.len() as f32 / CHARS_PER_TOKEN).ceil() as usize
}

pub fn message_tokens(message: &Message) -> usize {
    let mut total = estimate_tokens(&message.content) + 10;
    if let Some(calls) = &message.tool_calls {
        for call in calls {
            total += estimate_tokens(&call.name) + estimate_tokens(&call.arguments);
        }
    }
    total
}

pub fn total_tokens(transcript: &[Message]) -> usize {
    transcript.iter().map(message_tokens).sum()
}

/// Summarizes a span of transcript messages into a single note. Backed by
/// the same `LlmProvider` the main loop uses, so compression costs one more
/// call against the same account rather than a separate summarization
/// service (an Open Question resolved in favor of "reuse the provider").
#[async_trait::async_trait]
pub trait AiSummarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> Result<String, String>;
}

pub struct LlmSummarizer {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self { provider, model: model.into() }
    }
}

#[async_trait::async_trait]
impl AiSummarizer for LlmSummarizer {
    async fn summarize(&self, messages: &[Message]) -> Result<String, String> {
        let transcript_text: String = messages
            .iter()
            .map(|m| format!("[{:?}] {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let request = LlmRequest {
            model: self.model.clone(),
            messages: vec![LlmMessage {
                role: "user".into(),
                content: LlmContent::Text(format!(
                    "Summarize the following conversation history in a few sentences, \
                     preserving any facts, decisions, or file paths a continuation would need:\n\n{}",
                    transcript_text
                )),
            }],
            max_tokens: Some(512),
            ..Default::default()
        };

        use futures::StreamExt;
        let stream = self
            .provider
            .complete_stream(request, None)
            .await
            .map_err(|e| e.to_string())?;
        tokio::pin!(stream);

        let mut summary = String::new();
        while let Some(delta) = stream.next().await {
            if let Ok(agentic_llm::StreamDelta::Text(t)) = delta {
                summary.push_str(&t);
            }
        }
        if summary.trim().is_empty() {
            Err("summarizer returned empty text".to_string())
        } else {
            Ok(summary)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionOutcome {
    NotNeeded,
    Summarized { removed: usize },
    DeterministicallyTruncated { removed: usize },
}

pub struct ContextManager {
    settings: ContextSettings,
    is_subagent: bool,
}

impl ContextManager {
    pub fn new(settings: ContextSettings, is_subagent: bool) -> Self {
        Self { settings, is_subagent }
    }

    fn token_limit(&self) -> usize {
        if self.is_subagent { self.settings.subagent_token_limit } else { self.settings.outer_token_limit }
    }

    fn message_limit(&self) -> usize {
        if self.is_subagent { self.settings.subagent_message_limit } else { self.settings.outer_message_limit }
    }

    fn hard_force_tokens(&self) -> usize {
        if self.is_subagent { self.settings.subagent_hard_force_tokens } else { self.settings.outer_token_limit }
    }

    fn hard_force_messages(&self) -> usize {
        if self.is_subagent { self.settings.subagent_hard_force_messages } else { self.settings.outer_message_limit }
    }

    /// True once a transcript has crossed either threshold of the soft
    /// tier — callers should compress before the *next* LLM call, not mid
    /// stream.
    pub fn over_soft_threshold(&self, transcript: &[Message]) -> bool {
        total_tokens(transcript) > self.token_limit() || transcript.len() > self.message_limit()
    }

    /// True once a transcript has crossed the hard tier — compression is
    /// mandatory regardless of whether an AI summarizer is available (the
    /// deterministic fallback always applies here).
    pub fn over_hard_threshold(&self, transcript: &[Message]) -> bool {
        total_tokens(transcript) > self.hard_force_tokens() || transcript.len() > self.hard_force_messages()
    }

    /// True once a transcript is within `emergency_fraction` of the hard
    /// limit — triggers pre-call compression even if the soft threshold
    /// alone wouldn't have (§4.4's 80%-of-max emergency case).
    pub fn needs_emergency_compression(&self, transcript: &[Message]) -> bool {
        let emergency_tokens = (self.hard_force_tokens() as f32 * self.settings.emergency_fraction) as usize;
        total_tokens(transcript) >= emergency_tokens
    }

    /// Compress `transcript` in place, replacing the *middle* span with a
    /// synthetic note while keeping the head and tail verbatim (§4.4: "...
    /// preserving the head (system prompt, earliest user turn) and the last
    /// few messages verbatim"). Tries the AI summarizer first; if it errors,
    /// or if its output doesn't actually shrink the transcript (monotonicity
    /// invariant), falls back to deterministic truncation. Both boundaries
    /// are pairing-safe: neither ever separates a tool call from its result.
    pub async fn compress(
        &self,
        transcript: &mut Vec<Message>,
        summarizer: Option<&dyn AiSummarizer>,
    ) -> CompressionOutcome {
        if !self.over_soft_threshold(transcript) && !self.over_hard_threshold(transcript) {
            return CompressionOutcome::NotNeeded;
        }

        let before_tokens = total_tokens(transcript);
        let before_len = transcript.len();

        let head_end = self.head_boundary(transcript);
        let tail_start = self.tail_boundary(transcript, head_end);
        if head_end >= tail_start {
            // Nothing left in the middle to compress once the head and
            // tail are carved out.
            return CompressionOutcome::NotNeeded;
        }

        if let Some(summarizer) = summarizer {
            let middle = &transcript[head_end..tail_start];
            if let Ok(summary_text) = summarizer.summarize(middle).await {
                let mut summarized = Message::summary(summary_text);
                summarized.source = MessageSource::Summary;

                let mut candidate = Vec::with_capacity(transcript.len());
                candidate.extend_from_slice(&transcript[..head_end]);
                candidate.push(summarized);
                candidate.extend_from_slice(&transcript[tail_start..]);

                if candidate.len() < before_len && total_tokens(&candidate) < before_tokens {
                    *transcript = candidate;
                    return CompressionOutcome::Summarized { removed: before_len - transcript.len() };
                }
                // Monotonicity invariant violated — summary didn't help.
                // Fall through to deterministic truncation below.
            }
        }

        self.deterministic_truncate(transcript, head_end, tail_start);
        CompressionOutcome::DeterministicallyTruncated { removed: before_len - transcript.len() }
    }

    /// Deterministic fallback: drop the middle span outright, replacing it
    /// with a short debug note rather than a summary.
    fn deterministic_truncate(&self, transcript: &mut Vec<Message>, head_end: usize, tail_start: usize) {
        let removed = tail_start - head_end;
        let tail = transcript.split_off(tail_start);
        transcript.truncate(head_end);
        transcript.push(Message::debug_note(format!(
            "[{removed} earlier messages truncated to stay within the context budget]"
        )));
        transcript.extend(tail);
    }

    /// Head to preserve verbatim: up to [`HEAD_SYSTEM_MAX`] leading system
    /// messages (system messages only ever appear at the head — invariant
    /// §3) plus the earliest user turn right after them, shrunk leftward if
    /// that would otherwise split a tool-call pair.
    fn head_boundary(&self, transcript: &[Message]) -> usize {
        let mut end = 0;
        while end < transcript.len() && end < HEAD_SYSTEM_MAX && transcript[end].role == Role::System {
            end += 1;
        }
        if end < transcript.len() {
            end += 1; // earliest user turn
        }
        safe_boundary_decreasing(transcript, end.min(transcript.len()))
    }

    /// Tail to preserve verbatim: the last [`TAIL_KEEP`] non-system
    /// messages, extended leftward if that would otherwise split a
    /// tool-call pair. Never smaller than `head_end` so the two boundaries
    /// can't cross.
    fn tail_boundary(&self, transcript: &[Message], head_end: usize) -> usize {
        let candidate = transcript.len().saturating_sub(TAIL_KEEP).max(head_end);
        safe_boundary_decreasing(transcript, candidate).max(head_end)
    }
}

/// Leading system messages kept verbatim by [`ContextManager::head_boundary`]
/// (§4.4's deterministic-fallback table: "up to two leading system
/// messages").
const HEAD_SYSTEM_MAX: usize = 2;

/// Trailing non-system messages kept verbatim by both the summarizer and
/// deterministic paths (§4.4: "the last three non-system messages" /
/// "the last few messages verbatim").
const TAIL_KEEP: usize = 3;

/// Walk `candidate` backward until it no longer splits a tool-call /
/// tool-result pair: an assistant message with `tool_calls` must keep every
/// subsequent `Role::Tool` message that answers one of those calls on the
/// same side of the boundary, or neither survives on that side.
fn safe_boundary_decreasing(transcript: &[Message], candidate: usize) -> usize {
    let mut split = candidate;
    while split > 0 {
        let prev_has_open_calls =
            transcript[split - 1].tool_calls.as_ref().is_some_and(|c| !c.is_empty());
        let next_is_tool_result = transcript.get(split).map(|m| m.role == Role::Tool).unwrap_or(false);
        if !(prev_has_open_calls && next_is_tool_result) {
            break;
        }
        split -= 1;
    }
    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentic_core::ToolCall;

    fn settings() -> ContextSettings {
        ContextSettings {
            outer_token_limit: 1000,
            outer_message_limit: 6,
            subagent_token_limit: 500,
            subagent_message_limit: 4,
            subagent_hard_force_tokens: 300,
            subagent_hard_force_messages: 3,
            emergency_fraction: 0.8,
        }
    }

    #[test]
    fn estimate_tokens_is_roughly_chars_over_four() {
        assert_eq!(estimate_tokens("hello"), 2);
        assert_eq!(estimate_tokens("hello world"), 3);
    }

    #[test]
    fn over_soft_threshold_trips_on_message_count() {
        let manager = ContextManager::new(settings(), false);
        let transcript: Vec<Message> = (0..7).map(|i| Message::user(format!("msg {i}"))).collect();
        assert!(manager.over_soft_threshold(&transcript));
    }

    #[test]
    fn safe_boundary_decreasing_never_separates_a_tool_call_from_its_result() {
        let transcript = vec![
            Message::user("go"),
            Message::assistant_with_tool_calls(
                "",
                vec![ToolCall { id: "c1".into(), name: "read".into(), arguments: "{}".into() }],
            ),
            Message::tool_result("c1", "read", "contents"),
            Message::assistant("done"),
        ];
        let split = safe_boundary_decreasing(&transcript, 2);
        let prev_has_calls = transcript[split - 1].tool_calls.is_some();
        let next_is_tool = transcript.get(split).map(|m| m.role == Role::Tool).unwrap_or(false);
        assert!(!(prev_has_calls && next_is_tool));
    }

    #[tokio::test]
    async fn deterministic_truncation_reduces_message_count() {
        let manager = ContextManager::new(settings(), false);
        let mut transcript: Vec<Message> = (0..10).map(|i| Message::user(format!("msg {i}"))).collect();
        let before = transcript.len();
        let outcome = manager.compress(&mut transcript, None).await;
        assert!(matches!(outcome, CompressionOutcome::DeterministicallyTruncated { .. }));
        assert!(transcript.len() < before);
    }

    #[tokio::test]
    async fn compression_preserves_the_leading_system_prompt_and_earliest_user_turn() {
        let manager = ContextManager::new(settings(), false);
        let mut transcript = vec![Message::system("you are a helpful agent")];
        transcript.push(Message::user("earliest turn: set up the repo"));
        for i in 0..10 {
            transcript.push(Message::user(format!("filler {i}")));
            transcript.push(Message::assistant(format!("ack {i}")));
        }
        let outcome = manager.compress(&mut transcript, None).await;
        assert!(matches!(outcome, CompressionOutcome::DeterministicallyTruncated { .. }));

        assert!(matches!(transcript.first().unwrap().role, Role::System));
        assert_eq!(transcript[0].content, "you are a helpful agent");
        assert_eq!(transcript[1].content, "earliest turn: set up the repo");
        // Only one system message total — the invariant that system
        // messages appear only at the head must survive compression.
        assert_eq!(transcript.iter().filter(|m| matches!(m.role, Role::System)).count(), 1);
    }

    #[tokio::test]
    async fn compression_keeps_the_last_few_messages_verbatim() {
        let manager = ContextManager::new(settings(), false);
        let mut transcript: Vec<Message> = (0..12).map(|i| Message::user(format!("msg {i}"))).collect();
        manager.compress(&mut transcript, None).await;
        let tail: Vec<&str> = transcript.iter().rev().take(TAIL_KEEP).map(|m| m.content.as_str()).collect();
        assert_eq!(tail, vec!["msg 11", "msg 10", "msg 9"]);
    }

    #[tokio::test]
    async fn compress_is_a_no_op_below_both_thresholds() {
        let manager = ContextManager::new(settings(), false);
        let mut transcript = vec![Message::user("hi")];
        let outcome = manager.compress(&mut transcript, None).await;
        assert_eq!(outcome, CompressionOutcome::NotNeeded);
    }

    #[test]
    fn needs_emergency_compression_trips_at_configured_fraction() {
        let manager = ContextManager::new(settings(), true);
        let big = "x".repeat(300 * 4 * 2);
        let transcript = vec![Message::user(big)];
        assert!(manager.needs_emergency_compression(&transcript));
    }
}
