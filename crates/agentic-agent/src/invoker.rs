//! Tool Invoker (C3): turns the calls an assistant turn requested into
//! `agentic_core::ToolResult`s, in order, with panic isolation and a
//! repair-then-truncate-then-skip fallback for malformed arguments.

pub mod text_parser;

use crate::events::{AgentEvent, EventSink};
use agentic_core::{ToolCall, ToolResult as CoreToolResult};
use agentic_tools::ToolRegistry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Results over this size are trimmed for the transcript and for the event
/// stream — large tool output (a big `grep`, a verbose `bash` run) would
/// otherwise dominate the context budget on its own.
const DISPLAY_TRIM_LIMIT: usize = 50_000;

pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
}

impl ToolInvoker {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Execute every call in `calls`, in order, returning one `ToolResult`
    /// per call (never fewer — a missing response breaks the assistant/tool
    /// message pairing downstream, so every call is accounted for even when
    /// it fails before anything runs). An empty `calls` is itself a boundary
    /// case (§8): it produces a single synthetic failure rather than an
    /// empty vector, since an invoker is never expected to be handed zero
    /// work by a well-formed assistant turn.
    pub async fn invoke_all(
        &self,
        calls: &[ToolCall],
        cancel: &CancellationToken,
        sink: &dyn EventSink,
        task_id: &str,
    ) -> Vec<CoreToolResult> {
        if calls.is_empty() {
            return vec![CoreToolResult::failed("", "", "no tool calls provided")];
        }

        let mut results = Vec::with_capacity(calls.len());
        let mut seen_ids = std::collections::HashSet::new();

        for call in calls {
            // A duplicate id within one assistant turn would make the
            // downstream tool_call_id pairing ambiguous; disambiguate by
            // suffixing rather than dropping the call.
            let call_id = if seen_ids.insert(call.id.clone()) {
                call.id.clone()
            } else {
                format!("{}-dup", call.id)
            };

            if cancel.is_cancelled() {
                results.push(CoreToolResult::failed(call_id, &call.name, "cancelled"));
                continue;
            }

            sink.emit(AgentEvent::ToolStart {
                task_id: task_id.to_string(),
                call_id: call_id.clone(),
                name: call.name.clone(),
            })
            .await;

            let result = self.invoke_one(&call_id, &call.name, &call.arguments, cancel).await;

            match &result.error {
                Some(err) => {
                    sink.emit(AgentEvent::ToolError {
                        task_id: task_id.to_string(),
                        call_id: call_id.clone(),
                        name: call.name.clone(),
                        error: err.clone(),
                    })
                    .await;
                }
                None => {
                    sink.emit(AgentEvent::ToolResult {
                        task_id: task_id.to_string(),
                        call_id: call_id.clone(),
                        name: call.name.clone(),
                        content: trim_for_display(&result.content),
                        is_error: false,
                    })
                    .await;
                }
            }

            results.push(result);
        }

        results
    }

    async fn invoke_one(
        &self,
        call_id: &str,
        name: &str,
        raw_arguments: &str,
        cancel: &CancellationToken,
    ) -> CoreToolResult {
        let started = std::time::Instant::now();

        let args = match parse_arguments(raw_arguments) {
            Some(v) => v,
            None => {
                return CoreToolResult::failed(
                    call_id,
                    name,
                    format!("could not parse arguments for '{name}', call skipped"),
                );
            }
        };

        let tool = match self.registry.get(name).await {
            Some(tool) => tool,
            None => return CoreToolResult::failed(call_id, name, format!("tool not found: {name}")),
        };

        if let Err(reason) = validate_arguments(&tool.input_schema(), &args) {
            return CoreToolResult::failed(call_id, name, format!("invalid arguments for '{name}': {reason}"));
        }

        let cancel = cancel.clone();
        let args_for_task = args.clone();

        // Isolate each call in its own task: a panicking tool (a bug in a
        // third-party MCP tool, a bad downcast) must not take the whole
        // iteration down with it.
        let join = tokio::spawn(async move { tool.execute_cancellable(args_for_task, cancel).await });

        let outcome = match join.await {
            Ok(tool_result) => tool_result,
            Err(join_err) => {
                return CoreToolResult::failed(
                    call_id,
                    name,
                    format!("tool panicked: {join_err}"),
                );
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let mut content = outcome.to_content_string();
        if content.is_empty() {
            content = "(no output)".to_string();
        }

        let mut result = if outcome.is_error() {
            CoreToolResult::failed(call_id, name, content)
        } else {
            CoreToolResult::ok(call_id, name, content)
        };
        result.duration_ms = duration_ms;
        result.tool_args = args.to_string();
        result
    }
}

/// Validate `args` against a tool's JSON Schema before invoking it (§4.3
/// step 3). This checks the two things a malformed tool call actually gets
/// wrong in practice — wrong top-level shape and missing required fields —
/// rather than full schema conformance (no schema-validation crate is in
/// the dependency graph; the teacher's own `Tool` trait doesn't validate at
/// all, so this stays deliberately minimal).
fn validate_arguments(schema: &serde_json::Value, args: &serde_json::Value) -> Result<(), String> {
    let Some(schema) = schema.as_object() else { return Ok(()) };

    if schema.get("type").and_then(|t| t.as_str()) == Some("object") && !args.is_object() {
        return Err("expected a JSON object".to_string());
    }

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        let provided = args.as_object();
        for field in required {
            let Some(field) = field.as_str() else { continue };
            if !provided.is_some_and(|o| o.contains_key(field)) {
                return Err(format!("missing required argument '{field}'"));
            }
        }
    }

    Ok(())
}

/// Parse a tool call's JSON-encoded argument string, repairing the common
/// truncation failure (an LLM stream cut off mid-object) before giving up.
fn parse_arguments(raw: &str) -> Option<serde_json::Value> {
    if raw.trim().is_empty() {
        return Some(serde_json::json!({}));
    }
    if let Ok(v) = serde_json::from_str(raw) {
        return Some(v);
    }
    // Repair: a truncated object/array is closed with the matching
    // brackets rather than discarded outright.
    if let Some(repaired) = repair_truncated_json(raw) {
        if let Ok(v) = serde_json::from_str(&repaired) {
            return Some(v);
        }
    }
    None
}

fn repair_truncated_json(raw: &str) -> Option<String> {
    let trimmed = raw.trim_end();
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escape = false;

    for ch in trimmed.chars() {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }

    if stack.is_empty() {
        return None;
    }

    let mut repaired = trimmed.to_string();
    if in_string {
        repaired.push('"');
    }
    while let Some(closer) = stack.pop() {
        repaired.push(closer);
    }
    Some(repaired)
}

fn trim_for_display(content: &str) -> String {
    if content.len() <= DISPLAY_TRIM_LIMIT {
        return content.to_string();
    }
    format!(
        "{}...\n[truncated, {} total chars]",
        &content[..DISPLAY_TRIM_LIMIT],
        content.len()
    )
}
