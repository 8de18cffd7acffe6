//! Textual tool-call fallback grammar (C3).
//!
//! Models occasionally emit a tool call as text instead of a structured
//! content block — especially smaller/cheaper models, or a structured call
//! that got truncated by a context-limit degradation. This recognizes a
//! single fenced-block convention and synthesizes the same `ToolCall` shape
//! the structured path produces, so the rest of the invoker can't tell the
//! two apart.
//!
//! Recognized form:
//! ```text
//! ```tool_call
//! {"name": "read", "arguments": {"path": "src/main.rs"}}
//! ```
//! ```

use agentic_core::ToolCall;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

fn block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```tool_call\s*\n(.*?)\n?```").expect("static regex"))
}

static CALL_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Synthetic id for a tool call parsed out of the textual fallback grammar
/// (§4.3(2)): `text_<nanos>`-prefixed, distinguishing it from the
/// `call_<nanos>` ids the structured path assigns to calls the model
/// emitted without one.
pub fn synthetic_text_id() -> String {
    let n = CALL_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("text_{:016x}", n)
}

/// Extract `tool_call` fenced blocks from `text`. Returns the text with the
/// matched blocks removed (trimmed) and the parsed calls in document order.
/// A block whose JSON body doesn't parse, or lacks a `name`, is skipped
/// rather than failing the whole parse — a single malformed block shouldn't
/// swallow calls the model got right.
pub fn parse_text_tool_calls(text: &str) -> (String, Vec<ToolCall>) {
    let mut calls = Vec::new();
    let mut remainder = String::with_capacity(text.len());
    let mut last_end = 0;

    for caps in block_re().captures_iter(text) {
        let whole = caps.get(0).unwrap();
        remainder.push_str(&text[last_end..whole.start()]);
        last_end = whole.end();

        let body = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        if let Some(call) = parse_one_block(body) {
            calls.push(call);
        }
    }
    remainder.push_str(&text[last_end..]);

    (remainder.trim().to_string(), calls)
}

fn parse_one_block(body: &str) -> Option<ToolCall> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let name = value.get("name")?.as_str()?.to_string();
    let arguments = value
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}))
        .to_string();
    Some(ToolCall { id: synthetic_text_id(), name, arguments })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_a_single_well_formed_block() {
        let text = "Let me check that file.\n```tool_call\n{\"name\": \"read\", \"arguments\": {\"path\": \"a.rs\"}}\n```\n";
        let (remainder, calls) = parse_text_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read");
        assert!(calls[0].id.starts_with("text_"));
        assert!(remainder.contains("Let me check"));
    }

    #[test]
    fn skips_malformed_block_without_panicking() {
        let text = "```tool_call\nnot json at all\n```";
        let (_, calls) = parse_text_tool_calls(text);
        assert!(calls.is_empty());
    }

    #[test]
    fn extracts_multiple_blocks_in_order() {
        let text = "```tool_call\n{\"name\": \"a\"}\n```\nthen\n```tool_call\n{\"name\": \"b\"}\n```";
        let (_, calls) = parse_text_tool_calls(text);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "a");
        assert_eq!(calls[1].name, "b");
    }

    #[test]
    fn plain_text_with_no_blocks_returns_no_calls() {
        let (remainder, calls) = parse_text_tool_calls("just an answer, no tools needed");
        assert!(calls.is_empty());
        assert_eq!(remainder, "just an answer, no tools needed");
    }
}
