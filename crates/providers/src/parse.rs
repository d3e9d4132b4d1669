//! Reading tool calls out of free-form model text.
//!
//! Models without native function calling are asked to answer with
//! `{"tool": "...", "args": {...}}`. They rarely comply exactly: the object
//! shows up in a fenced block, after a sentence of prose, or not at all.

use regex_lite::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use switchboard_core::{ModelReply, ToolInvocation};

/// Find a `{"tool": ..., "args": ...}` object in `text`.
///
/// Looks inside the first fenced block if there is one, otherwise the whole
/// text, and parses the first brace-balanced object found there. Returns
/// `None` if that object is not valid JSON or lacks either key.
pub fn extract_tool_call(text: &str) -> Option<ToolInvocation> {
    let text = text.trim();
    let region = fenced_block(text).unwrap_or(text);
    let candidate = first_json_object(region)?;

    let value: Value = serde_json::from_str(candidate).ok()?;
    let obj = value.as_object()?;
    let tool = obj.get("tool")?.as_str()?;
    let args = obj.get("args")?.clone();

    Some(ToolInvocation {
        tool: tool.to_string(),
        args,
    })
}

/// Content of the first ``` fence, without the language tag line.
/// An unterminated fence runs to the end of the text.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open..];
    let body_start = open + after_open.find('\n')? + 1;
    let body = &text[body_start..];
    let inner = match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    };
    Some(inner.trim())
}

/// The first `{...}` with balanced braces, ignoring braces inside strings.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn reasoning_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?im)^(?:let me think|i need to|i'll |i will |first, |to answer this|thinking:|thought:|reasoning:).*\n",
            )
            .ok()
        })
        .as_ref()
}

/// Drop "Let me think..." style lines from an answer.
///
/// A matching line is removed only when a line break follows it, so a
/// one-line answer is never erased.
pub fn strip_reasoning(text: &str) -> String {
    match reasoning_pattern() {
        Some(re) => re.replace_all(text, "").trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Classify raw model output as a tool call or a text answer.
pub fn interpret_response(text: &str, hide_reasoning: bool) -> ModelReply {
    if let Some(call) = extract_tool_call(text) {
        return ModelReply::ToolCall(call);
    }
    let text = if hide_reasoning {
        strip_reasoning(text)
    } else {
        text.trim().to_string()
    };
    ModelReply::Text(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_object() {
        let call = extract_tool_call(r#"{"tool": "get_system_status", "args": {}}"#).unwrap();
        assert_eq!(call.tool, "get_system_status");
        assert_eq!(call.args, json!({}));
    }

    #[test]
    fn fenced_block_surrounded_by_prose() {
        let text = "Sure, checking now.\n```json\n{\"tool\":\"x\",\"args\":{\"a\":1}}\n```\nOne moment.";
        let call = extract_tool_call(text).unwrap();
        assert_eq!(call.tool, "x");
        assert_eq!(call.args, json!({"a": 1}));
    }

    #[test]
    fn unterminated_fence_takes_rest() {
        let text = "```\n{\"tool\": \"x\", \"args\": {\"n\": {\"deep\": true}}}";
        let call = extract_tool_call(text).unwrap();
        assert_eq!(call.args, json!({"n": {"deep": true}}));
    }

    #[test]
    fn object_embedded_in_prose() {
        let text = r#"I'll run it: {"tool": "execute_ssh_command", "args": {"server": "db1", "command": "df -h"}} then report."#;
        let call = extract_tool_call(text).unwrap();
        assert_eq!(call.tool, "execute_ssh_command");
        assert_eq!(call.args["server"], "db1");
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let text = r#"{"tool": "q", "args": {"query": "SELECT '}' FROM t"}}"#;
        let call = extract_tool_call(text).unwrap();
        assert_eq!(call.args["query"], "SELECT '}' FROM t");
    }

    #[test]
    fn missing_args_key_is_not_a_call() {
        assert!(extract_tool_call(r#"{"tool": "x"}"#).is_none());
        assert!(extract_tool_call(r#"{"args": {}}"#).is_none());
    }

    #[test]
    fn malformed_json_falls_back_to_text() {
        let text = r#"Result: {"tool": "x", "args": {a: 1}}"#;
        assert!(extract_tool_call(text).is_none());
        assert_eq!(
            interpret_response(text, false),
            ModelReply::Text(text.to_string())
        );
    }

    #[test]
    fn plain_text_is_text() {
        assert_eq!(
            interpret_response("All green", true),
            ModelReply::Text("All green".into())
        );
    }

    #[test]
    fn reasoning_lines_are_stripped() {
        let text = "Let me think about this.\nThought: disk is fine\nThe server is healthy.";
        assert_eq!(strip_reasoning(text), "The server is healthy.");
    }

    #[test]
    fn reasoning_strip_is_case_insensitive_and_keeps_last_line() {
        assert_eq!(strip_reasoning("I WILL check.\nDone."), "Done.");
        assert_eq!(strip_reasoning("I need to go."), "I need to go.");
    }

    #[test]
    fn hide_reasoning_flag_controls_stripping() {
        let text = "First, I looked.\nAll good.";
        assert_eq!(
            interpret_response(text, true),
            ModelReply::Text("All good.".into())
        );
        assert_eq!(
            interpret_response(text, false),
            ModelReply::Text(text.into())
        );
    }
}
