//! Tool-call parsing: native function calls first, inline regex fallback.
//!
//! The inline format the models are instructed to use:
//!
//! ```text
//! Action: vector_search
//! Action Input: {"query": "PT PMA capital"}
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use crate::llm::NativeToolCall;
use crate::state::ToolCall;

static INLINE_ACTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)Action:\s*(?P<name>[A-Za-z0-9_]+)\s*\n+\s*Action Input:\s*(?P<args>\{.*?\})")
        .expect("inline action regex")
});

/// Extracts a tool call, preferring native function calls over the inline
/// format. Returns the call plus the thought text preceding it.
pub fn parse_tool_call(text: &str, native: &[NativeToolCall]) -> Option<(ToolCall, String)> {
    if let Some(call) = native.first() {
        return Some((
            ToolCall::new(call.name.clone(), call.arguments.clone()),
            text.to_string(),
        ));
    }
    parse_inline_tool_call(text)
}

/// Regex fallback over the model's text output.
pub fn parse_inline_tool_call(text: &str) -> Option<(ToolCall, String)> {
    let caps = INLINE_ACTION_RE.captures(text)?;
    let name = caps.name("name")?.as_str().to_string();
    let raw_args = caps.name("args")?.as_str();
    let arguments: serde_json::Value = serde_json::from_str(raw_args).ok()?;
    let thought = text[..caps.get(0)?.start()].trim().to_string();
    Some((ToolCall::new(name, arguments), thought))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn native_call_wins_over_inline_text() {
        let native = vec![NativeToolCall {
            name: "vector_search".into(),
            arguments: json!({"query": "kitas"}),
        }];
        let (call, thought) =
            parse_tool_call("I should search.\nAction: calculator\nAction Input: {}", &native)
                .unwrap();
        assert_eq!(call.tool_name, "vector_search");
        assert_eq!(call.arguments["query"], "kitas");
        assert!(thought.contains("I should search."));
    }

    #[test]
    fn inline_format_parses_name_args_and_thought() {
        let text = "I need pricing data first.\nAction: pricing_lookup\nAction Input: {\"service_type\": \"visa\"}";
        let (call, thought) = parse_inline_tool_call(text).unwrap();
        assert_eq!(call.tool_name, "pricing_lookup");
        assert_eq!(call.arguments["service_type"], "visa");
        assert_eq!(thought, "I need pricing data first.");
    }

    #[test]
    fn inline_format_with_multiline_json() {
        let text = "Action: vector_search\nAction Input: {\"query\": \"PT PMA\",\n \"top_k\": 3}";
        let (call, _) = parse_inline_tool_call(text).unwrap();
        assert_eq!(call.arguments["top_k"], 3);
    }

    #[test]
    fn plain_text_yields_no_call() {
        assert!(parse_inline_tool_call("Final Answer: 42").is_none());
        assert!(parse_tool_call("just a thought", &[]).is_none());
    }

    #[test]
    fn malformed_json_yields_no_call() {
        let text = "Action: calculator\nAction Input: {broken";
        assert!(parse_inline_tool_call(text).is_none());
    }
}
