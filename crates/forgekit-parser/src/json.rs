use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use forgekit_core::error::{ForgeError, Result};
use forgekit_core::traits::OutputParser;

fn fenced_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(?:json)?\s*\n([\s\S]*?)\n\s*```").expect("fence regex"))
}

/// Parses JSON out of LLM output.
///
/// Models rarely return bare JSON, so the parser tries, in order: the whole
/// output, the first fenced code block, and the outermost `{...}` / `[...]`
/// slice.
pub struct JsonParser {
    extract: bool,
}

impl JsonParser {
    pub fn new() -> Self {
        Self { extract: true }
    }

    /// Parse the output verbatim, with no extraction fallbacks.
    pub fn strict() -> Self {
        Self { extract: false }
    }
}

impl Default for JsonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputParser for JsonParser {
    fn name(&self) -> &str {
        "json"
    }

    fn parse(&self, output: &str) -> Result<Value> {
        let trimmed = output.trim();
        if trimmed.is_empty() {
            return Err(ForgeError::Parse("empty output".into()));
        }

        match serde_json::from_str(trimmed) {
            Ok(value) => return Ok(value),
            Err(e) if !self.extract => {
                return Err(ForgeError::Parse(format!("invalid JSON: {e}")));
            }
            Err(_) => {}
        }

        if let Some(block) = fenced_block_re()
            .captures(trimmed)
            .and_then(|caps| caps.get(1))
        {
            if let Ok(value) = serde_json::from_str(block.as_str().trim()) {
                debug!("Extracted JSON from fenced code block");
                return Ok(value);
            }
        }

        for (open, close) in [('{', '}'), ('[', ']')] {
            if let Some(slice) = outermost_slice(trimmed, open, close) {
                if let Ok(value) = serde_json::from_str(slice) {
                    debug!("Extracted JSON from embedded {open}{close} slice");
                    return Ok(value);
                }
            }
        }

        Err(ForgeError::Parse(format!(
            "no valid JSON found in output ({} bytes)",
            output.len()
        )))
    }
}

/// Slice from the first `open` to the last `close`, if both exist in order.
fn outermost_slice(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_bare_json() {
        let parser = JsonParser::new();
        let value = parser.parse(r#"{"answer": 42}"#).unwrap();
        assert_eq!(value, json!({"answer": 42}));
    }

    #[test]
    fn test_parse_fenced_json() {
        let parser = JsonParser::new();
        let output = "Here is the result:\n```json\n{\"answer\": 42}\n```\nDone.";
        assert_eq!(parser.parse(output).unwrap(), json!({"answer": 42}));
    }

    #[test]
    fn test_parse_fence_without_language_tag() {
        let parser = JsonParser::new();
        let output = "```\n[1, 2, 3]\n```";
        assert_eq!(parser.parse(output).unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn test_parse_embedded_object() {
        let parser = JsonParser::new();
        let output = "Sure! The object is {\"name\": \"Ada\"} as requested.";
        assert_eq!(parser.parse(output).unwrap(), json!({"name": "Ada"}));
    }

    #[test]
    fn test_parse_failure() {
        let parser = JsonParser::new();
        let err = parser.parse("no structured data here").unwrap_err();
        assert!(matches!(err, ForgeError::Parse(_)));
    }

    #[test]
    fn test_empty_output() {
        let parser = JsonParser::new();
        assert!(matches!(
            parser.parse("   "),
            Err(ForgeError::Parse(msg)) if msg == "empty output"
        ));
    }

    #[test]
    fn test_strict_rejects_wrapped_json() {
        let parser = JsonParser::strict();
        assert!(parser.parse("prefix {\"a\": 1}").is_err());
        assert_eq!(parser.parse("{\"a\": 1}").unwrap(), json!({"a": 1}));
    }
}
