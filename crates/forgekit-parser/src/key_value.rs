use serde_json::{Map, Value};

use forgekit_core::error::{ForgeError, Result};
use forgekit_core::traits::OutputParser;

/// Parses line-oriented `key: value` output into a JSON object.
///
/// Lines without the separator are ignored, so surrounding prose does not
/// break parsing. Values are kept as strings.
pub struct KeyValueParser {
    separator: char,
}

impl KeyValueParser {
    pub fn new() -> Self {
        Self { separator: ':' }
    }

    pub fn with_separator(separator: char) -> Self {
        Self { separator }
    }
}

impl Default for KeyValueParser {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputParser for KeyValueParser {
    fn name(&self) -> &str {
        "key_value"
    }

    fn parse(&self, output: &str) -> Result<Value> {
        let mut map = Map::new();
        for line in output.lines() {
            if let Some((key, value)) = line.split_once(self.separator) {
                let key = key.trim();
                if key.is_empty() || key.contains(char::is_whitespace) {
                    continue;
                }
                map.insert(key.to_string(), Value::String(value.trim().to_string()));
            }
        }
        if map.is_empty() {
            return Err(ForgeError::Parse(format!(
                "no '{}'-separated pairs found in output",
                self.separator
            )));
        }
        Ok(Value::Object(map))
    }
}
