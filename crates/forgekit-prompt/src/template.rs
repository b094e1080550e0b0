use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;
use tracing::debug;

use forgekit_core::error::{ForgeError, Result};
use forgekit_core::types::StateMap;

/// Matches `$var` and `${var}` placeholders.
fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
            .expect("placeholder regex")
    })
}

/// String prompt template with `$var` / `${var}` placeholders, filled from a
/// workflow state map.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template_id: String,
    text: String,
    variables: Vec<String>,
}

impl PromptTemplate {
    pub fn new(template_id: impl Into<String>, text: impl Into<String>) -> Self {
        let template_id = template_id.into();
        let text = text.into();
        let variables = extract_variables(&text);
        debug!(
            template = %template_id,
            variables = variables.len(),
            "Created prompt template"
        );
        Self {
            template_id,
            text,
            variables,
        }
    }

    pub fn id(&self) -> &str {
        &self.template_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Variable names in order of first appearance.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Substitute every placeholder from `vars`. Fails listing every missing
    /// variable, so callers see the whole gap at once.
    pub fn format(&self, vars: &StateMap) -> Result<String> {
        let missing: Vec<String> = self
            .variables
            .iter()
            .filter(|name| !vars.contains_key(*name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ForgeError::MissingVariables {
                template: self.template_id.clone(),
                missing,
            });
        }

        Ok(substitute(&self.text, vars))
    }
}

/// Replace every placeholder whose variable is present; absent ones render
/// empty.
pub(crate) fn substitute(text: &str, vars: &StateMap) -> String {
    placeholder_re()
        .replace_all(text, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or("");
            vars.get(name).map(render_value).unwrap_or_default()
        })
        .into_owned()
}

/// String values substitute bare; everything else as compact JSON.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn extract_variables(text: &str) -> Vec<String> {
    let mut variables = Vec::new();
    for caps in placeholder_re().captures_iter(text) {
        if let Some(name) = caps.get(1).or_else(|| caps.get(2)) {
            let name = name.as_str().to_string();
            if !variables.contains(&name) {
                variables.push(name);
            }
        }
    }
    variables
}
