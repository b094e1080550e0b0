use std::cmp::Ordering;

use serde_json::Value;
use tracing::{debug, warn};

use forgekit_core::types::StateMap;

use crate::template::{extract_variables, substitute};

/// One section of a dynamic prompt, included or excluded per context.
#[derive(Debug, Clone)]
pub struct PromptComponent {
    content: String,
    name: Option<String>,
    conditions: Vec<(String, Value)>,
    weight: f64,
}

impl PromptComponent {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            name: None,
            conditions: Vec::new(),
            weight: 1.0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Include this component only when `context[key]` equals the value.
    /// Multiple conditions must all hold.
    pub fn when_equals(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((key.into(), value.into()));
        self
    }

    /// Importance weight; lower-weight components are dropped first when the
    /// assembled prompt exceeds the length budget.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn should_include(&self, context: &StateMap) -> bool {
        self.conditions
            .iter()
            .all(|(key, value)| context.get(key) == Some(value))
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }

    /// Substitute placeholders from the context. A component with missing
    /// variables is kept verbatim rather than rendered with holes.
    fn render(&self, context: &StateMap) -> String {
        let missing: Vec<String> = extract_variables(&self.content)
            .into_iter()
            .filter(|name| !context.contains_key(name))
            .collect();
        if missing.is_empty() {
            substitute(&self.content, context)
        } else {
            warn!(
                component = %self.label(),
                missing = ?missing,
                "Component has unresolved variables; keeping raw content"
            );
            self.content.clone()
        }
    }
}

struct RenderedComponent {
    label: String,
    weight: f64,
    text: String,
}

/// Assembles prompts from conditional components instead of one fixed
/// template string.
///
/// Components are selected against the context, rendered, joined between the
/// optional prefix and suffix, and truncated to `max_length` by dropping the
/// lowest-weight components first.
pub struct DynamicPromptGenerator {
    generator_id: String,
    components: Vec<PromptComponent>,
    prefix: Option<String>,
    suffix: Option<String>,
    separator: String,
    max_length: Option<usize>,
}

impl DynamicPromptGenerator {
    pub fn new(generator_id: impl Into<String>) -> Self {
        Self {
            generator_id: generator_id.into(),
            components: Vec::new(),
            prefix: None,
            suffix: None,
            separator: "\n\n".to_string(),
            max_length: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Cap the generated prompt at this many characters.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn id(&self) -> &str {
        &self.generator_id
    }

    pub fn add_component(&mut self, component: PromptComponent) {
        debug!(
            generator = %self.generator_id,
            component = %component.label(),
            "Added prompt component"
        );
        self.components.push(component);
    }

    /// Build a prompt for the given context.
    pub fn generate(&self, context: &StateMap) -> String {
        let mut rendered: Vec<RenderedComponent> = self
            .components
            .iter()
            .filter(|component| component.should_include(context))
            .map(|component| RenderedComponent {
                label: component.label().to_string(),
                weight: component.weight,
                text: component.render(context),
            })
            .collect();

        debug!(
            generator = %self.generator_id,
            selected = rendered.len(),
            total = self.components.len(),
            "Selected prompt components"
        );

        let prefix = self.prefix.as_deref().map(|p| substitute(p, context));
        let suffix = self.suffix.as_deref().map(|s| substitute(s, context));
        let mut prompt = self.assemble(&prefix, &rendered, &suffix);

        if let Some(max_length) = self.max_length {
            while prompt.chars().count() > max_length && !rendered.is_empty() {
                let lightest = rendered
                    .iter()
                    .enumerate()
                    .min_by(|a, b| {
                        a.1.weight
                            .partial_cmp(&b.1.weight)
                            .unwrap_or(Ordering::Equal)
                    })
                    .map(|(index, _)| index)
                    .unwrap_or(0);
                let removed = rendered.remove(lightest);
                debug!(
                    generator = %self.generator_id,
                    component = %removed.label,
                    weight = removed.weight,
                    "Dropped component to fit length budget"
                );
                prompt = self.assemble(&prefix, &rendered, &suffix);
            }

            if prompt.chars().count() > max_length {
                warn!(
                    generator = %self.generator_id,
                    length = prompt.chars().count(),
                    max_length,
                    "Prompt still over budget; hard-truncating"
                );
                prompt = prompt.chars().take(max_length).collect();
            }
        }

        prompt
    }

    fn assemble(
        &self,
        prefix: &Option<String>,
        rendered: &[RenderedComponent],
        suffix: &Option<String>,
    ) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(prefix) = prefix {
            parts.push(prefix);
        }
        parts.extend(rendered.iter().map(|component| component.text.as_str()));
        if let Some(suffix) = suffix {
            parts.push(suffix);
        }
        parts.join(&self.separator)
    }
}
