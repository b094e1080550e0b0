use std::collections::HashMap;

use tracing::debug;

use forgekit_core::error::{ForgeError, Result};
use forgekit_core::types::StateMap;

use crate::template::PromptTemplate;

/// Registry of named prompt templates shared across workflows.
pub struct PromptLibrary {
    templates: HashMap<String, PromptTemplate>,
}

impl PromptLibrary {
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Register a template under its id, replacing any previous one.
    pub fn register(&mut self, template: PromptTemplate) {
        debug!(template = %template.id(), "Registered prompt template");
        self.templates.insert(template.id().to_string(), template);
    }

    pub fn get(&self, template_id: &str) -> Result<&PromptTemplate> {
        self.templates
            .get(template_id)
            .ok_or_else(|| ForgeError::TemplateNotFound(template_id.to_string()))
    }

    /// Format a registered template in one call.
    pub fn format(&self, template_id: &str, vars: &StateMap) -> Result<String> {
        self.get(template_id)?.format(vars)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}
