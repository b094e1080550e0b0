use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{debug, warn};

use forgekit_core::error::Result;
use forgekit_core::traits::{LlmProvider, OutputParser, Step, Tool};
use forgekit_core::types::{GenerationParams, StateMap};
use forgekit_prompt::PromptTemplate;

/// Step that formats a prompt from the run state, calls an LLM provider, and
/// writes the response back.
///
/// Writes `result_<id>` (response plus parsed output when a parser is set)
/// and `output_<id>` (the parsed value, or the raw text) into the state.
pub struct LlmStep {
    step_id: String,
    provider: Arc<dyn LlmProvider>,
    template: PromptTemplate,
    parser: Option<Arc<dyn OutputParser>>,
    context_keys: Vec<String>,
    params: GenerationParams,
}

impl LlmStep {
    pub fn new(
        step_id: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        template: PromptTemplate,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            provider,
            template,
            parser: None,
            context_keys: Vec::new(),
            params: GenerationParams::default(),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn OutputParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Limit the template's view of the state to these keys. With no keys
    /// set, the template sees the whole state map.
    pub fn with_context_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }
}

impl Step for LlmStep {
    fn name(&self) -> &str {
        &self.step_id
    }

    fn run(&self, mut state: StateMap) -> BoxFuture<'_, Result<StateMap>> {
        Box::pin(async move {
            let prompt = if self.context_keys.is_empty() {
                self.template.format(&state)?
            } else {
                let mut vars = StateMap::new();
                for key in &self.context_keys {
                    if let Some(value) = state.get(key) {
                        vars.insert(key.clone(), value.clone());
                    }
                }
                self.template.format(&vars)?
            };
            debug!(
                step = %self.step_id,
                provider = %self.provider.name(),
                "Calling LLM provider"
            );
            let response = self.provider.generate(&prompt, self.params.clone()).await?;

            let mut result = json!({ "response": response.clone() });
            let output = match &self.parser {
                Some(parser) => match parser.parse(&response) {
                    Ok(parsed) => {
                        result["parsed_output"] = parsed.clone();
                        parsed
                    }
                    Err(e) => {
                        // Keep the raw text; a malformed response is still a response
                        warn!(step = %self.step_id, error = %e, "Failed to parse LLM output");
                        Value::String(response)
                    }
                },
                None => Value::String(response),
            };

            state.insert(format!("result_{}", self.step_id), result);
            state.insert(format!("output_{}", self.step_id), output);
            Ok(state)
        })
    }
}

/// Step that invokes a tool with parameters mapped from the run state.
///
/// `params_map` maps tool parameter names to state keys; keys missing from
/// the state are simply omitted from the call.
pub struct ToolStep {
    step_id: String,
    tool: Arc<dyn Tool>,
    params_map: HashMap<String, String>,
}

impl ToolStep {
    pub fn new(step_id: impl Into<String>, tool: Arc<dyn Tool>) -> Self {
        Self {
            step_id: step_id.into(),
            tool,
            params_map: HashMap::new(),
        }
    }

    /// Map a tool parameter to the state key supplying its value.
    pub fn with_param(mut self, param: impl Into<String>, state_key: impl Into<String>) -> Self {
        self.params_map.insert(param.into(), state_key.into());
        self
    }
}

impl Step for ToolStep {
    fn name(&self) -> &str {
        &self.step_id
    }

    fn run(&self, mut state: StateMap) -> BoxFuture<'_, Result<StateMap>> {
        Box::pin(async move {
            let mut params = StateMap::new();
            for (param, state_key) in &self.params_map {
                if let Some(value) = state.get(state_key) {
                    params.insert(param.clone(), value.clone());
                }
            }

            debug!(step = %self.step_id, tool = %self.tool.name(), "Executing tool");
            let value = self.tool.execute(params).await?;

            state.insert(format!("result_{}", self.step_id), json!({ "result": value }));
            state.insert(format!("output_{}", self.step_id), value);
            Ok(state)
        })
    }
}
