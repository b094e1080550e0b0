use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::Result;
use crate::types::{Generation, GenerationParams, StateMap};

/// A named unit of work operating on shared workflow state.
///
/// A step either fully succeeds and returns the updated state map, or fails
/// and returns nothing; it never hands back a partially mutated map.
pub trait Step: Send + Sync + 'static {
    /// Unique name within a workflow graph.
    fn name(&self) -> &str;

    /// Consume the current state and produce the updated state.
    fn run(&self, state: StateMap) -> BoxFuture<'_, Result<StateMap>>;
}

/// LLM text generation backend.
pub trait LlmProvider: Send + Sync + 'static {
    /// Provider name (e.g., "openai").
    fn name(&self) -> &str;

    /// Generate a completion for the prompt.
    fn generate(&self, prompt: &str, params: GenerationParams) -> BoxFuture<'_, Result<String>>;

    /// Generate a completion along with provider metadata (model, token usage).
    fn generate_with_metadata(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> BoxFuture<'_, Result<Generation>>;
}

/// External capability a workflow step may invoke.
pub trait Tool: Send + Sync + 'static {
    /// Tool name.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Execute the tool with the given parameters.
    fn execute(&self, params: StateMap) -> BoxFuture<'_, Result<Value>>;
}

/// Converts raw LLM output into a structured value.
pub trait OutputParser: Send + Sync + 'static {
    /// Parser name.
    fn name(&self) -> &str;

    /// Parse the raw output.
    fn parse(&self, output: &str) -> Result<Value>;
}
