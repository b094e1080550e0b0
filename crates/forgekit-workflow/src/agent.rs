use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{debug, warn};

use forgekit_core::error::{ForgeError, Result};
use forgekit_core::traits::{LlmProvider, OutputParser, Step, Tool};
use forgekit_core::types::{GenerationParams, StateMap};

/// Private store an agent keeps across actions: working values, a log of
/// past actions, and free-form observations.
#[derive(Debug, Default)]
pub struct AgentMemory {
    working: StateMap,
    history: Vec<Value>,
    observations: Vec<Value>,
}

impl AgentMemory {
    pub fn remember(&mut self, key: impl Into<String>, value: Value) {
        self.working.insert(key.into(), value);
    }

    pub fn recall(&self, key: &str) -> Option<&Value> {
        self.working.get(key)
    }

    pub fn record(&mut self, entry: Value) {
        self.history.push(entry);
    }

    pub fn observe(&mut self, observation: Value) {
        self.observations.push(observation);
    }

    pub fn history(&self) -> &[Value] {
        &self.history
    }

    pub fn observations(&self) -> &[Value] {
        &self.observations
    }
}

/// An actor that takes a context and produces an action result, keeping its
/// own memory between actions.
///
/// Unlike a [`Step`], an agent is not bound to a workflow graph; the
/// [`AgentStep`] adapter bridges the two.
pub trait Agent: Send + Sync + 'static {
    fn agent_id(&self) -> &str;

    fn description(&self) -> &str;

    /// Act on the context and return an action-result object.
    fn act(&self, context: StateMap) -> BoxFuture<'_, Result<Value>>;
}

fn lock_memory(memory: &Mutex<AgentMemory>) -> MutexGuard<'_, AgentMemory> {
    memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Agent backed by an LLM provider. Each action prompts the provider with
/// the context and the `task` entry, and is recorded in memory.
pub struct LlmAgent {
    agent_id: String,
    description: String,
    provider: Arc<dyn LlmProvider>,
    params: GenerationParams,
    memory: Mutex<AgentMemory>,
}

impl LlmAgent {
    pub fn new(agent_id: impl Into<String>, provider: Arc<dyn LlmProvider>) -> Self {
        let agent_id = agent_id.into();
        Self {
            description: format!("LLM agent {agent_id}"),
            agent_id,
            provider,
            params: GenerationParams::default(),
            memory: Mutex::new(AgentMemory::default()),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn memory(&self) -> MutexGuard<'_, AgentMemory> {
        lock_memory(&self.memory)
    }
}

impl Agent for LlmAgent {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn act(&self, context: StateMap) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let task = context
                .get("task")
                .map(|value| match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default();
            let prompt = format!(
                "Context: {}\nAgent: {}\nTask: {task}",
                Value::Object(context.clone()),
                self.agent_id,
            );

            debug!(agent = %self.agent_id, "Agent prompting LLM");
            let response = self.provider.generate(&prompt, self.params.clone()).await?;

            self.memory().record(json!({
                "prompt": prompt,
                "response": response,
                "timestamp": Utc::now().to_rfc3339(),
            }));

            Ok(json!({
                "action": "llm_response",
                "response": response,
                "agent_id": self.agent_id,
            }))
        })
    }
}

/// Agent that executes one of its registered tools, selected by the
/// `tool_name` context entry with parameters from `tool_params`.
pub struct ToolAgent {
    agent_id: String,
    description: String,
    tools: Vec<Arc<dyn Tool>>,
    memory: Mutex<AgentMemory>,
}

impl ToolAgent {
    pub fn new(agent_id: impl Into<String>) -> Self {
        let agent_id = agent_id.into();
        Self {
            description: format!("Tool agent {agent_id}"),
            agent_id,
            tools: Vec::new(),
            memory: Mutex::new(AgentMemory::default()),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn add_tool(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tool(&self, tool_name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == tool_name)
    }

    pub fn memory(&self) -> MutexGuard<'_, AgentMemory> {
        lock_memory(&self.memory)
    }
}

impl Agent for ToolAgent {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn act(&self, context: StateMap) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let tool_name = context
                .get("tool_name")
                .and_then(Value::as_str)
                .ok_or_else(|| ForgeError::ToolExecution {
                    tool: self.agent_id.clone(),
                    message: "missing 'tool_name' in agent context".into(),
                })?;

            let tool = self.tool(tool_name).ok_or_else(|| ForgeError::ToolExecution {
                tool: tool_name.to_string(),
                message: format!("not available to agent '{}'", self.agent_id),
            })?;

            let params = context
                .get("tool_params")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();

            debug!(agent = %self.agent_id, tool = %tool_name, "Agent executing tool");
            let result = tool.execute(params.clone()).await?;

            self.memory().record(json!({
                "tool": tool_name,
                "params": params,
                "result": result,
                "timestamp": Utc::now().to_rfc3339(),
            }));

            Ok(json!({
                "action": "tool_execution",
                "tool": tool_name,
                "result": result,
                "agent_id": self.agent_id,
            }))
        })
    }
}

/// Bridges an [`Agent`] into a workflow graph.
///
/// The agent sees a narrowed context (`current_step` plus the selected
/// keys); its action result lands in `result_<id>`, and `output_<id>` gets
/// the parsed output, the response, or the tool result, in that order.
pub struct AgentStep {
    step_id: String,
    agent: Arc<dyn Agent>,
    parser: Option<Arc<dyn OutputParser>>,
    context_keys: Vec<String>,
}

impl AgentStep {
    pub fn new(step_id: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        Self {
            step_id: step_id.into(),
            agent,
            parser: None,
            context_keys: Vec::new(),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn OutputParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// State keys forwarded into the agent's context.
    pub fn with_context_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}

impl Step for AgentStep {
    fn name(&self) -> &str {
        &self.step_id
    }

    fn run(&self, mut state: StateMap) -> BoxFuture<'_, Result<StateMap>> {
        Box::pin(async move {
            let mut agent_context = StateMap::new();
            agent_context.insert("current_step".into(), json!(self.step_id));
            for key in &self.context_keys {
                if let Some(value) = state.get(key) {
                    agent_context.insert(key.clone(), value.clone());
                }
            }

            debug!(
                step = %self.step_id,
                agent = %self.agent.agent_id(),
                "Running agent step"
            );
            let mut result = self.agent.act(agent_context).await?;

            if let Some(parser) = &self.parser {
                if let Some(response) = result.get("response").and_then(Value::as_str) {
                    match parser.parse(response) {
                        Ok(parsed) => {
                            result["parsed_output"] = parsed;
                        }
                        Err(e) => {
                            warn!(step = %self.step_id, error = %e, "Failed to parse agent output");
                        }
                    }
                }
            }

            let output = result
                .get("parsed_output")
                .or_else(|| result.get("response"))
                .or_else(|| result.get("result"))
                .cloned();

            state.insert(format!("result_{}", self.step_id), result);
            if let Some(output) = output {
                state.insert(format!("output_{}", self.step_id), output);
            }
            Ok(state)
        })
    }
}

#[cfg(test)]
mod tests {
    use forgekit_core::types::Generation;

    use crate::graph::WorkflowGraph;

    use super::*;

    struct EchoProvider;

    impl LlmProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        fn generate(&self, prompt: &str, _params: GenerationParams) -> BoxFuture<'_, Result<String>> {
            let text = format!("echo: {prompt}");
            Box::pin(async move { Ok(text) })
        }

        fn generate_with_metadata(
            &self,
            prompt: &str,
            params: GenerationParams,
        ) -> BoxFuture<'_, Result<Generation>> {
            let prompt = prompt.to_string();
            Box::pin(async move {
                let text = self.generate(&prompt, params).await?;
                Ok(Generation {
                    text,
                    model: "echo".into(),
                    prompt_tokens: None,
                    completion_tokens: None,
                    finish_reason: None,
                })
            })
        }
    }

    struct AdderTool;

    impl Tool for AdderTool {
        fn name(&self) -> &str {
            "adder"
        }

        fn description(&self) -> &str {
            "Adds 'a' and 'b'"
        }

        fn execute(&self, params: StateMap) -> BoxFuture<'_, Result<Value>> {
            Box::pin(async move {
                let a = params.get("a").and_then(Value::as_i64).unwrap_or(0);
                let b = params.get("b").and_then(Value::as_i64).unwrap_or(0);
                Ok(json!(a + b))
            })
        }
    }

    fn state(value: Value) -> StateMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_memory_remember_and_recall() {
        let mut memory = AgentMemory::default();
        memory.remember("goal", json!("summarize"));
        assert_eq!(memory.recall("goal"), Some(&json!("summarize")));
        assert_eq!(memory.recall("absent"), None);

        memory.observe(json!({"seen": true}));
        assert_eq!(memory.observations().len(), 1);
    }

    #[tokio::test]
    async fn test_llm_agent_act_records_history() {
        let agent = LlmAgent::new("writer", Arc::new(EchoProvider));
        let result = agent
            .act(state(json!({"task": "write a haiku"})))
            .await
            .unwrap();

        assert_eq!(result["action"], json!("llm_response"));
        assert_eq!(result["agent_id"], json!("writer"));
        assert!(result["response"]
            .as_str()
            .unwrap()
            .contains("Task: write a haiku"));

        let memory = agent.memory();
        assert_eq!(memory.history().len(), 1);
        assert!(memory.history()[0]["prompt"]
            .as_str()
            .unwrap()
            .starts_with("Context:"));
    }

    #[tokio::test]
    async fn test_tool_agent_executes_named_tool() {
        let agent = ToolAgent::new("calc").with_tool(Arc::new(AdderTool));
        let result = agent
            .act(state(json!({
                "tool_name": "adder",
                "tool_params": {"a": 2, "b": 3},
            })))
            .await
            .unwrap();

        assert_eq!(result["action"], json!("tool_execution"));
        assert_eq!(result["result"], json!(5));
        assert_eq!(agent.memory().history().len(), 1);
    }

    #[tokio::test]
    async fn test_tool_agent_requires_tool_name() {
        let agent = ToolAgent::new("calc").with_tool(Arc::new(AdderTool));
        let err = agent.act(StateMap::new()).await.unwrap_err();
        assert!(matches!(err, ForgeError::ToolExecution { message, .. }
            if message.contains("tool_name")));
    }

    #[tokio::test]
    async fn test_tool_agent_unknown_tool() {
        let agent = ToolAgent::new("calc");
        let err = agent
            .act(state(json!({"tool_name": "adder"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::ToolExecution { tool, .. } if tool == "adder"));
    }

    #[tokio::test]
    async fn test_agent_step_in_workflow() {
        let agent = Arc::new(LlmAgent::new("writer", Arc::new(EchoProvider)));
        let step = AgentStep::new("draft", agent).with_context_keys(["task"]);

        let mut graph = WorkflowGraph::new("agentic");
        graph.add_step(step);

        let context = graph
            .run(state(json!({"task": "draft a reply", "secret": "hidden"})))
            .await
            .unwrap();

        let result = context.get("result_draft").unwrap();
        assert_eq!(result["action"], json!("llm_response"));
        // Only the selected keys reach the agent
        let response = result["response"].as_str().unwrap();
        assert!(response.contains("draft a reply"));
        assert!(!response.contains("hidden"));
        assert!(context.get("output_draft").is_some());
    }

    #[tokio::test]
    async fn test_agent_step_keeps_response_when_parse_fails() {
        struct FailingParser;
        impl OutputParser for FailingParser {
            fn name(&self) -> &str {
                "failing"
            }
            fn parse(&self, _output: &str) -> Result<Value> {
                Err(ForgeError::Parse("nope".into()))
            }
        }

        let agent = Arc::new(LlmAgent::new("writer", Arc::new(EchoProvider)));
        let step = AgentStep::new("draft", agent).with_parser(Arc::new(FailingParser));

        let out = step.run(StateMap::new()).await.unwrap();
        assert!(out["result_draft"].get("parsed_output").is_none());
        assert_eq!(out["output_draft"], out["result_draft"]["response"]);
    }
}
