use std::collections::HashMap;

use tracing::info;

use forgekit_core::error::{ForgeError, Result};
use forgekit_core::types::StateMap;

use crate::graph::WorkflowGraph;

/// Registry of workflows and the entry point for executing them by id.
pub struct WorkflowEngine {
    workflows: HashMap<String, WorkflowGraph>,
}

impl WorkflowEngine {
    pub fn new() -> Self {
        Self {
            workflows: HashMap::new(),
        }
    }

    /// Register a workflow under its id, silently replacing any previous
    /// registration for the same id.
    pub fn register_workflow(&mut self, workflow: WorkflowGraph) {
        info!(workflow = %workflow.workflow_id(), "Registered workflow");
        self.workflows
            .insert(workflow.workflow_id().to_string(), workflow);
    }

    pub fn workflow(&self, workflow_id: &str) -> Option<&WorkflowGraph> {
        self.workflows.get(workflow_id)
    }

    pub fn workflow_ids(&self) -> Vec<&str> {
        self.workflows.keys().map(String::as_str).collect()
    }

    /// Execute a registered workflow and return its final state.
    ///
    /// An unknown id fails with [`ForgeError::WorkflowNotFound`], which is
    /// distinct from every execution error: callers can tell "never ran"
    /// from "ran and failed".
    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        initial_state: StateMap,
    ) -> Result<StateMap> {
        let workflow = self
            .workflows
            .get(workflow_id)
            .ok_or_else(|| ForgeError::WorkflowNotFound(workflow_id.to_string()))?;

        info!(workflow = %workflow_id, "Executing workflow");
        let context = workflow.run(initial_state).await?;
        Ok(context.into_state())
    }
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use forgekit_core::types::StateMap;

    use crate::step::FnStep;

    use super::*;

    #[tokio::test]
    async fn test_execute_registered_workflow() {
        let mut graph = WorkflowGraph::new("hello");
        graph.add_step(FnStep::new("greet", |mut state: StateMap| {
            state.insert("greeting".into(), json!("hi"));
            Ok(state)
        }));

        let mut engine = WorkflowEngine::new();
        engine.register_workflow(graph);

        let final_state = engine
            .execute_workflow("hello", StateMap::new())
            .await
            .unwrap();
        assert_eq!(final_state.get("greeting"), Some(&json!("hi")));
    }

    #[tokio::test]
    async fn test_unknown_workflow() {
        let engine = WorkflowEngine::new();
        let err = engine
            .execute_workflow("ghost", StateMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::WorkflowNotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_reregistration_replaces() {
        let mut engine = WorkflowEngine::new();

        let mut first = WorkflowGraph::new("w");
        first.add_step(FnStep::new("v", |mut state: StateMap| {
            state.insert("version".into(), json!(1));
            Ok(state)
        }));
        let mut second = WorkflowGraph::new("w");
        second.add_step(FnStep::new("v", |mut state: StateMap| {
            state.insert("version".into(), json!(2));
            Ok(state)
        }));

        engine.register_workflow(first);
        engine.register_workflow(second);
        assert_eq!(engine.workflow_ids(), vec!["w"]);

        let final_state = engine.execute_workflow("w", StateMap::new()).await.unwrap();
        assert_eq!(final_state.get("version"), Some(&json!(2)));
    }
}
