use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use forgekit_core::error::Result;
use forgekit_core::traits::Step;
use forgekit_core::types::StateMap;

/// Lifecycle of a step within one run. Only the terminal statuses end up in
/// the result ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Outcome of one step execution.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn completed(step_id: impl Into<String>, output: Option<Value>) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Completed,
            output,
            error: None,
        }
    }

    pub fn failed(step_id: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Failed,
            output: None,
            error: Some(error.to_string()),
        }
    }

    pub fn success(&self) -> bool {
        self.status == StepStatus::Completed
    }
}

/// A step backed by a plain function, for steps with no external calls.
pub struct FnStep {
    name: String,
    #[allow(clippy::type_complexity)]
    func: Arc<dyn Fn(StateMap) -> Result<StateMap> + Send + Sync>,
}

impl FnStep {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(StateMap) -> Result<StateMap> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl Step for FnStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, state: StateMap) -> BoxFuture<'_, Result<StateMap>> {
        let func = Arc::clone(&self.func);
        Box::pin(async move { func(state) })
    }
}
