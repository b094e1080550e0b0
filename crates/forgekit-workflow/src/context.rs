use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use forgekit_core::types::StateMap;

use crate::step::{StepResult, StepStatus};

/// One mutation of the context, recorded as it happened.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub action: HistoryAction,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HistoryAction {
    StateSet { key: String },
    StateUpdate { keys: Vec<String> },
    StepRecorded { step_id: String, status: StepStatus },
    WorkflowCompleted,
}

/// Per-run container for shared state, step results, and the event history.
///
/// Created fresh for every `run` and never reused. History is append-only
/// while the run is in flight.
#[derive(Debug)]
pub struct ExecutionContext {
    workflow_id: String,
    run_id: Uuid,
    state: StateMap,
    step_results: BTreeMap<String, StepResult>,
    history: Vec<HistoryEntry>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl ExecutionContext {
    pub fn new(workflow_id: impl Into<String>, initial_state: StateMap) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: Uuid::new_v4(),
            state: initial_state,
            step_results: BTreeMap::new(),
            history: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> &StateMap {
        &self.state
    }

    /// Swap in a step's returned state. Scheduler-only; individual key
    /// changes made inside a step are not itemized in history.
    pub(crate) fn replace_state(&mut self, state: StateMap) {
        self.state = state;
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.state.insert(key.clone(), value);
        self.record(HistoryAction::StateSet { key });
    }

    /// Bulk-merge updates into the state.
    pub fn update(&mut self, updates: StateMap) {
        let keys: Vec<String> = updates.keys().cloned().collect();
        for (key, value) in updates {
            self.state.insert(key, value);
        }
        self.record(HistoryAction::StateUpdate { keys });
    }

    pub fn record_step_result(&mut self, result: StepResult) {
        let step_id = result.step_id.clone();
        let status = result.status;
        self.step_results.insert(step_id.clone(), result);
        self.record(HistoryAction::StepRecorded { step_id, status });
    }

    pub fn step_result(&self, step_id: &str) -> Option<&StepResult> {
        self.step_results.get(step_id)
    }

    pub fn step_results(&self) -> &BTreeMap<String, StepResult> {
        &self.step_results
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Mark the run finished.
    pub fn complete(&mut self) {
        self.finished_at = Some(Utc::now());
        self.record(HistoryAction::WorkflowCompleted);
    }

    pub fn completed(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Elapsed time so far, or total run time once completed.
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at.unwrap_or_else(Utc::now) - self.started_at
    }

    /// Snapshot of the whole context as a JSON value.
    pub fn summary(&self) -> Value {
        json!({
            "workflow_id": self.workflow_id,
            "run_id": self.run_id.to_string(),
            "state": Value::Object(self.state.clone()),
            "step_results": self.step_results,
            "started_at": self.started_at.to_rfc3339(),
            "finished_at": self.finished_at.map(|t| t.to_rfc3339()),
            "duration_ms": self.duration().num_milliseconds(),
            "completed": self.completed(),
        })
    }

    /// Consume the context, keeping only the final state map.
    pub fn into_state(self) -> StateMap {
        self.state
    }

    fn record(&mut self, action: HistoryAction) {
        self.history.push(HistoryEntry {
            action,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_set_get_and_history() {
        let mut context = ExecutionContext::new("w", StateMap::new());
        context.set("route", json!("left"));
        assert_eq!(context.get("route"), Some(&json!("left")));
        assert_eq!(context.history().len(), 1);
        assert!(matches!(
            &context.history()[0].action,
            HistoryAction::StateSet { key } if key == "route"
        ));
    }

    #[test]
    fn test_bulk_update() {
        let mut context = ExecutionContext::new("w", StateMap::new());
        let updates = json!({"a": 1, "b": 2}).as_object().cloned().unwrap();
        context.update(updates);
        assert_eq!(context.get("a"), Some(&json!(1)));
        assert_eq!(context.get("b"), Some(&json!(2)));
        assert!(matches!(
            &context.history()[0].action,
            HistoryAction::StateUpdate { keys } if keys.len() == 2
        ));
    }

    #[test]
    fn test_record_step_result() {
        let mut context = ExecutionContext::new("w", StateMap::new());
        context.record_step_result(crate::step::StepResult::completed("a", None));
        assert!(context.step_result("a").unwrap().success());
        assert!(context.step_result("b").is_none());
    }

    #[test]
    fn test_history_carries_step_status() {
        let mut context = ExecutionContext::new("w", StateMap::new());
        context.record_step_result(crate::step::StepResult::completed("a", None));
        context.record_step_result(crate::step::StepResult::failed("b", "boom"));

        assert!(matches!(
            &context.history()[0].action,
            HistoryAction::StepRecorded { step_id, status: StepStatus::Completed } if step_id == "a"
        ));
        assert!(matches!(
            &context.history()[1].action,
            HistoryAction::StepRecorded { step_id, status: StepStatus::Failed } if step_id == "b"
        ));
    }

    #[test]
    fn test_complete_sets_finished() {
        let mut context = ExecutionContext::new("w", StateMap::new());
        assert!(!context.completed());
        context.complete();
        assert!(context.completed());
        assert!(context.duration() >= chrono::Duration::zero());
        assert!(matches!(
            context.history().last().unwrap().action,
            HistoryAction::WorkflowCompleted
        ));
    }

    #[test]
    fn test_summary_shape() {
        let mut context =
            ExecutionContext::new("w", json!({"k": "v"}).as_object().cloned().unwrap());
        context.record_step_result(crate::step::StepResult::completed("a", Some(json!(1))));
        context.complete();

        let summary = context.summary();
        assert_eq!(summary["workflow_id"], "w");
        assert_eq!(summary["state"]["k"], "v");
        assert_eq!(summary["step_results"]["a"]["status"], "completed");
        assert_eq!(summary["completed"], true);
        assert!(summary["run_id"].is_string());
    }
}
