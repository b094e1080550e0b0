use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};

use forgekit_core::error::{ForgeError, Result};
use forgekit_core::traits::Step;
use forgekit_core::types::StateMap;

use crate::condition::Condition;
use crate::context::ExecutionContext;
use crate::step::StepResult;

/// A workflow: named steps plus dependency edges, some gated by runtime
/// conditions.
///
/// Built once, then executed any number of times; `run` never mutates the
/// graph, so concurrent runs with separate contexts are safe as long as the
/// step implementations are reentrant.
pub struct WorkflowGraph {
    workflow_id: String,
    name: String,
    description: Option<String>,
    steps: BTreeMap<String, Arc<dyn Step>>,
    /// step name -> names it depends on
    dependencies: BTreeMap<String, BTreeSet<String>>,
    /// dependent -> prerequisite -> conditions on that edge
    conditions: BTreeMap<String, BTreeMap<String, Vec<Condition>>>,
}

impl fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("workflow_id", &self.workflow_id)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .field("dependencies", &self.dependencies)
            .field("conditions", &self.conditions)
            .finish()
    }
}

impl WorkflowGraph {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        let workflow_id = workflow_id.into();
        Self {
            name: workflow_id.clone(),
            workflow_id,
            description: None,
            steps: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            conditions: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Register a step under its name. Re-adding a name replaces the step
    /// and clears its prerequisites, matching `add_step` on a fresh name.
    pub fn add_step(&mut self, step: impl Step) {
        self.add_step_arc(Arc::new(step));
    }

    pub fn add_step_arc(&mut self, step: Arc<dyn Step>) {
        let name = step.name().to_string();
        self.dependencies.insert(name.clone(), BTreeSet::new());
        self.conditions.remove(&name);
        self.steps.insert(name, step);
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.keys().map(String::as_str).collect()
    }

    /// Declare that `step` cannot run until `depends_on` has completed.
    pub fn add_dependency(&mut self, step: &str, depends_on: &str) -> Result<()> {
        self.add_dependency_with(step, depends_on, Vec::new())
    }

    /// Like [`add_dependency`](Self::add_dependency), with conditions that
    /// must also hold against the run state before `step` becomes ready.
    pub fn add_dependency_with(
        &mut self,
        step: &str,
        depends_on: &str,
        conditions: Vec<Condition>,
    ) -> Result<()> {
        if !self.steps.contains_key(step) {
            return Err(ForgeError::StepNotFound {
                workflow: self.workflow_id.clone(),
                step: step.to_string(),
            });
        }
        if !self.steps.contains_key(depends_on) {
            return Err(ForgeError::StepNotFound {
                workflow: self.workflow_id.clone(),
                step: depends_on.to_string(),
            });
        }

        self.dependencies
            .entry(step.to_string())
            .or_default()
            .insert(depends_on.to_string());

        if !conditions.is_empty() {
            self.conditions
                .entry(step.to_string())
                .or_default()
                .entry(depends_on.to_string())
                .or_default()
                .extend(conditions);
        }
        Ok(())
    }

    /// Steps with no prerequisites. Derived from the edge set on every call,
    /// so it can never drift out of sync with the dependencies.
    pub fn start_steps(&self) -> BTreeSet<&str> {
        self.steps
            .keys()
            .filter(|name| {
                self.dependencies
                    .get(*name)
                    .map_or(true, |deps| deps.is_empty())
            })
            .map(String::as_str)
            .collect()
    }

    /// Steps nothing else depends on. Derived, like [`start_steps`](Self::start_steps).
    pub fn end_steps(&self) -> BTreeSet<&str> {
        self.steps
            .keys()
            .filter(|name| {
                !self
                    .dependencies
                    .values()
                    .any(|deps| deps.contains(name.as_str()))
            })
            .map(String::as_str)
            .collect()
    }

    /// Execute the workflow to completion against a fresh context.
    ///
    /// Round-based: each round collects every pending step whose
    /// prerequisites are completed and whose edge conditions hold, then runs
    /// them sequentially in name order; a step sees all writes from earlier
    /// steps in its round. The first failing step aborts the run. A round
    /// with pending steps but an empty ready set is a deadlock.
    pub async fn run(&self, initial_state: StateMap) -> Result<ExecutionContext> {
        let mut context = ExecutionContext::new(&self.workflow_id, initial_state);
        let mut pending: BTreeSet<String> = self.steps.keys().cloned().collect();
        let mut completed: BTreeSet<String> = BTreeSet::new();

        info!(
            workflow = %self.workflow_id,
            run = %context.run_id(),
            steps = pending.len(),
            "Starting workflow"
        );

        let mut round = 0u32;
        while !pending.is_empty() {
            let ready: Vec<String> = pending
                .iter()
                .filter(|name| self.dependencies_satisfied(name, &completed, context.state()))
                .cloned()
                .collect();

            if ready.is_empty() {
                error!(
                    workflow = %self.workflow_id,
                    stuck = ?pending,
                    "Workflow deadlocked; no pending step is ready"
                );
                return Err(ForgeError::Deadlock {
                    workflow: self.workflow_id.clone(),
                    pending: pending.into_iter().collect(),
                    completed: completed.into_iter().collect(),
                });
            }

            round += 1;
            debug!(workflow = %self.workflow_id, round, ready = ready.len(), "Computed ready set");

            for name in ready {
                let step = &self.steps[&name];
                debug!(workflow = %self.workflow_id, step = %name, "Executing step");

                // The step consumes a clone so the pre-step state survives
                // into the failure snapshot.
                match step.run(context.state().clone()).await {
                    Ok(updated) => {
                        context.replace_state(updated);
                        let output = context.get(&format!("output_{name}")).cloned();
                        context.record_step_result(StepResult::completed(&name, output));
                        pending.remove(&name);
                        completed.insert(name.clone());
                        info!(workflow = %self.workflow_id, step = %name, "Step completed");
                    }
                    Err(e) => {
                        context.record_step_result(StepResult::failed(&name, &e));
                        error!(workflow = %self.workflow_id, step = %name, error = %e, "Step failed");
                        return Err(ForgeError::StepExecution {
                            workflow: self.workflow_id.clone(),
                            step: name,
                            message: e.to_string(),
                            context: Box::new(context.summary()),
                        });
                    }
                }
            }
        }

        context.complete();
        info!(
            workflow = %self.workflow_id,
            run = %context.run_id(),
            duration_ms = context.duration().num_milliseconds(),
            "Workflow completed"
        );
        Ok(context)
    }

    fn dependencies_satisfied(
        &self,
        step: &str,
        completed: &BTreeSet<String>,
        state: &StateMap,
    ) -> bool {
        let Some(prerequisites) = self.dependencies.get(step) else {
            return true;
        };
        for prerequisite in prerequisites {
            if !completed.contains(prerequisite) {
                return false;
            }
            if let Some(conditions) = self
                .conditions
                .get(step)
                .and_then(|edges| edges.get(prerequisite))
            {
                if !conditions.iter().all(|c| c.is_satisfied(state)) {
                    return false;
                }
            }
        }
        true
    }
}
