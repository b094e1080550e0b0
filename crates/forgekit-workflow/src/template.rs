use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use forgekit_core::error::{ForgeError, Result};
use forgekit_core::traits::Step;

use crate::condition::Condition;
use crate::graph::WorkflowGraph;

/// Constructs a step from its id and the template-supplied config.
pub type StepFactory = Box<dyn Fn(&str, &Value) -> Result<Arc<dyn Step>> + Send + Sync>;

/// Named step constructors, looked up by step-type at instantiation time.
pub struct StepFactorySet {
    factories: HashMap<String, StepFactory>,
}

impl StepFactorySet {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, step_type: impl Into<String>, factory: F)
    where
        F: Fn(&str, &Value) -> Result<Arc<dyn Step>> + Send + Sync + 'static,
    {
        self.factories.insert(step_type.into(), Box::new(factory));
    }

    fn get(&self, step_type: &str) -> Result<&StepFactory> {
        self.factories
            .get(step_type)
            .ok_or_else(|| ForgeError::UnknownStepType(step_type.to_string()))
    }
}

impl Default for StepFactorySet {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
struct StepDefinition {
    step_id: String,
    step_type: String,
    config: Value,
}

#[derive(Debug, Clone)]
struct DependencyDefinition {
    step_id: String,
    depends_on: String,
    conditions: Vec<Condition>,
}

/// Declarative description of a workflow, unbound to concrete steps.
///
/// A template records step definitions (id, type, config) and dependency
/// definitions, then `instantiate` builds a fresh graph through a factory
/// set, so one template can produce many parameterized workflow instances.
pub struct WorkflowTemplate {
    template_id: String,
    name: String,
    description: Option<String>,
    steps: Vec<StepDefinition>,
    dependencies: Vec<DependencyDefinition>,
}

impl WorkflowTemplate {
    pub fn new(template_id: impl Into<String>) -> Self {
        let template_id = template_id.into();
        Self {
            name: template_id.clone(),
            template_id,
            description: None,
            steps: Vec::new(),
            dependencies: Vec::new(),
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

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    pub fn add_step_definition(
        &mut self,
        step_id: impl Into<String>,
        step_type: impl Into<String>,
        config: Value,
    ) {
        self.steps.push(StepDefinition {
            step_id: step_id.into(),
            step_type: step_type.into(),
            config,
        });
    }

    pub fn add_dependency_definition(
        &mut self,
        step_id: impl Into<String>,
        depends_on: impl Into<String>,
        conditions: Vec<Condition>,
    ) {
        self.dependencies.push(DependencyDefinition {
            step_id: step_id.into(),
            depends_on: depends_on.into(),
            conditions,
        });
    }

    /// Build a concrete workflow from this template.
    ///
    /// Each step definition is constructed through the factory registered
    /// for its type (unknown type is a structural error), then the
    /// dependency definitions are replayed onto the new graph.
    pub fn instantiate(
        &self,
        workflow_id: impl Into<String>,
        factories: &StepFactorySet,
    ) -> Result<WorkflowGraph> {
        let workflow_id = workflow_id.into();
        debug!(
            template = %self.template_id,
            workflow = %workflow_id,
            "Instantiating workflow from template"
        );

        let mut graph = WorkflowGraph::new(workflow_id).with_name(&self.name);
        if let Some(description) = &self.description {
            graph = graph.with_description(description);
        }

        for definition in &self.steps {
            let factory = factories.get(&definition.step_type)?;
            let step = factory(&definition.step_id, &definition.config)?;
            graph.add_step_arc(step);
        }

        for definition in &self.dependencies {
            graph.add_dependency_with(
                &definition.step_id,
                &definition.depends_on,
                definition.conditions.clone(),
            )?;
        }

        Ok(graph)
    }
}
