//! Graph-based workflow execution for LLM pipelines.
//!
//! Steps are named units of work composed into a dependency graph; edges may
//! carry runtime conditions evaluated against the shared state map. A
//! round-based scheduler executes every step whose prerequisites are
//! satisfied until the workflow completes, deadlocks, or a step fails.

pub mod agent;
pub mod condition;
pub mod context;
pub mod engine;
pub mod graph;
pub mod step;
pub mod steps;
pub mod template;

pub use agent::{Agent, AgentMemory, AgentStep, LlmAgent, ToolAgent};
pub use condition::Condition;
pub use context::{ExecutionContext, HistoryAction, HistoryEntry};
pub use engine::WorkflowEngine;
pub use graph::WorkflowGraph;
pub use step::{FnStep, StepResult, StepStatus};
pub use steps::{LlmStep, ToolStep};
pub use template::{StepFactory, StepFactorySet, WorkflowTemplate};
