use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForgeError {
    // Structural errors (graph/template build time)
    #[error("step '{step}' not found in workflow '{workflow}'")]
    StepNotFound { workflow: String, step: String },

    #[error("step type '{0}' not found in factories")]
    UnknownStepType(String),

    // Engine errors
    #[error("workflow '{0}' not registered")]
    WorkflowNotFound(String),

    // Execution errors
    #[error("workflow '{workflow}' deadlocked: {} steps pending, none ready: {}", pending.len(), pending.join(", "))]
    Deadlock {
        workflow: String,
        pending: Vec<String>,
        completed: Vec<String>,
    },

    #[error("workflow '{workflow}' failed at step '{step}': {message}")]
    StepExecution {
        workflow: String,
        step: String,
        message: String,
        /// Context summary at the moment of failure (state + completed results).
        context: Box<serde_json::Value>,
    },

    // Prompt errors
    #[error("prompt template '{template}' missing variables: {}", missing.join(", "))]
    MissingVariables {
        template: String,
        missing: Vec<String>,
    },

    #[error("prompt template '{0}' not found")]
    TemplateNotFound(String),

    // Parser errors
    #[error("parse error: {0}")]
    Parse(String),

    // LLM provider errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM authentication failed: {0}")]
    LlmAuth(String),

    #[error("LLM rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },

    // Tool errors
    #[error("tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    // Config errors
    #[error("config error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadlock_display_names_stuck_steps() {
        let err = ForgeError::Deadlock {
            workflow: "w".into(),
            pending: vec!["a".into(), "b".into()],
            completed: vec![],
        };
        let text = err.to_string();
        assert!(text.contains("2 steps pending"));
        assert!(text.contains("a, b"));
    }

    #[test]
    fn test_step_execution_display_names_step() {
        let err = ForgeError::StepExecution {
            workflow: "w".into(),
            step: "extract".into(),
            message: "boom".into(),
            context: Box::new(serde_json::json!({})),
        };
        assert!(err.to_string().contains("failed at step 'extract'"));
    }
}
