use serde::{Deserialize, Serialize};

/// Shared mutable state for one workflow run, passed through every step.
pub type StateMap = serde_json::Map<String, serde_json::Value>;

/// Sampling parameters for a generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: None,
            temperature: default_temperature(),
        }
    }
}

/// A completion plus the provider metadata that came with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub model: String,
    #[serde(default)]
    pub prompt_tokens: Option<u32>,
    #[serde(default)]
    pub completion_tokens: Option<u32>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}
