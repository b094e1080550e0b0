use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ForgeError, Result};

/// Top-level forgekit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgeConfig {
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub generation: GenerationDefaults,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            anthropic_api_key: None,
            openai_base_url: default_openai_base_url(),
            retry: RetryConfig::default(),
            generation: GenerationDefaults::default(),
        }
    }
}

/// Retry policy for provider requests. The workflow engine itself never
/// retries; this applies only inside provider implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Default sampling parameters applied when a step does not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationDefaults {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl ForgeConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ForgeError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| ForgeError::Config(format!("invalid config {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Build configuration from environment variables alone.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay environment variables onto this configuration.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            debug!("Using OPENAI_API_KEY from environment");
            self.openai_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            debug!("Using ANTHROPIC_API_KEY from environment");
            self.anthropic_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            self.openai_base_url = url;
        }
    }

    /// Load configuration: the given file, or `./forgekit.toml` if present,
    /// or defaults. Environment variables override file values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Path::new("forgekit.toml");
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = ForgeConfig::default();
        assert_eq!(config.openai_base_url, "https://api.openai.com/v1");
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_backoff_ms, 1000);
        assert_eq!(config.generation.request_timeout_secs, 30);
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn test_from_file() {
        let toml_content = r#"
openai_api_key = "sk-test"
openai_base_url = "http://localhost:8080/v1"

[retry]
max_retries = 5

[generation]
temperature = 0.2
max_tokens = 256
"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(toml_content.as_bytes()).unwrap();

        let config = ForgeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.openai_base_url, "http://localhost:8080/v1");
        assert_eq!(config.retry.max_retries, 5);
        // Unspecified fields fall back to defaults
        assert_eq!(config.retry.initial_backoff_ms, 1000);
        assert_eq!(config.generation.max_tokens, Some(256));
    }

    #[test]
    fn test_from_file_missing() {
        let err = ForgeConfig::from_file("/nonexistent/forgekit.toml").unwrap_err();
        assert!(matches!(err, ForgeError::Config(_)));
    }

    #[test]
    fn test_from_file_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"retry = \"not a table\"").unwrap();
        let err = ForgeConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ForgeError::Config(_)));
    }
}
