use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use forgekit_core::config::ForgeConfig;
use forgekit_core::error::{ForgeError, Result};
use forgekit_core::traits::LlmProvider;
use forgekit_core::types::{Generation, GenerationParams};

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI-compatible chat-completions provider.
///
/// Works against api.openai.com or any server speaking the same protocol via
/// `openai_base_url`.
#[derive(Debug)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatRequestMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatRequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl OpenAiProvider {
    pub fn new(config: &ForgeConfig) -> Result<Self> {
        Self::with_model(config, DEFAULT_MODEL)
    }

    pub fn with_model(config: &ForgeConfig, model: impl Into<String>) -> Result<Self> {
        let api_key = config.openai_api_key.clone().ok_or_else(|| {
            ForgeError::LlmAuth(
                "OpenAI API key not set; configure openai_api_key or OPENAI_API_KEY".into(),
            )
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.generation.request_timeout_secs))
            .build()
            .map_err(|e| ForgeError::LlmRequest(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, prompt: &str, params: &GenerationParams) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatRequestMessage {
                role: "user",
                content: prompt,
            }],
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        debug!(model = %self.model, url = %url, "Sending chat completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ForgeError::LlmRequest(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&text)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| format!("status {status}"));

            return Err(match status.as_u16() {
                401 => ForgeError::LlmAuth(message),
                429 => ForgeError::RateLimited {
                    message,
                    retry_after_secs,
                },
                _ => ForgeError::LlmRequest(format!("API error ({status}): {message}")),
            });
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| ForgeError::LlmRequest(format!("failed to decode response: {e}")))
    }
}

fn first_choice_text(response: &ChatResponse) -> Result<String> {
    response
        .choices
        .first()
        .and_then(|choice| choice.message.content.as_deref())
        .map(|text| text.trim().to_string())
        .ok_or_else(|| ForgeError::LlmRequest("response contained no choices".into()))
}

impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn generate(&self, prompt: &str, params: GenerationParams) -> BoxFuture<'_, Result<String>> {
        let prompt = prompt.to_string();
        Box::pin(async move {
            let response = self.chat(&prompt, &params).await?;
            first_choice_text(&response)
        })
    }

    fn generate_with_metadata(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> BoxFuture<'_, Result<Generation>> {
        let prompt = prompt.to_string();
        Box::pin(async move {
            let response = self.chat(&prompt, &params).await?;
            let text = first_choice_text(&response)?;
            let finish_reason = response
                .choices
                .first()
                .and_then(|choice| choice.finish_reason.clone());
            let (prompt_tokens, completion_tokens) = response
                .usage
                .map(|usage| (usage.prompt_tokens, usage.completion_tokens))
                .unwrap_or((None, None));
            Ok(Generation {
                text,
                model: response.model,
                prompt_tokens,
                completion_tokens,
                finish_reason,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        let config = ForgeConfig::default();
        let err = OpenAiProvider::new(&config).unwrap_err();
        assert!(matches!(err, ForgeError::LlmAuth(_)));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = ForgeConfig {
            openai_api_key: Some("sk-test".into()),
            openai_base_url: "http://localhost:8080/v1/".into(),
            ..ForgeConfig::default()
        };
        let provider = OpenAiProvider::with_model(&config, "test-model").unwrap();
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
        assert_eq!(provider.model(), "test-model");
    }

    #[test]
    fn test_response_decoding() {
        let raw = r#"{
            "model": "gpt-4o-mini",
            "choices": [{"message": {"content": " hello "}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 2}
        }"#;
        let response: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(first_choice_text(&response).unwrap(), "hello");
    }

    #[test]
    fn test_empty_choices_is_error() {
        let response: ChatResponse =
            serde_json::from_str(r#"{"model": "m", "choices": []}"#).unwrap();
        assert!(first_choice_text(&response).is_err());
    }
}
