use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use forgekit_core::config::RetryConfig;
use forgekit_core::error::{ForgeError, Result};
use forgekit_core::traits::LlmProvider;
use forgekit_core::types::{Generation, GenerationParams};

/// Wraps a provider with retry-on-transient-failure.
///
/// The workflow engine never retries a failed step; any retry policy lives
/// here, inside the provider, so the scheduler's fail-fast contract holds.
pub struct RetryingProvider {
    inner: Box<dyn LlmProvider>,
    config: RetryConfig,
}

impl RetryingProvider {
    pub fn new(inner: Box<dyn LlmProvider>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

fn is_retryable(e: &ForgeError) -> bool {
    match e {
        ForgeError::RateLimited { .. } => true,
        ForgeError::LlmRequest(msg) => {
            msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        _ => false,
    }
}

fn backoff_for(e: &ForgeError, attempt: u32, config: &RetryConfig) -> Duration {
    // A server-provided retry-after beats the computed backoff
    if let ForgeError::RateLimited {
        retry_after_secs: Some(secs),
        ..
    } = e
    {
        return Duration::from_secs(*secs);
    }
    let ms = (config.initial_backoff_ms * 2u64.pow(attempt)).min(config.max_backoff_ms);
    // Jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl RetryingProvider {
    async fn run_with_retries<'a, T, F>(&'a self, mut call: F) -> Result<T>
    where
        F: FnMut(&'a dyn LlmProvider) -> BoxFuture<'a, Result<T>>,
    {
        let max_retries = self.config.max_retries;
        let mut last_err = None;
        for attempt in 0..=max_retries {
            match call(self.inner.as_ref()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if is_retryable(&e) && attempt < max_retries {
                        let backoff = backoff_for(&e, attempt, &self.config);
                        warn!(
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Retrying LLM request"
                        );
                        tokio::time::sleep(backoff).await;
                        last_err = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ForgeError::LlmRequest("retries exhausted".into())))
    }
}

impl LlmProvider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn generate(&self, prompt: &str, params: GenerationParams) -> BoxFuture<'_, Result<String>> {
        let prompt = prompt.to_string();
        Box::pin(async move {
            self.run_with_retries(move |provider| provider.generate(&prompt, params.clone()))
                .await
        })
    }

    fn generate_with_metadata(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> BoxFuture<'_, Result<Generation>> {
        let prompt = prompt.to_string();
        Box::pin(async move {
            self.run_with_retries(move |provider| {
                provider.generate_with_metadata(&prompt, params.clone())
            })
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Fails `failures` times with the given error factory, then succeeds.
    struct FlakyProvider {
        calls: AtomicU32,
        failures: u32,
        error: fn() -> ForgeError,
    }

    impl FlakyProvider {
        fn new(failures: u32, error: fn() -> ForgeError) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
                error,
            }
        }
    }

    impl LlmProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn generate(&self, prompt: &str, _params: GenerationParams) -> BoxFuture<'_, Result<String>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let prompt = prompt.to_string();
            Box::pin(async move {
                if call < self.failures {
                    Err((self.error)())
                } else {
                    Ok(format!("echo: {prompt}"))
                }
            })
        }

        fn generate_with_metadata(
            &self,
            prompt: &str,
            params: GenerationParams,
        ) -> BoxFuture<'_, Result<Generation>> {
            let prompt = prompt.to_string();
            Box::pin(async move {
                let text = self.generate(&prompt, params).await?;
                Ok(Generation {
                    text,
                    model: "flaky".into(),
                    prompt_tokens: None,
                    completion_tokens: None,
                    finish_reason: None,
                })
            })
        }
    }

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
        }
    }

    fn rate_limited() -> ForgeError {
        ForgeError::RateLimited {
            message: "slow down".into(),
            retry_after_secs: Some(0),
        }
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let provider = RetryingProvider::new(
            Box::new(FlakyProvider::new(2, rate_limited)),
            fast_config(),
        );
        let text = provider
            .generate("hi", GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(text, "echo: hi");
    }

    #[tokio::test]
    async fn test_exhausts_retries() {
        let provider = RetryingProvider::new(
            Box::new(FlakyProvider::new(10, rate_limited)),
            fast_config(),
        );
        let err = provider
            .generate("hi", GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let flaky = FlakyProvider::new(10, || ForgeError::LlmAuth("bad key".into()));
        let provider = RetryingProvider::new(Box::new(flaky), fast_config());
        let err = provider
            .generate("hi", GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::LlmAuth(_)));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&rate_limited()));
        assert!(is_retryable(&ForgeError::LlmRequest(
            "API error (503 Service Unavailable): overloaded".into()
        )));
        assert!(!is_retryable(&ForgeError::LlmAuth("nope".into())));
        assert!(!is_retryable(&ForgeError::Parse("nope".into())));
    }

    #[test]
    fn test_backoff_respects_retry_after() {
        let config = fast_config();
        let backoff = backoff_for(
            &ForgeError::RateLimited {
                message: "s".into(),
                retry_after_secs: Some(7),
            },
            0,
            &config,
        );
        assert_eq!(backoff, Duration::from_secs(7));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 2000,
        };
        let backoff = backoff_for(&ForgeError::LlmRequest("timeout".into()), 8, &config);
        // 2000ms cap * 1.2 max jitter
        assert!(backoff <= Duration::from_millis(2400));
    }
}
