//! Retry and timeout decorator for any [`Provider`].

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use super::traits::{ChatRequest, ChatResponse, Provider, ProviderError};

/// Bounded exponential backoff settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_millis(4000),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), with up to 20% jitter,
    /// never above `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_backoff);
        let jitter_ceiling = base.as_millis() as u64 / 5;
        let jitter = if jitter_ceiling == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ceiling)
        };
        (base + Duration::from_millis(jitter)).min(self.max_backoff)
    }

    /// Upper bound on one `chat` call through [`ReliableProvider`]: every
    /// attempt timing out plus the largest possible backoff between them.
    pub fn max_total_duration(&self) -> Duration {
        let attempts = self.max_retries.saturating_add(1);
        let backoff = (0..self.max_retries)
            .map(|attempt| {
                let base = self
                    .initial_backoff
                    .saturating_mul(2u32.saturating_pow(attempt))
                    .min(self.max_backoff);
                (base + base / 5).min(self.max_backoff)
            })
            .fold(Duration::ZERO, Duration::saturating_add);
        self.request_timeout.saturating_mul(attempts).saturating_add(backoff)
    }
}

/// Wraps a provider with a per-attempt timeout and retries for retryable
/// failures. Non-retryable errors are returned immediately.
pub struct ReliableProvider {
    inner: Arc<dyn Provider>,
    policy: RetryPolicy,
}

impl ReliableProvider {
    pub fn new(inner: Arc<dyn Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Provider for ReliableProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let attempts = self.policy.max_retries + 1;
        let mut last = String::new();

        for attempt in 0..attempts {
            let outcome =
                tokio::time::timeout(self.policy.request_timeout, self.inner.chat(request))
                    .await
                .unwrap_or_else(|_| {
                    Err(ProviderError::Timeout(self.policy.request_timeout.as_secs()))
                });

            match outcome {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() => {
                    last = err.to_string();
                    if attempt + 1 < attempts {
                        let delay = self.policy.backoff_for(attempt);
                        tracing::warn!(
                            provider = self.inner.name(),
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Model call failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Err(ProviderError::Unavailable { attempts, last })
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
