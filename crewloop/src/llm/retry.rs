//! Retry wrapper that backs off on transient LLM transport errors.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{LlmClient, LlmHttpError, LlmRequest, LlmResponse};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Retries transient endpoint failures with exponential backoff.
///
/// Only [`LlmHttpError`]s that report themselves transient are retried; parse
/// errors and 4xx replies fail immediately.
pub struct RetryingClient<T: LlmClient> {
    inner: T,
    config: RetryConfig,
}

impl<T: LlmClient> RetryingClient<T> {
    pub fn new(inner: T, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    fn compute_delay(&self, attempt: u32) -> Duration {
        let base = self.config.initial_delay_ms as f64
            * self.config.backoff_multiplier.powi(attempt as i32);
        let delay = if base.is_finite() { base as u64 } else { u64::MAX };
        Duration::from_millis(delay.min(self.config.max_delay_ms))
    }
}

fn is_retryable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<LlmHttpError>()
        .is_some_and(LlmHttpError::is_transient)
}

impl<T: LlmClient> LlmClient for RetryingClient<T> {
    fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(request) {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if attempt >= self.config.max_retries || !is_retryable(&err) {
                        return Err(err);
                    }
                    let delay = self.compute_delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying LLM request"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
