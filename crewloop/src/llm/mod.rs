//! Blocking LLM clients.
//!
//! Every backend implements [`LlmClient`]; [`build_llm_client`] picks one from
//! configuration and wraps it in [`RetryingClient`]. Tests swap in scripted
//! clients from `test_support` without touching the network.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub mod gemini;
pub mod ollama;
pub mod retry;

use crate::io::config::{LlmConfig, LlmProvider};
use gemini::GeminiClient;
use ollama::OllamaClient;
use retry::RetryingClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub system_prompt: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
}

/// Abstraction over chat-completion backends.
pub trait LlmClient {
    fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;
    fn model_name(&self) -> &str;
}

impl<T: LlmClient + ?Sized> LlmClient for Box<T> {
    fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        (**self).complete(request)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Failure talking to an LLM endpoint.
///
/// `status` is `None` for transport failures (connect, timeout, body read).
#[derive(Debug)]
pub struct LlmHttpError {
    pub provider: &'static str,
    pub status: Option<u16>,
    pub message: String,
}

impl LlmHttpError {
    pub fn is_transient(&self) -> bool {
        match self.status {
            None => true,
            Some(status) => status == 429 || (500..600).contains(&status),
        }
    }
}

impl fmt::Display for LlmHttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} API error {status}: {}", self.provider, self.message),
            None => write!(f, "{} request failed: {}", self.provider, self.message),
        }
    }
}

impl std::error::Error for LlmHttpError {}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .context("build http client")
}

/// Send a JSON POST and decode the JSON reply, mapping failures to [`LlmHttpError`].
pub(crate) fn post_json<B: Serialize, R: serde::de::DeserializeOwned>(
    provider: &'static str,
    request: reqwest::blocking::RequestBuilder,
    body: &B,
) -> Result<R> {
    let transport = |err: reqwest::Error| LlmHttpError {
        provider,
        status: None,
        message: err.to_string(),
    };
    let response = request.json(body).send().map_err(transport)?;
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().unwrap_or_default();
        return Err(LlmHttpError {
            provider,
            status: Some(status.as_u16()),
            message: body_text,
        }
        .into());
    }
    let parsed = response
        .json::<R>()
        .with_context(|| format!("parse {provider} response"))?;
    Ok(parsed)
}

/// Build the configured client, resolving its API key from the environment.
pub fn build_llm_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    let api_key = match config.api_key_env.as_deref() {
        Some(var) => std::env::var(var).ok().filter(|key| !key.trim().is_empty()),
        None => None,
    };
    let timeout = Duration::from_secs(config.request_timeout_secs);

    let base: Box<dyn LlmClient> = match config.provider {
        LlmProvider::Ollama => Box::new(OllamaClient::new(
            config.base_url.clone(),
            config.model.clone(),
            api_key,
            timeout,
        )?),
        LlmProvider::Gemini => {
            let Some(api_key) = api_key else {
                bail!(
                    "{} is not set; the gemini provider needs an API key (check your .env file)",
                    config.api_key_env.as_deref().unwrap_or("api_key_env")
                );
            };
            Box::new(GeminiClient::new(
                config.base_url.clone(),
                config.model.clone(),
                api_key,
                timeout,
            )?)
        }
    };

    Ok(Box::new(RetryingClient::new(base, config.retry.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn transient_statuses() {
        let err = |status| LlmHttpError {
            provider: "ollama",
            status,
            message: String::new(),
        };
        assert!(err(None).is_transient());
        assert!(err(Some(429)).is_transient());
        assert!(err(Some(503)).is_transient());
        assert!(!err(Some(400)).is_transient());
        assert!(!err(Some(401)).is_transient());
    }

    #[test]
    fn gemini_without_key_fails_fast() {
        let config = LlmConfig {
            provider: LlmProvider::Gemini,
            api_key_env: Some("CREWLOOP_TEST_MISSING_KEY".to_string()),
            ..LlmConfig::default()
        };
        let err = build_llm_client(&config).err().expect("missing key error");
        assert!(err.to_string().contains("CREWLOOP_TEST_MISSING_KEY is not set"));
    }

    #[test]
    fn ollama_builds_without_key() {
        let config = LlmConfig::default();
        let client = build_llm_client(&config).expect("client");
        assert_eq!(client.model_name(), config.model);
    }
}
