//! Ollama `/api/chat` client (non-streaming).

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{LlmClient, LlmRequest, LlmResponse, Role, http_client, post_json};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    model: Option<String>,
}

/// Client for Ollama's native `/api/chat` endpoint.
pub struct OllamaClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    http_client: reqwest::blocking::Client,
}

impl OllamaClient {
    pub fn new(
        base_url: Option<String>,
        model: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            http_client: http_client(timeout)?,
        })
    }

    fn build_request_body(&self, request: &LlmRequest) -> OllamaRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_prompt {
            messages.push(OllamaMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        for msg in &request.messages {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(OllamaMessage {
                role: role.to_string(),
                content: msg.content.clone(),
            });
        }
        OllamaRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            options: request
                .temperature
                .map(|temperature| OllamaOptions { temperature }),
        }
    }
}

impl LlmClient for OllamaClient {
    #[instrument(skip_all, fields(model = %self.model))]
    fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/api/chat", self.base_url);
        let body = self.build_request_body(request);

        let mut http_req = self.http_client.post(&url);
        if let Some(key) = &self.api_key {
            http_req = http_req.bearer_auth(key);
        }

        debug!(%url, messages = body.messages.len(), "sending ollama chat request");
        let response: OllamaResponse = post_json("ollama", http_req, &body)?;
        Ok(LlmResponse {
            content: response.message.content,
            model: response.model.unwrap_or_else(|| self.model.clone()),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;

    fn client(base_url: Option<&str>) -> OllamaClient {
        OllamaClient::new(
            base_url.map(str::to_string),
            "openhermes:latest".to_string(),
            None,
            Duration::from_secs(5),
        )
        .expect("client")
    }

    #[test]
    fn request_body_matches_chat_format() {
        let request = LlmRequest {
            system_prompt: Some("You are a QA engineer.".to_string()),
            messages: vec![
                ChatMessage::user("Run this"),
                ChatMessage::assistant("Action: code_execution_tool"),
            ],
            temperature: Some(0.1),
        };

        let body = client(None).build_request_body(&request);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "openhermes:latest");
        assert_eq!(json["stream"], false);
        assert!((json["options"]["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
    }

    #[test]
    fn options_omitted_without_temperature() {
        let request = LlmRequest {
            messages: vec![ChatMessage::user("hi")],
            ..LlmRequest::default()
        };
        let body = client(None).build_request_body(&request);
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("options").is_none());
    }

    #[test]
    fn base_url_defaults_and_trims() {
        assert_eq!(client(None).base_url, DEFAULT_BASE_URL);
        assert_eq!(
            client(Some("http://10.0.0.5:11434/")).base_url,
            "http://10.0.0.5:11434"
        );
    }

    #[test]
    fn parses_chat_response() {
        let raw = r#"{"model":"openhermes:latest","message":{"role":"assistant","content":"Final Answer: ok"},"done":true}"#;
        let parsed: OllamaResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.message.content, "Final Answer: ok");
        assert_eq!(parsed.model.as_deref(), Some("openhermes:latest"));
    }
}
