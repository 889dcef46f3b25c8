//! Web search tool backed by the Serper Google Search API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::agents::tool::Tool;
use crate::io::config::SearchConfig;
use crate::llm::post_json;

pub const TOOL_NAME: &str = "web_search";

#[derive(Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SerperResponse {
    #[serde(default)]
    answer_box: Option<AnswerBox>,
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Default, Deserialize)]
struct AnswerBox {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    date: Option<String>,
}

pub struct SerperSearchTool {
    endpoint: String,
    api_key: String,
    num_results: u32,
    http_client: reqwest::blocking::Client,
}

impl SerperSearchTool {
    pub fn new(config: &SearchConfig, api_key: String) -> Result<Self> {
        let http_client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("build search http client")?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key,
            num_results: config.num_results,
            http_client,
        })
    }

    /// Build the tool from config, reading the API key from `config.api_key_env`.
    pub fn from_env(config: &SearchConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "{} is not set; the web search tool needs an API key (check your .env file)",
                    config.api_key_env
                )
            })?;
        Self::new(config, api_key)
    }

    #[instrument(skip(self))]
    fn search(&self, query: &str) -> Result<String> {
        let request = self
            .http_client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key);
        let response: SerperResponse = post_json(
            "serper",
            request,
            &SerperRequest {
                q: query,
                num: self.num_results,
            },
        )?;
        info!(results = response.organic.len(), "search finished");
        Ok(format_results(query, &response, self.num_results as usize))
    }
}

/// Pull the query out of the tool input, accepting bare text or a JSON object
/// with a `search_query` / `query` field.
fn parse_query(input: &str) -> String {
    let trimmed = input.trim();
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(trimmed) {
        for key in ["search_query", "query", "q"] {
            if let Some(serde_json::Value::String(query)) = map.get(key) {
                return query.trim().to_string();
            }
        }
    }
    trimmed.trim_matches('"').to_string()
}

fn format_results(query: &str, response: &SerperResponse, limit: usize) -> String {
    let mut out = String::new();
    if let Some(answer) = &response.answer_box
        && let Some(text) = answer.answer.as_ref().or(answer.snippet.as_ref())
    {
        out.push_str("Answer: ");
        if let Some(title) = &answer.title {
            out.push_str(&format!("{title}: "));
        }
        out.push_str(text);
        out.push_str("\n\n");
    }

    if response.organic.is_empty() {
        out.push_str(&format!("No results found for: {query}"));
        return out;
    }

    for (idx, result) in response.organic.iter().take(limit).enumerate() {
        out.push_str(&format!("{}. {}\n", idx + 1, result.title));
        out.push_str(&format!("   Link: {}\n", result.link));
        if let Some(date) = &result.date {
            out.push_str(&format!("   Date: {date}\n"));
        }
        out.push_str(&format!("   Snippet: {}\n\n", result.snippet));
    }
    out.trim_end().to_string()
}

impl Tool for SerperSearchTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Searches the internet with a query and returns the top results (title, link, snippet). \
         Input: the search query as plain text."
    }

    fn run(&self, input: &str) -> String {
        let query = parse_query(input);
        if query.is_empty() {
            return "Search error: the query was empty.".to_string();
        }
        match self.search(&query) {
            Ok(results) => results,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "search failed");
                format!("Search error: {err:#}")
            }
        }
    }
}
