//! Crew configuration stored in `crewloop.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::llm::retry::RetryConfig;

pub const DEFAULT_CONFIG_PATH: &str = "crewloop.toml";

/// Crew configuration (TOML).
///
/// Intended to be edited by humans. Missing sections and fields fall back to
/// the defaults below, which reproduce the stock snake-game and AI-trends runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CrewConfig {
    pub research: ResearchConfig,
    pub develop: DevelopConfig,
    pub sandbox: SandboxConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    Gemini,
}

/// Backend selection for one pipeline.
///
/// `provider` and `model` are required whenever an `llm` table is written out,
/// so a partial table never silently switches provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_request_timeout_secs() -> u64 {
    10 * 60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            model: "openhermes:latest".to_string(),
            base_url: Some("http://localhost:11434".to_string()),
            api_key_env: None,
            temperature: Some(0.1),
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

impl LlmConfig {
    pub fn gemini(model: &str) -> Self {
        Self {
            provider: LlmProvider::Gemini,
            model: model.to_string(),
            base_url: None,
            api_key_env: Some("GOOGLE_API_KEY".to_string()),
            temperature: None,
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }

    fn validate(&self, section: &str) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(anyhow!("{section}.llm.model must be non-empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("{section}.llm.request_timeout_secs must be > 0"));
        }
        if let Some(temperature) = self.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(anyhow!("{section}.llm.temperature must be within 0.0..=2.0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResearchConfig {
    /// Subject the researcher investigates and the writer covers.
    pub topic: String,
    /// Number of trends the research report must list.
    pub trend_count: u32,
    /// Target article length in words.
    pub article_words: u32,
    pub max_tool_rounds: u32,
    pub llm: LlmConfig,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            topic: "the AI trends most worth watching in 2025".to_string(),
            trend_count: 5,
            article_words: 500,
            max_tool_rounds: 5,
            llm: LlmConfig::gemini("gemini-2.5-pro"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DevelopConfig {
    /// Hard cap on develop/test attempts.
    pub max_iterations: u32,
    /// Where the winning program is saved.
    pub output_path: PathBuf,
    /// Where the end-of-run summary is written.
    pub summary_path: PathBuf,
    /// Case-insensitive substrings that mark a test report as passing.
    pub success_markers: Vec<String>,
    pub max_tool_rounds: u32,
    /// Root for per-iteration logs.
    pub log_dir: PathBuf,
    pub llm: LlmConfig,
}

impl Default for DevelopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            output_path: PathBuf::from("snake_game.py"),
            summary_path: PathBuf::from("DEVELOPMENT_SUMMARY.md"),
            success_markers: vec![
                "test result: success".to_string(),
                "execution succeeded".to_string(),
                "ran successfully".to_string(),
            ],
            max_tool_rounds: 5,
            log_dir: PathBuf::from(".crewloop"),
            llm: LlmConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter command; the script path is appended as the last argument.
    pub interpreter: Vec<String>,
    /// Fixed filename the generated code is written to (inside `workdir`).
    pub script_name: String,
    pub workdir: PathBuf,
    /// Wall-clock budget per run. Reaching it counts as success.
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
    /// Command whose success means the runtime dependency is present. Empty skips the check.
    pub dependency_check: Vec<String>,
    /// Command run when the check fails. Empty means "cannot install".
    pub dependency_install: Vec<String>,
    pub install_timeout_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: vec!["python3".to_string()],
            script_name: "generated_snake_game.py".to_string(),
            workdir: PathBuf::from("."),
            timeout_secs: 10,
            output_limit_bytes: 100_000,
            dependency_check: vec![
                "python3".to_string(),
                "-c".to_string(),
                "import pygame".to_string(),
            ],
            dependency_install: vec![
                "python3".to_string(),
                "-m".to_string(),
                "pip".to_string(),
                "install".to_string(),
                "pygame".to_string(),
            ],
            install_timeout_secs: 5 * 60,
        }
    }
}

impl SandboxConfig {
    pub fn script_path(&self) -> PathBuf {
        self.workdir.join(&self.script_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key_env: String,
    pub num_results: u32,
    pub request_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://google.serper.dev/search".to_string(),
            api_key_env: "SERPER_API_KEY".to_string(),
            num_results: 10,
            request_timeout_secs: 30,
        }
    }
}

impl CrewConfig {
    pub fn validate(&self) -> Result<()> {
        self.research.llm.validate("research")?;
        self.develop.llm.validate("develop")?;

        if self.research.topic.trim().is_empty() {
            return Err(anyhow!("research.topic must be non-empty"));
        }
        if self.research.trend_count == 0 {
            return Err(anyhow!("research.trend_count must be > 0"));
        }
        if self.develop.max_iterations == 0 {
            return Err(anyhow!("develop.max_iterations must be > 0"));
        }
        if !self
            .develop
            .success_markers
            .iter()
            .any(|marker| !marker.trim().is_empty())
        {
            return Err(anyhow!("develop.success_markers must contain a non-empty marker"));
        }

        let sandbox = &self.sandbox;
        if sandbox.interpreter.is_empty() || sandbox.interpreter[0].trim().is_empty() {
            return Err(anyhow!("sandbox.interpreter must be a non-empty array"));
        }
        let name = sandbox.script_name.trim();
        if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
            return Err(anyhow!("sandbox.script_name must be a bare file name"));
        }
        if sandbox.timeout_secs == 0 {
            return Err(anyhow!("sandbox.timeout_secs must be > 0"));
        }
        if sandbox.output_limit_bytes == 0 {
            return Err(anyhow!("sandbox.output_limit_bytes must be > 0"));
        }
        if sandbox.install_timeout_secs == 0 {
            return Err(anyhow!("sandbox.install_timeout_secs must be > 0"));
        }

        if self.search.num_results == 0 {
            return Err(anyhow!("search.num_results must be > 0"));
        }
        Ok(())
    }

    /// Replace the research model when it runs on Gemini (`GEMINI_MODEL_NAME`).
    pub fn apply_research_model_override(&mut self, model: Option<String>) {
        if let Some(model) = model.filter(|m| !m.trim().is_empty())
            && self.research.llm.provider == LlmProvider::Gemini
        {
            self.research.llm.model = model.trim().to_string();
        }
    }
}

/// Read config from a TOML file without validating it.
///
/// If the file is missing, returns `CrewConfig::default()`. Callers apply
/// overrides and then call [`CrewConfig::validate`].
pub fn read_config(path: &Path) -> Result<CrewConfig> {
    if !path.exists() {
        return Ok(CrewConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Load and validate config from a TOML file.
///
/// If the file is missing, returns `CrewConfig::default()`.
pub fn load_config(path: &Path) -> Result<CrewConfig> {
    let cfg = read_config(path)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &CrewConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
