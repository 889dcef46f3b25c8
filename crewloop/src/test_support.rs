//! Scripted fakes for tests: an LLM that replays canned replies and a tool
//! that records its inputs.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::agents::Tool;
use crate::io::config::SandboxConfig;
use crate::llm::{LlmClient, LlmRequest, LlmResponse};

pub const SCRIPTED_MODEL: &str = "scripted";

/// Replies with the scripted responses in order; errors once they run out.
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    replies: RefCell<VecDeque<String>>,
    requests: RefCell<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            replies: RefCell::new(replies.into_iter().map(Into::into).collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Every request seen so far, in call order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl LlmClient for ScriptedLlm {
    fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.requests.borrow_mut().push(request.clone());
        let content = self
            .replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted llm has no replies left"))?;
        Ok(LlmResponse {
            content,
            model: SCRIPTED_MODEL.to_string(),
        })
    }

    fn model_name(&self) -> &str {
        SCRIPTED_MODEL
    }
}

/// Tool returning scripted observations and recording what it was given.
#[derive(Debug)]
pub struct ScriptedTool {
    name: String,
    responses: RefCell<VecDeque<String>>,
    inputs: RefCell<Vec<String>>,
}

impl ScriptedTool {
    pub fn new<I>(name: &str, responses: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            name: name.to_string(),
            responses: RefCell::new(responses.into_iter().map(Into::into).collect()),
            inputs: RefCell::new(Vec::new()),
        }
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.borrow().clone()
    }
}

impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "scripted test tool"
    }

    fn run(&self, input: &str) -> String {
        self.inputs.borrow_mut().push(input.to_string());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| "scripted tool has no responses left".to_string())
    }
}

/// Fresh scratch directory, removed on drop.
pub fn scratch_dir() -> TempDir {
    tempfile::tempdir().expect("create scratch dir")
}

/// Sandbox running `sh` scripts in `workdir` with no dependency step.
pub fn shell_sandbox(workdir: &Path, timeout_secs: u64) -> SandboxConfig {
    SandboxConfig {
        interpreter: vec!["sh".to_string()],
        script_name: "generated.sh".to_string(),
        workdir: workdir.to_path_buf(),
        timeout_secs,
        output_limit_bytes: 10_000,
        dependency_check: Vec::new(),
        dependency_install: Vec::new(),
        install_timeout_secs: 5,
    }
}
