//! Sequential crew: runs tasks in order and threads outputs forward.

use std::fmt;

use anyhow::{Result, bail};
use tracing::{info, instrument};

use crate::agents::agent::Agent;
use crate::agents::prompt;

const CONTEXT_SEPARATOR: &str = "\n\n----------\n\n";

/// A natural-language instruction assigned to an agent.
pub struct Task<'a> {
    pub name: String,
    pub description: String,
    pub expected_output: String,
    pub agent: &'a Agent<'a>,
    /// Indices of earlier tasks whose outputs are attached as context.
    /// Empty means "the task right before this one".
    pub context: Vec<usize>,
}

impl<'a> Task<'a> {
    pub fn new(name: &str, description: String, expected_output: &str, agent: &'a Agent<'a>) -> Self {
        Self {
            name: name.to_string(),
            description,
            expected_output: expected_output.to_string(),
            agent,
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: Vec<usize>) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutput {
    pub name: String,
    pub agent_role: String,
    pub raw: String,
}

/// Outputs of every task in order. Displays as the last task's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrewOutput {
    pub tasks: Vec<TaskOutput>,
}

impl CrewOutput {
    pub fn raw(&self) -> &str {
        self.tasks.last().map(|t| t.raw.as_str()).unwrap_or("")
    }

    pub fn task(&self, name: &str) -> Option<&TaskOutput> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

impl fmt::Display for CrewOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw())
    }
}

/// An ordered set of tasks and the agents executing them.
pub struct Crew<'a> {
    tasks: Vec<Task<'a>>,
}

impl<'a> Crew<'a> {
    /// Build a crew, checking that every context reference points backwards.
    pub fn new(tasks: Vec<Task<'a>>) -> Result<Self> {
        if tasks.is_empty() {
            bail!("a crew needs at least one task");
        }
        for (idx, task) in tasks.iter().enumerate() {
            if let Some(bad) = task.context.iter().find(|&&c| c >= idx) {
                bail!(
                    "task '{}' (#{idx}) can only use earlier tasks as context, got #{bad}",
                    task.name
                );
            }
        }
        Ok(Self { tasks })
    }

    /// Run every task in order.
    #[instrument(skip_all, fields(tasks = self.tasks.len()))]
    pub fn kickoff(&self) -> Result<CrewOutput> {
        let mut outputs: Vec<TaskOutput> = Vec::with_capacity(self.tasks.len());
        for (idx, task) in self.tasks.iter().enumerate() {
            info!(task = %task.name, agent = %task.agent.role(), "starting task");
            let context = gather_context(task, idx, &outputs);
            let prompt = prompt::task(&task.description, &task.expected_output, context.as_deref())?;
            let raw = task.agent.execute(&prompt)?;
            info!(task = %task.name, chars = raw.len(), "task finished");
            outputs.push(TaskOutput {
                name: task.name.clone(),
                agent_role: task.agent.role().to_string(),
                raw,
            });
        }
        Ok(CrewOutput { tasks: outputs })
    }
}

fn gather_context(task: &Task<'_>, idx: usize, outputs: &[TaskOutput]) -> Option<String> {
    if task.context.is_empty() {
        return idx.checked_sub(1).map(|prev| outputs[prev].raw.clone());
    }
    let parts: Vec<&str> = task
        .context
        .iter()
        .map(|&c| outputs[c].raw.as_str())
        .collect();
    Some(parts.join(CONTEXT_SEPARATOR))
}
