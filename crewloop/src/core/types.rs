//! Shared deterministic types for the develop loop.

use serde::{Deserialize, Serialize};

/// One attempt of the develop loop, as reported by the tester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Attempt number (1-indexed).
    pub iteration: u32,
    /// Role of the agent that produced the code for this attempt.
    pub role: String,
    /// Stringified crew result (the tester's report).
    pub result: String,
    pub success: bool,
}

/// Classified result of running generated code in the sandbox.
///
/// A timeout counts as success: the programs under test run an unbounded
/// main loop, so surviving the whole window means they started cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The program exited with status 0 before the timeout.
    Clean { stdout: String },
    /// Non-zero exit (or killed by a signal).
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },
    /// The program was still running when the timeout hit and was killed.
    TimedOut { timeout_secs: u64 },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, ExecutionOutcome::Failed { .. })
    }

    /// Render the outcome as the text handed back to the calling agent.
    pub fn report(&self) -> String {
        match self {
            ExecutionOutcome::Clean { stdout } => format!(
                "Execution succeeded (program exited normally).\nOutput:\n{}",
                stdout.trim_end()
            ),
            ExecutionOutcome::Failed { exit_code, stderr } => {
                let code = exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                format!(
                    "Execution failed: the code has errors (exit status {code}).\nError output:\n{}",
                    stderr.trim_end()
                )
            }
            ExecutionOutcome::TimedOut { timeout_secs } => format!(
                "Execution succeeded: the code ran for {timeout_secs} seconds without crashing (main loop started)."
            ),
        }
    }
}
