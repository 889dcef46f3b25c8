//! Execution sandbox tool: write generated code to a fixed file, run it under
//! a timeout, report what happened, delete the file.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::agents::tool::Tool;
use crate::core::code_block::extract_code;
use crate::core::types::ExecutionOutcome;
use crate::io::config::SandboxConfig;
use crate::io::process::{ProcessOutput, command_from_argv, run_with_timeout};

pub const TOOL_NAME: &str = "code_execution_tool";

/// Why the sandbox could not produce an [`ExecutionOutcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxFailure {
    /// The runtime dependency was missing and could not be installed.
    Install(String),
    /// The script file could not be written.
    Write(String),
    /// Spawning or waiting on the interpreter failed.
    Unexpected(String),
}

impl fmt::Display for SandboxFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SandboxFailure::Install(detail) => write!(
                f,
                "Tool error: could not install the runtime dependency. Error output:\n{detail}"
            ),
            SandboxFailure::Write(detail) => {
                write!(f, "Tool error: could not write the script file. Error: {detail}")
            }
            SandboxFailure::Unexpected(detail) => {
                write!(f, "Unexpected error while executing the code: {detail}")
            }
        }
    }
}

impl std::error::Error for SandboxFailure {}

/// Removes the generated script when dropped, whatever happened in between.
struct ScriptFile {
    path: PathBuf,
}

impl Drop for ScriptFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "cleaned up script"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.path.display(), err = %err, "failed to remove script"),
        }
    }
}

/// Runs generated programs for the tester agent.
///
/// Remembers the last code it was asked to run so the develop loop can persist
/// exactly what passed.
pub struct CodeExecutionTool {
    config: SandboxConfig,
    description: String,
    last_tested_code: RefCell<Option<String>>,
    dependency_ready: Cell<bool>,
}

impl CodeExecutionTool {
    pub fn new(config: SandboxConfig) -> Self {
        let description = format!(
            "Takes a complete program as a string, saves it as '{}', and runs it with a {}-second timeout. \
             Reports whether it ran successfully, or returns the captured error output.",
            config.script_name, config.timeout_secs
        );
        Self {
            config,
            description,
            last_tested_code: RefCell::new(None),
            dependency_ready: Cell::new(false),
        }
    }

    /// The code passed to the most recent run, if any.
    pub fn last_tested_code(&self) -> Option<String> {
        self.last_tested_code.borrow().clone()
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Run `code` and return the text report handed to the agent.
    pub fn execute(&self, code: &str) -> String {
        match self.try_execute(code) {
            Ok(outcome) => outcome.report(),
            Err(failure) => failure.to_string(),
        }
    }

    /// Run `code` and classify the result.
    ///
    /// The code is recorded as last-tested before anything can fail.
    #[instrument(skip_all, fields(script = %self.config.script_name, bytes = code.len()))]
    pub fn try_execute(&self, code: &str) -> Result<ExecutionOutcome, SandboxFailure> {
        *self.last_tested_code.borrow_mut() = Some(code.to_string());

        self.ensure_dependency()?;

        let script = ScriptFile {
            path: self.config.script_path(),
        };
        fs::write(&script.path, code).map_err(|err| {
            SandboxFailure::Write(format!("{}: {err}", script.path.display()))
        })?;
        debug!(path = %script.path.display(), "code written");

        let timeout = Duration::from_secs(self.config.timeout_secs);
        info!(timeout_secs = self.config.timeout_secs, "executing generated code");
        let mut cmd = command_from_argv(&self.config.interpreter, &self.config.workdir)
            .map_err(|err| SandboxFailure::Unexpected(format!("{err:#}")))?;
        cmd.arg(&self.config.script_name);

        let output = run_with_timeout(cmd, timeout, self.config.output_limit_bytes)
            .map_err(|err| SandboxFailure::Unexpected(format!("{err:#}")))?;
        let outcome = classify(&output, self.config.timeout_secs);
        match &outcome {
            ExecutionOutcome::TimedOut { .. } => {
                info!("execution reached the timeout (expected for a long-running program)");
            }
            ExecutionOutcome::Clean { .. } => info!("execution finished with status 0"),
            ExecutionOutcome::Failed { exit_code, .. } => {
                info!(exit_code = ?exit_code, "execution failed");
            }
        }
        Ok(outcome)
    }

    fn ensure_dependency(&self) -> Result<(), SandboxFailure> {
        if self.dependency_ready.get() || self.config.dependency_check.is_empty() {
            return Ok(());
        }
        let timeout = Duration::from_secs(self.config.install_timeout_secs);

        let check = self.run_helper(&self.config.dependency_check, timeout);
        if matches!(&check, Ok(out) if out.status.success() && !out.timed_out) {
            self.dependency_ready.set(true);
            return Ok(());
        }

        if self.config.dependency_install.is_empty() {
            return Err(SandboxFailure::Install(
                "dependency check failed and no install command is configured".to_string(),
            ));
        }
        info!(command = ?self.config.dependency_install, "runtime dependency missing, installing");
        let install = self
            .run_helper(&self.config.dependency_install, timeout)
            .map_err(|err| SandboxFailure::Install(format!("{err:#}")))?;
        if install.timed_out {
            return Err(SandboxFailure::Install(format!(
                "install timed out after {} seconds",
                self.config.install_timeout_secs
            )));
        }
        if !install.status.success() {
            let stderr = install.stderr_text();
            warn!(exit_code = ?install.status.code(), "dependency install failed");
            return Err(SandboxFailure::Install(stderr.trim_end().to_string()));
        }
        info!("runtime dependency installed");
        self.dependency_ready.set(true);
        Ok(())
    }

    fn run_helper(&self, argv: &[String], timeout: Duration) -> anyhow::Result<ProcessOutput> {
        let cmd = command_from_argv(argv, &self.config.workdir)?;
        run_with_timeout(cmd, timeout, self.config.output_limit_bytes)
    }
}

fn classify(output: &ProcessOutput, timeout_secs: u64) -> ExecutionOutcome {
    if output.timed_out {
        ExecutionOutcome::TimedOut { timeout_secs }
    } else if output.status.success() {
        ExecutionOutcome::Clean {
            stdout: output.stdout_text(),
        }
    } else {
        ExecutionOutcome::Failed {
            exit_code: output.status.code(),
            stderr: output.stderr_text(),
        }
    }
}

impl Tool for CodeExecutionTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn run(&self, input: &str) -> String {
        self.execute(&extract_code(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::shell_sandbox;
    use std::path::Path;
    use std::time::Instant;

    fn sh_config(workdir: &Path, timeout_secs: u64) -> SandboxConfig {
        shell_sandbox(workdir, timeout_secs)
    }

    #[test]
    fn clean_exit_reports_stdout_and_deletes_script() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tool = CodeExecutionTool::new(sh_config(temp.path(), 5));

        let outcome = tool.try_execute("echo hello").expect("outcome");
        assert_eq!(
            outcome,
            ExecutionOutcome::Clean {
                stdout: "hello\n".to_string()
            }
        );
        assert!(!temp.path().join("generated.sh").exists());
    }

    #[test]
    fn non_zero_exit_reports_stderr_and_deletes_script() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tool = CodeExecutionTool::new(sh_config(temp.path(), 5));

        let report = tool.execute("echo 'boom happened' >&2\nexit 2");
        assert!(report.starts_with("Execution failed"), "{report}");
        assert!(report.contains("boom happened"));
        assert!(report.contains("exit status 2"));
        assert!(!temp.path().join("generated.sh").exists());
    }

    #[test]
    fn timeout_counts_as_success_and_deletes_script() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tool = CodeExecutionTool::new(sh_config(temp.path(), 1));

        let started = Instant::now();
        let outcome = tool.try_execute("exec sleep 30").expect("outcome");
        assert_eq!(outcome, ExecutionOutcome::TimedOut { timeout_secs: 1 });
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!temp.path().join("generated.sh").exists());
    }

    #[test]
    fn timeout_also_stops_processes_the_script_started() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tool = CodeExecutionTool::new(sh_config(temp.path(), 1));

        let started = Instant::now();
        let outcome = tool.try_execute("sleep 8").expect("outcome");
        assert_eq!(outcome, ExecutionOutcome::TimedOut { timeout_secs: 1 });
        assert!(
            started.elapsed() < Duration::from_secs(4),
            "took {:?} with a 1s timeout",
            started.elapsed()
        );
        assert!(!temp.path().join("generated.sh").exists());
    }

    #[test]
    fn missing_interpreter_is_unexpected_error_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = sh_config(temp.path(), 5);
        config.interpreter = vec!["definitely-missing-bin-crewloop".to_string()];
        let tool = CodeExecutionTool::new(config);

        let report = tool.execute("echo never");
        assert!(report.starts_with("Unexpected error"), "{report}");
        assert_eq!(tool.last_tested_code().as_deref(), Some("echo never"));
        assert!(!temp.path().join("generated.sh").exists());
    }

    #[test]
    fn script_runs_from_its_own_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tool = CodeExecutionTool::new(sh_config(temp.path(), 5));

        let outcome = tool.try_execute("cat generated.sh").expect("outcome");
        assert_eq!(
            outcome,
            ExecutionOutcome::Clean {
                stdout: "cat generated.sh".to_string()
            }
        );
    }

    #[test]
    fn install_failure_is_reported_as_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = sh_config(temp.path(), 5);
        config.dependency_check = vec!["sh".into(), "-c".into(), "exit 1".into()];
        config.dependency_install = vec![
            "sh".into(),
            "-c".into(),
            "echo 'no network' >&2; exit 1".into(),
        ];
        let tool = CodeExecutionTool::new(config);

        let report = tool.execute("echo never");
        assert!(report.contains("could not install"), "{report}");
        assert!(report.contains("no network"));
        assert_eq!(tool.last_tested_code().as_deref(), Some("echo never"));
        assert!(!temp.path().join("generated.sh").exists());
    }

    #[test]
    fn missing_dependency_without_installer_fails() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = sh_config(temp.path(), 5);
        config.dependency_check = vec!["sh".into(), "-c".into(), "exit 1".into()];
        let tool = CodeExecutionTool::new(config);

        assert!(matches!(
            tool.try_execute("echo never"),
            Err(SandboxFailure::Install(_))
        ));
    }

    #[test]
    fn dependency_check_runs_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = sh_config(temp.path(), 5);
        config.dependency_check = vec![
            "sh".into(),
            "-c".into(),
            "echo checked >> checks.log".into(),
        ];
        let tool = CodeExecutionTool::new(config);

        tool.try_execute("true").expect("first");
        tool.try_execute("true").expect("second");
        let log = fs::read_to_string(temp.path().join("checks.log")).expect("log");
        assert_eq!(log.lines().count(), 1);
    }

    #[test]
    fn successful_install_lets_code_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = sh_config(temp.path(), 5);
        config.dependency_check = vec!["sh".into(), "-c".into(), "exit 1".into()];
        config.dependency_install = vec!["sh".into(), "-c".into(), "exit 0".into()];
        let tool = CodeExecutionTool::new(config);

        assert!(tool.try_execute("true").expect("outcome").is_success());
    }

    #[test]
    fn write_failure_is_reported_as_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tool = CodeExecutionTool::new(sh_config(&temp.path().join("missing-dir"), 5));

        let report = tool.execute("echo hi");
        assert!(report.contains("could not write the script file"), "{report}");
    }

    #[test]
    fn tool_run_unwraps_fences_and_records_code() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tool = CodeExecutionTool::new(sh_config(temp.path(), 5));

        let report = tool.run("```sh\necho fenced\n```");
        assert!(report.contains("fenced"));
        assert_eq!(tool.last_tested_code().as_deref(), Some("echo fenced"));
        assert_eq!(tool.name(), TOOL_NAME);
        assert!(tool.description().contains("generated.sh"));
    }
}
