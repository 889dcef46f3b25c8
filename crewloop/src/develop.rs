//! Develop, execute, test, debug loop for `crewloop develop`.
//!
//! Each iteration runs a two-task crew: a coder (the developer on the first
//! attempt, the debugger afterwards) writes the program, then the tester runs
//! it through the sandbox and reports. The loop stops at the first report
//! matching a success marker or after `max_iterations` attempts.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use tracing::{info, instrument, warn};

use crate::agents::prompt::{self, ProgramBrief};
use crate::agents::{Agent, Crew, Persona, Task};
use crate::core::types::IterationRecord;
use crate::core::verdict::report_indicates_success;
use crate::io::config::DevelopConfig;
use crate::io::iteration_log::{IterationMeta, IterationWriteRequest, new_run_id, write_iteration};
use crate::io::sandbox::{CodeExecutionTool, TOOL_NAME};
use crate::llm::LlmClient;

const WRITE_TASK: &str = "write_code";
const TEST_TASK: &str = "test_code";

/// Reason why `run_develop_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// A test report matched a success marker.
    Succeeded { iteration: u32 },
    /// Every attempt failed.
    Exhausted { max_iterations: u32 },
}

/// Summary of a develop run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevelopOutcome {
    pub run_id: String,
    pub history: Vec<IterationRecord>,
    pub stop: LoopStop,
    /// Test report of the last attempt.
    pub final_report: String,
    /// Where the winning code was saved, when it was.
    pub saved_code: Option<PathBuf>,
}

impl DevelopOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.stop, LoopStop::Succeeded { .. })
    }
}

fn developer_persona(brief: &ProgramBrief) -> Persona {
    Persona::new(
        &format!("Senior {} game developer", brief.language),
        &format!(
            "Write a fully working {} with {} and the {} library.",
            brief.program, brief.language, brief.library
        ),
        &format!(
            "You are a senior developer specialising in {lib}, known for clean, runnable and fun 2D games. \
             Your programs are always a single file holding all the logic: game loop, controls, collision \
             detection and scoring.",
            lib = brief.library
        ),
    )
}

fn tester_persona() -> Persona {
    Persona::new(
        "Software QA engineer",
        "Rigorously test the code from the developer and make sure it runs without immediate errors.",
        &format!(
            "You are a detail-oriented QA tester. Your only job is to run the code with the \
             '{TOOL_NAME}' tool and judge from its report whether the program started. When it fails \
             you always include the complete error output."
        ),
    )
}

fn debugger_persona(brief: &ProgramBrief) -> Persona {
    Persona::new(
        "Debugging specialist",
        "Analyse code that failed its test, find the cause of the error and fix it.",
        &format!(
            "You are an experienced debugger who reads error messages and pinpoints problems fast. \
             When QA reports a failure you find the root cause and write the corrected complete program. \
             You can solve any {} or {} error.",
            brief.language, brief.library
        ),
    )
}

fn analyst_persona() -> Persona {
    Persona::new(
        "Project summary analyst",
        "Analyse the whole development process, summarise every error and fix, and share lessons learned.",
        "You are an experienced project analyst who extracts valuable insight from a development history. \
         You analyse the errors of every iteration, classify the problems, explain the fixes and give \
         professional advice. Your reports are clear and well organised.",
    )
}

/// Run the develop loop until a test passes or the attempt budget is spent.
///
/// `on_iteration` is called after every attempt with its record. LLM failures
/// abort the run; sandbox failures are part of the test report.
#[instrument(skip_all, fields(max_iterations = config.max_iterations))]
pub fn run_develop_loop<F: FnMut(&IterationRecord)>(
    llm: &dyn LlmClient,
    sandbox: &CodeExecutionTool,
    config: &DevelopConfig,
    brief: &ProgramBrief,
    mut on_iteration: F,
) -> Result<DevelopOutcome> {
    let run_id = new_run_id(Utc::now());
    let temperature = config.llm.temperature;
    let developer = Agent::new(developer_persona(brief), llm)
        .with_temperature(temperature)
        .with_max_tool_rounds(config.max_tool_rounds);
    let debugger = Agent::new(debugger_persona(brief), llm)
        .with_temperature(temperature)
        .with_max_tool_rounds(config.max_tool_rounds);
    let tester = Agent::new(tester_persona(), llm)
        .with_tool(sandbox)
        .with_temperature(temperature)
        .with_max_tool_rounds(config.max_tool_rounds);
    let test_prompt = prompt::test_code(brief, TOOL_NAME, sandbox.config().timeout_secs)?;

    let mut history: Vec<IterationRecord> = Vec::new();
    let mut final_report = String::new();

    for iteration in 1..=config.max_iterations {
        let (coder, code_prompt) = if iteration == 1 {
            (&developer, prompt::develop_initial(brief)?)
        } else {
            let previous_code = sandbox.last_tested_code();
            (
                &debugger,
                prompt::develop_fix(brief, iteration - 1, &final_report, previous_code.as_deref())?,
            )
        };
        info!(iteration, agent = %coder.role(), "starting iteration");

        let started_at = Utc::now();
        let crew = Crew::new(vec![
            Task::new(
                WRITE_TASK,
                code_prompt,
                &format!(
                    "A string holding a complete, runnable {} program in {}.",
                    brief.program, brief.language
                ),
                coder,
            ),
            Task::new(
                TEST_TASK,
                test_prompt.clone(),
                "A test report that states clearly whether the code ran successfully.",
                &tester,
            )
            .with_context(vec![0]),
        ])?;
        let result = crew
            .kickoff()
            .with_context(|| format!("iteration {iteration}"))?
            .to_string();
        let ended_at = Utc::now();

        let success = report_indicates_success(&result, &config.success_markers);
        let record = IterationRecord {
            iteration,
            role: coder.role().to_string(),
            result: result.clone(),
            success,
        };
        let meta = IterationMeta::new(&run_id, iteration, coder.role(), success, started_at, ended_at);
        let code = sandbox.last_tested_code();
        if let Err(err) = write_iteration(&IterationWriteRequest {
            log_dir: &config.log_dir,
            meta: &meta,
            report: &result,
            code: code.as_deref(),
        }) {
            warn!(iteration, err = %format!("{err:#}"), "failed to write iteration log");
        }

        on_iteration(&record);
        history.push(record);
        final_report = result;

        if success {
            info!(iteration, "test passed");
            let saved_code = save_winning_code(code.as_deref(), &config.output_path);
            return Ok(DevelopOutcome {
                run_id,
                history,
                stop: LoopStop::Succeeded { iteration },
                final_report,
                saved_code,
            });
        }
        info!(iteration, "test failed");
    }

    warn!(max_iterations = config.max_iterations, "attempt budget exhausted");
    Ok(DevelopOutcome {
        run_id,
        history,
        stop: LoopStop::Exhausted {
            max_iterations: config.max_iterations,
        },
        final_report,
        saved_code: None,
    })
}

/// Persist the last tested code. Failures are logged, never raised.
fn save_winning_code(code: Option<&str>, path: &Path) -> Option<PathBuf> {
    let Some(code) = code else {
        warn!("test passed but no code went through the sandbox; nothing to save");
        return None;
    };
    match fs::write(path, code) {
        Ok(()) => {
            info!(path = %path.display(), "saved winning code");
            Some(path.to_path_buf())
        }
        Err(err) => {
            warn!(path = %path.display(), err = %err, "failed to save winning code");
            None
        }
    }
}

/// Result of the summary step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryReport {
    pub text: String,
    pub written_to: Option<PathBuf>,
}

/// Ask the analyst agent for a markdown report of the run and write it to
/// `summary_path`. A write failure is logged and the text is still returned.
#[instrument(skip_all, fields(iterations = history.len()))]
pub fn generate_summary(
    llm: &dyn LlmClient,
    config: &DevelopConfig,
    brief: &ProgramBrief,
    history: &[IterationRecord],
    succeeded: bool,
) -> Result<SummaryReport> {
    let date = Local::now().format("%Y-%m-%d").to_string();
    let analyst = Agent::new(analyst_persona(), llm).with_temperature(config.llm.temperature);
    let crew = Crew::new(vec![Task::new(
        "summary",
        prompt::summary(brief, history, succeeded, &date)?,
        "A complete project summary report in markdown with error analysis, fixes and lessons learned.",
        &analyst,
    )])?;
    let text = crew.kickoff().context("generate summary")?.to_string();

    let written_to = match fs::write(&config.summary_path, &text) {
        Ok(()) => {
            info!(path = %config.summary_path.display(), "summary written");
            Some(config.summary_path.clone())
        }
        Err(err) => {
            warn!(path = %config.summary_path.display(), err = %err, "failed to write summary");
            None
        }
    };
    Ok(SummaryReport { text, written_to })
}
