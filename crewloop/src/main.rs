//! Multi-agent crews on the command line.
//!
//! `crewloop research` runs the research then write crew; `crewloop develop`
//! runs the develop, execute, test, debug loop until the generated program
//! survives the sandbox.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing::warn;

use crewloop::agents::prompt::ProgramBrief;
use crewloop::develop::{LoopStop, generate_summary, run_develop_loop};
use crewloop::exit_codes;
use crewloop::io::config::{CrewConfig, DEFAULT_CONFIG_PATH, read_config, write_config};
use crewloop::io::sandbox::CodeExecutionTool;
use crewloop::io::search::SerperSearchTool;
use crewloop::llm::{LlmClient, build_llm_client};
use crewloop::logging;
use crewloop::research::run_research;

const RULE: &str = "============================================================";

#[derive(Parser)]
#[command(name = "crewloop", version, about = "LLM agent crews for research and iterative development")]
struct Cli {
    /// Path to the TOML config (missing file means defaults).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Research a topic and write a blog article about it.
    Research {
        /// Override the configured topic.
        #[arg(long)]
        topic: Option<String>,
    },
    /// Develop a program, test it in the sandbox, and debug until it runs.
    Develop {
        /// Override the configured attempt budget.
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Skip the end-of-run summary report.
        #[arg(long)]
        no_summary: bool,
    },
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    // Loaded before logging so `RUST_LOG` may come from .env. A missing file is fine.
    dotenv::dotenv().ok();
    logging::init();

    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Research { topic } => cmd_research(&cli.config, topic),
        Command::Develop {
            max_iterations,
            no_summary,
        } => cmd_develop(&cli.config, max_iterations, no_summary),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &CrewConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

/// Config for `research`: file, then `GEMINI_MODEL_NAME`, then `--topic`.
fn research_config(path: &Path, topic: Option<String>, model: Option<String>) -> Result<CrewConfig> {
    let mut cfg = read_config(path)?;
    cfg.apply_research_model_override(model);
    if let Some(topic) = topic {
        cfg.research.topic = topic;
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Config for `develop`: file, then `--max-iterations`.
fn develop_config(path: &Path, max_iterations: Option<u32>) -> Result<CrewConfig> {
    let mut cfg = read_config(path)?;
    if let Some(max_iterations) = max_iterations {
        cfg.develop.max_iterations = max_iterations;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn cmd_research(path: &Path, topic: Option<String>) -> Result<i32> {
    let cfg = research_config(path, topic, std::env::var("GEMINI_MODEL_NAME").ok())?;

    // Credentials are checked before any agent runs.
    let llm = build_llm_client(&cfg.research.llm)?;
    let search = SerperSearchTool::from_env(&cfg.search)?;

    println!("{RULE}");
    println!("Starting the research crew");
    println!("Model: {}", llm.model_name());
    println!("{RULE}");

    let output = run_research(llm.as_ref(), &search, &cfg.research)?;

    println!("\n{RULE}");
    println!("Crew finished. Final output:");
    println!("{RULE}\n");
    println!("{output}");
    Ok(exit_codes::OK)
}

fn cmd_develop(path: &Path, max_iterations: Option<u32>, no_summary: bool) -> Result<i32> {
    let cfg = develop_config(path, max_iterations)?;

    let llm = build_llm_client(&cfg.develop.llm)?;
    let sandbox = CodeExecutionTool::new(cfg.sandbox.clone());
    let brief = ProgramBrief::SNAKE_GAME;

    println!("Starting automated {} development", brief.program);
    println!(
        "Develop, test and debug repeat until the program runs (at most {} attempts)\n",
        cfg.develop.max_iterations
    );

    let outcome = run_develop_loop(llm.as_ref(), &sandbox, &cfg.develop, &brief, |record| {
        println!("{RULE}");
        println!("Iteration {} test report ({}):", record.iteration, record.role);
        println!("{RULE}");
        println!("{}", record.result);
        println!(
            "{}\n",
            if record.success { "Test passed." } else { "Test failed." }
        );
    })?;

    println!("{RULE}");
    let code = match &outcome.stop {
        LoopStop::Succeeded { iteration } => {
            println!("Done: a working {} was produced on attempt {iteration}.", brief.program);
            if let Some(saved) = &outcome.saved_code {
                println!("Saved to: {}", saved.display());
            }
            exit_codes::OK
        }
        LoopStop::Exhausted { max_iterations } => {
            println!(
                "Failed: no working program after {max_iterations} attempts. Last report:\n{}",
                outcome.final_report
            );
            exit_codes::EXHAUSTED
        }
    };
    println!("{RULE}");

    if !no_summary {
        println!("\nGenerating the development summary...\n");
        match generate_summary(
            llm.as_ref(),
            &cfg.develop,
            &brief,
            &outcome.history,
            outcome.succeeded(),
        ) {
            Ok(summary) => {
                println!("{}", summary.text);
                if let Some(written) = &summary.written_to {
                    println!("\nSummary saved to: {}", written.display());
                }
            }
            Err(err) => warn!(err = %format!("{err:#}"), "summary generation failed"),
        }
    }

    Ok(code)
}
