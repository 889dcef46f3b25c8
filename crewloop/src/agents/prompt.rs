//! Prompt rendering for agents, tasks, and the two pipelines.

use std::sync::LazyLock;

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::types::IterationRecord;

const AGENT_SYSTEM_TEMPLATE: &str = include_str!("prompts/agent_system.md");
const TASK_TEMPLATE: &str = include_str!("prompts/task.md");
const DEVELOP_INITIAL_TEMPLATE: &str = include_str!("prompts/develop_initial.md");
const DEVELOP_FIX_TEMPLATE: &str = include_str!("prompts/develop_fix.md");
const TEST_CODE_TEMPLATE: &str = include_str!("prompts/test_code.md");
const SUMMARY_TEMPLATE: &str = include_str!("prompts/summary.md");
const RESEARCH_TEMPLATE: &str = include_str!("prompts/research.md");
const WRITE_ARTICLE_TEMPLATE: &str = include_str!("prompts/write_article.md");

static ENGINE: LazyLock<PromptEngine> = LazyLock::new(PromptEngine::new);

/// Tool name and description as shown to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCard<'a> {
    pub name: &'a str,
    pub description: &'a str,
}

/// The program the develop pipeline is asked to build.
#[derive(Debug, Clone, Serialize)]
pub struct ProgramBrief {
    pub program: &'static str,
    pub language: &'static str,
    pub library: &'static str,
    pub window: &'static str,
}

impl ProgramBrief {
    pub const SNAKE_GAME: ProgramBrief = ProgramBrief {
        program: "snake game",
        language: "Python",
        library: "Pygame",
        window: "600x400",
    };
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        for (name, source) in [
            ("agent_system", AGENT_SYSTEM_TEMPLATE),
            ("task", TASK_TEMPLATE),
            ("develop_initial", DEVELOP_INITIAL_TEMPLATE),
            ("develop_fix", DEVELOP_FIX_TEMPLATE),
            ("test_code", TEST_CODE_TEMPLATE),
            ("summary", SUMMARY_TEMPLATE),
            ("research", RESEARCH_TEMPLATE),
            ("write_article", WRITE_ARTICLE_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("bundled prompt templates should be valid");
        }
        Self { env }
    }

    fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String> {
        let rendered = self.env.get_template(name)?.render(ctx)?;
        Ok(rendered.trim().to_string())
    }
}

pub fn agent_system(role: &str, goal: &str, backstory: &str, tools: &[ToolCard<'_>]) -> Result<String> {
    let tool_names = tools
        .iter()
        .map(|tool| tool.name)
        .collect::<Vec<_>>()
        .join(", ");
    ENGINE.render(
        "agent_system",
        context! {
            role => role.trim(),
            goal => goal.trim(),
            backstory => backstory.trim(),
            tools => tools,
            tool_names => tool_names,
        },
    )
}

pub fn task(description: &str, expected_output: &str, context: Option<&str>) -> Result<String> {
    ENGINE.render(
        "task",
        context! {
            description => description.trim(),
            expected_output => expected_output.trim(),
            context => context.map(str::trim).filter(|s| !s.is_empty()),
        },
    )
}

pub fn develop_initial(brief: &ProgramBrief) -> Result<String> {
    ENGINE.render("develop_initial", brief)
}

pub fn develop_fix(
    brief: &ProgramBrief,
    previous_iteration: u32,
    previous_report: &str,
    previous_code: Option<&str>,
) -> Result<String> {
    ENGINE.render(
        "develop_fix",
        context! {
            program => brief.program,
            language => brief.language,
            library => brief.library,
            previous_iteration => previous_iteration,
            previous_report => previous_report.trim(),
            previous_code => previous_code.map(str::trim).filter(|s| !s.is_empty()),
        },
    )
}

pub fn test_code(brief: &ProgramBrief, tool_name: &str, timeout_secs: u64) -> Result<String> {
    ENGINE.render(
        "test_code",
        context! {
            program => brief.program,
            tool_name => tool_name,
            timeout_secs => timeout_secs,
        },
    )
}

pub fn summary(
    brief: &ProgramBrief,
    history: &[IterationRecord],
    succeeded: bool,
    date: &str,
) -> Result<String> {
    ENGINE.render(
        "summary",
        context! {
            program => brief.program,
            language => brief.language,
            library => brief.library,
            history => history,
            succeeded => succeeded,
            date => date,
        },
    )
}

pub fn research(topic: &str, trend_count: u32) -> Result<String> {
    ENGINE.render(
        "research",
        context! { topic => topic.trim(), trend_count => trend_count },
    )
}

pub fn write_article(topic: &str, article_words: u32) -> Result<String> {
    ENGINE.render(
        "write_article",
        context! { topic => topic.trim(), article_words => article_words },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_lists_tools_and_protocol() {
        let tools = [ToolCard {
            name: "code_execution_tool",
            description: "runs code",
        }];
        let prompt = agent_system("QA engineer", "test code", "You are careful.", &tools).unwrap();
        assert!(prompt.starts_with("You are QA engineer."));
        assert!(prompt.contains("- code_execution_tool: runs code"));
        assert!(prompt.contains("one of [code_execution_tool]"));
        assert!(prompt.contains("Action Input:"));
    }

    #[test]
    fn system_prompt_without_tools_skips_protocol() {
        let prompt = agent_system("Writer", "write", "Famous.", &[]).unwrap();
        assert!(!prompt.contains("Action Input"));
        assert!(prompt.contains("Final Answer:"));
    }

    #[test]
    fn task_prompt_includes_context_only_when_present() {
        let with = task("Do it", "A thing", Some("earlier output")).unwrap();
        assert!(with.contains("Context from earlier work:\n\nearlier output"));
        let without = task("Do it", "A thing", Some("   ")).unwrap();
        assert!(!without.contains("Context from earlier work"));
    }

    #[test]
    fn fix_prompt_carries_previous_report_and_code() {
        let prompt = develop_fix(
            &ProgramBrief::SNAKE_GAME,
            2,
            "Test result: failure\nNameError",
            Some("print(x)"),
        )
        .unwrap();
        assert!(prompt.contains("attempt 2"));
        assert!(prompt.contains("NameError"));
        assert!(prompt.contains("print(x)"));
    }

    #[test]
    fn summary_lists_every_iteration() {
        let history = vec![
            IterationRecord {
                iteration: 1,
                role: "Senior Python game developer".to_string(),
                result: "Test result: failure".to_string(),
                success: false,
            },
            IterationRecord {
                iteration: 2,
                role: "Debugging specialist".to_string(),
                result: "Test result: success".to_string(),
                success: true,
            },
        ];
        let prompt = summary(&ProgramBrief::SNAKE_GAME, &history, true, "2025-01-02").unwrap();
        assert!(prompt.contains("### Iteration 1\nRole: Senior Python game developer\nTest result: failed"));
        assert!(prompt.contains("### Iteration 2"));
        assert!(prompt.contains("Total iterations: 2"));
        assert!(prompt.contains("Final result: success"));
        assert!(prompt.contains("Report date: 2025-01-02"));
    }

    #[test]
    fn pipeline_prompts_render() {
        assert!(develop_initial(&ProgramBrief::SNAKE_GAME).unwrap().contains("600x400"));
        assert!(test_code(&ProgramBrief::SNAKE_GAME, "code_execution_tool", 10)
            .unwrap()
            .contains("ran for 10 seconds"));
        assert!(research("AI", 5).unwrap().contains("identify 5 items about AI"));
        assert!(write_article("AI", 500).unwrap().contains("about 500 words"));
    }
}
