//! Research then write crew for `crewloop research`.

use anyhow::Result;
use tracing::instrument;

use crate::agents::prompt;
use crate::agents::{Agent, Crew, CrewOutput, Persona, Task, Tool};
use crate::io::config::ResearchConfig;
use crate::llm::LlmClient;

fn researcher_persona(topic: &str) -> Persona {
    Persona::new(
        "Senior market researcher",
        &format!("Find {topic}."),
        "You are an experienced market researcher who analyses emerging technology and reliably \
         predicts the next big trend. You use your web search tool to get the latest information.",
    )
}

fn writer_persona(topic: &str) -> Persona {
    Persona::new(
        "Professional technical content writer",
        &format!("Write an engaging blog article about {topic}."),
        "You are a well-known technical writer who turns complex ideas into articles that are easy \
         to follow and engaging. Your articles regularly make the headlines of the tech press.",
    )
}

/// Run the two-task crew: the researcher (holding `search`) reports, the
/// writer turns the report into an article.
#[instrument(skip_all, fields(model = llm.model_name()))]
pub fn run_research(llm: &dyn LlmClient, search: &dyn Tool, config: &ResearchConfig) -> Result<CrewOutput> {
    let topic = config.topic.trim();
    let researcher = Agent::new(researcher_persona(topic), llm)
        .with_tool(search)
        .with_temperature(config.llm.temperature)
        .with_max_tool_rounds(config.max_tool_rounds);
    let writer = Agent::new(writer_persona(topic), llm).with_temperature(config.llm.temperature);

    let crew = Crew::new(vec![
        Task::new(
            "research",
            prompt::research(topic, config.trend_count)?,
            &format!(
                "A focused report listing {} items with an analysis of each.",
                config.trend_count
            ),
            &researcher,
        ),
        Task::new(
            "write",
            prompt::write_article(topic, config.article_words)?,
            "A complete, well-formatted and engaging blog article.",
            &writer,
        ),
    ])?;
    crew.kickoff()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedLlm, ScriptedTool};

    #[test]
    fn researcher_searches_and_writer_uses_the_report() {
        let llm = ScriptedLlm::new([
            "Thought: look it up\nAction: web_search\nAction Input: {\"search_query\": \"AI trends 2025\"}",
            "Final Answer: 1. Agents\n2. Small models",
            "Final Answer: # The year of agents",
        ]);
        let search = ScriptedTool::new("web_search", ["1. Agentic AI\n   Link: https://example.com"]);
        let config = ResearchConfig::default();

        let output = run_research(&llm, &search, &config).unwrap();

        assert_eq!(output.raw(), "# The year of agents");
        assert_eq!(output.tasks[0].raw, "1. Agents\n2. Small models");
        assert_eq!(search.inputs(), vec!["{\"search_query\": \"AI trends 2025\"}"]);

        let requests = llm.requests();
        let research_system = requests[0].system_prompt.as_deref().unwrap();
        assert!(research_system.contains("web_search"));
        assert!(requests[0].messages[0].content.contains("identify 5 items"));
        assert_eq!(requests[1].messages[2].content, "Observation: 1. Agentic AI\n   Link: https://example.com");

        let writer_task = &requests[2].messages[0].content;
        assert!(writer_task.contains("about 500 words"));
        assert!(writer_task.contains("1. Agents\n2. Small models"));
        assert!(!requests[2].system_prompt.as_deref().unwrap().contains("web_search"));
    }

    #[test]
    fn uses_configured_topic() {
        let llm = ScriptedLlm::new(["Final Answer: report", "Final Answer: article"]);
        let search = ScriptedTool::new("web_search", Vec::<String>::new());
        let config = ResearchConfig {
            topic: "quantum networking".to_string(),
            trend_count: 3,
            ..ResearchConfig::default()
        };

        run_research(&llm, &search, &config).unwrap();
        let first = &llm.requests()[0].messages[0].content;
        assert!(first.contains("identify 3 items about quantum networking"));
        assert!(search.inputs().is_empty());
    }
}
