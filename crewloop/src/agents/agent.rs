//! A role-playing agent bound to an LLM and an optional toolset.

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::agents::prompt::{self, ToolCard};
use crate::agents::tool::Tool;
use crate::core::react::{AgentStep, parse_step, strip_observation};
use crate::llm::{ChatMessage, LlmClient, LlmRequest};

pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 5;

const OBSERVATION_LIMIT_BYTES: usize = 20_000;

/// Who the agent is: shown to the model as its system prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub role: String,
    pub goal: String,
    pub backstory: String,
}

impl Persona {
    pub fn new(role: &str, goal: &str, backstory: &str) -> Self {
        Self {
            role: role.to_string(),
            goal: goal.to_string(),
            backstory: backstory.to_string(),
        }
    }
}

pub struct Agent<'a> {
    persona: Persona,
    llm: &'a dyn LlmClient,
    tools: Vec<&'a dyn Tool>,
    temperature: Option<f32>,
    max_tool_rounds: u32,
}

impl<'a> Agent<'a> {
    pub fn new(persona: Persona, llm: &'a dyn LlmClient) -> Self {
        Self {
            persona,
            llm,
            tools: Vec::new(),
            temperature: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_tool(mut self, tool: &'a dyn Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn role(&self) -> &str {
        &self.persona.role
    }

    fn system_prompt(&self) -> Result<String> {
        let cards: Vec<ToolCard<'_>> = self
            .tools
            .iter()
            .map(|tool| ToolCard {
                name: tool.name(),
                description: tool.description(),
            })
            .collect();
        prompt::agent_system(
            &self.persona.role,
            &self.persona.goal,
            &self.persona.backstory,
            &cards,
        )
    }

    fn find_tool(&self, name: &str) -> Option<&'a dyn Tool> {
        self.tools
            .iter()
            .copied()
            .find(|tool| tool.name().eq_ignore_ascii_case(name.trim()))
    }

    fn observe(&self, tool_name: &str, input: &str) -> String {
        match self.find_tool(tool_name) {
            Some(tool) => {
                info!(agent = %self.persona.role, tool = tool.name(), "using tool");
                truncate(tool.run(input), OBSERVATION_LIMIT_BYTES)
            }
            None => {
                let available = self
                    .tools
                    .iter()
                    .map(|tool| tool.name())
                    .collect::<Vec<_>>()
                    .join(", ");
                warn!(agent = %self.persona.role, tool = tool_name, "model asked for unknown tool");
                format!(
                    "'{tool_name}' is not a valid tool. Use one of [{available}], or give your Final Answer."
                )
            }
        }
    }

    /// Run one task prompt to a final answer.
    ///
    /// Tool calls are served until the model answers or `max_tool_rounds`
    /// actions have run; then the model is told to answer immediately and that
    /// reply is final. LLM errors propagate.
    #[instrument(skip_all, fields(agent = %self.persona.role))]
    pub fn execute(&self, task_prompt: &str) -> Result<String> {
        let mut request = LlmRequest {
            system_prompt: Some(self.system_prompt()?),
            messages: vec![ChatMessage::user(task_prompt)],
            temperature: self.temperature,
        };

        let mut rounds = 0u32;
        loop {
            let reply = self.llm.complete(&request)?.content;
            debug!(chars = reply.len(), "model replied");

            let (tool, input) = match parse_step(&reply) {
                AgentStep::Final(answer) => {
                    info!(rounds, "agent finished");
                    return Ok(answer);
                }
                AgentStep::Action { tool, input } if !self.tools.is_empty() => (tool, input),
                AgentStep::Action { .. } => {
                    // No tools: the text is the answer even if it looks like an action.
                    return Ok(reply.trim().to_string());
                }
            };

            if rounds >= self.max_tool_rounds {
                warn!(rounds, "tool budget spent, asking for a final answer");
                request
                    .messages
                    .push(ChatMessage::assistant(strip_observation(&reply).trim()));
                request.messages.push(ChatMessage::user(
                    "You have used all the tool calls available to you. Reply now with your Final Answer.",
                ));
                let last = self.llm.complete(&request)?.content;
                return Ok(match parse_step(&last) {
                    AgentStep::Final(answer) => answer,
                    AgentStep::Action { .. } => last.trim().to_string(),
                });
            }

            rounds += 1;
            let observation = self.observe(&tool, &input);
            request
                .messages
                .push(ChatMessage::assistant(strip_observation(&reply).trim()));
            request
                .messages
                .push(ChatMessage::user(format!("Observation: {observation}")));
        }
    }
}

fn truncate(mut text: String, limit: usize) -> String {
    if text.len() <= limit {
        return text;
    }
    let mut cut = limit;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let dropped = text.len() - cut;
    text.truncate(cut);
    text.push_str(&format!("\n[truncated {dropped} bytes]"));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedLlm, ScriptedTool};

    fn persona() -> Persona {
        Persona::new("QA engineer", "test code", "Careful.")
    }

    #[test]
    fn plain_answer_without_tools() {
        let llm = ScriptedLlm::new(["Final Answer: the article"]);
        let agent = Agent::new(persona(), &llm);
        assert_eq!(agent.execute("write").unwrap(), "the article");
        assert_eq!(llm.requests().len(), 1);
    }

    #[test]
    fn runs_tool_and_feeds_observation_back() {
        let llm = ScriptedLlm::new([
            "Thought: run it\nAction: code_execution_tool\nAction Input: print(1)\nObservation: made up",
            "Final Answer: Test result: success",
        ]);
        let tool = ScriptedTool::new("code_execution_tool", ["Execution succeeded"]);
        let agent = Agent::new(persona(), &llm).with_tool(&tool);

        let answer = agent.execute("test it").unwrap();
        assert_eq!(answer, "Test result: success");
        assert_eq!(tool.inputs(), vec!["print(1)".to_string()]);

        let requests = llm.requests();
        assert_eq!(requests.len(), 2);
        let second = &requests[1].messages;
        assert_eq!(second.len(), 3);
        assert!(!second[1].content.contains("made up"));
        assert_eq!(second[2].content, "Observation: Execution succeeded");
    }

    #[test]
    fn unknown_tool_gets_corrective_observation() {
        let llm = ScriptedLlm::new([
            "Action: python_runner\nAction Input: x",
            "Final Answer: gave up",
        ]);
        let tool = ScriptedTool::new("code_execution_tool", Vec::<String>::new());
        let agent = Agent::new(persona(), &llm).with_tool(&tool);

        assert_eq!(agent.execute("test").unwrap(), "gave up");
        assert!(tool.inputs().is_empty());
        let requests = llm.requests();
        assert!(requests[1].messages[2]
            .content
            .contains("'python_runner' is not a valid tool. Use one of [code_execution_tool]"));
    }

    #[test]
    fn tool_budget_forces_final_answer() {
        let llm = ScriptedLlm::new([
            "Action: code_execution_tool\nAction Input: a",
            "Action: code_execution_tool\nAction Input: b",
            "Action: code_execution_tool\nAction Input: c",
            "Final Answer: forced",
        ]);
        let tool = ScriptedTool::new("code_execution_tool", ["r1", "r2"]);
        let agent = Agent::new(persona(), &llm)
            .with_tool(&tool)
            .with_max_tool_rounds(2);

        assert_eq!(agent.execute("test").unwrap(), "forced");
        assert_eq!(tool.inputs(), vec!["a".to_string(), "b".to_string()]);
        let last = llm.requests().pop().unwrap();
        assert!(last
            .messages
            .last()
            .unwrap()
            .content
            .contains("Reply now with your Final Answer"));
    }

    #[test]
    fn action_text_without_tools_is_the_answer() {
        let llm = ScriptedLlm::new(["Action: something\nAction Input: x"]);
        let agent = Agent::new(persona(), &llm);
        assert_eq!(
            agent.execute("go").unwrap(),
            "Action: something\nAction Input: x"
        );
    }

    #[test]
    fn system_prompt_and_temperature_are_sent() {
        let llm = ScriptedLlm::new(["Final Answer: ok"]);
        let agent = Agent::new(persona(), &llm).with_temperature(Some(0.1));
        agent.execute("go").unwrap();
        let request = llm.requests().remove(0);
        assert!(request
            .system_prompt
            .unwrap()
            .starts_with("You are QA engineer."));
        assert_eq!(request.temperature, Some(0.1));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = truncate("héllo".to_string(), 2);
        assert!(text.starts_with('h'));
        assert!(text.contains("[truncated"));
    }
}
