//! Parsing of the text tool-calling protocol used by agents.
//!
//! Agents with tools are asked to answer either with
//!
//! ```text
//! Action: <tool name>
//! Action Input: <input>
//! ```
//!
//! or with `Final Answer: <text>`. Models often keep going after the action
//! and invent an `Observation:` of their own; everything from the first
//! observation on is discarded before parsing.

use std::sync::LazyLock;

use regex::Regex;

static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^[ \t]*Action[ \t]*:[ \t]*([^\n]+?)[ \t]*\n[ \t]*Action[ \t]+Input[ \t]*:[ \t]*(.*)")
        .expect("action regex is valid")
});

const FINAL_ANSWER: &str = "Final Answer:";
const OBSERVATION: &str = "Observation:";

/// One parsed model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStep {
    /// The model wants to call `tool` with `input`.
    Action { tool: String, input: String },
    /// The model is done.
    Final(String),
}

/// Parse a model reply into the next agent step.
///
/// An action wins over a final answer that appears after it (the model
/// guessed the observation). A reply with neither marker is a final answer.
pub fn parse_step(reply: &str) -> AgentStep {
    let visible = strip_observation(reply);

    if let Some(caps) = ACTION_RE.captures(visible) {
        let action_start = caps.get(0).map(|m| m.start()).unwrap_or(0);
        let final_before_action = visible[..action_start].contains(FINAL_ANSWER);
        if !final_before_action {
            let tool = caps[1].trim().trim_matches('`').trim_matches('"').to_string();
            let mut input = caps[2].to_string();
            if let Some(idx) = input.find(FINAL_ANSWER) {
                input.truncate(idx);
            }
            return AgentStep::Action {
                tool,
                input: strip_quotes(input.trim()).to_string(),
            };
        }
    }

    match visible.rfind(FINAL_ANSWER) {
        Some(idx) => AgentStep::Final(visible[idx + FINAL_ANSWER.len()..].trim().to_string()),
        None => AgentStep::Final(reply.trim().to_string()),
    }
}

/// Return `reply` cut at the first line starting with `Observation:`.
pub fn strip_observation(reply: &str) -> &str {
    let mut offset = 0;
    for line in reply.split_inclusive('\n') {
        if line.trim_start().starts_with(OBSERVATION) {
            return &reply[..offset];
        }
        offset += line.len();
    }
    reply
}

fn strip_quotes(input: &str) -> &str {
    if input.len() >= 2 && input.starts_with('"') && input.ends_with('"') && !input.contains('\n') {
        &input[1..input.len() - 1]
    } else {
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_action_with_multiline_input() {
        let reply = "Thought: I should run it.\nAction: code_execution_tool\nAction Input: ```python\nimport pygame\n```\n";
        assert_eq!(
            parse_step(reply),
            AgentStep::Action {
                tool: "code_execution_tool".to_string(),
                input: "```python\nimport pygame\n```".to_string(),
            }
        );
    }

    #[test]
    fn hallucinated_observation_is_dropped() {
        let reply = "Action: web_search\nAction Input: \"rust async\"\nObservation: lots of results\nFinal Answer: done";
        assert_eq!(
            parse_step(reply),
            AgentStep::Action {
                tool: "web_search".to_string(),
                input: "rust async".to_string(),
            }
        );
    }

    #[test]
    fn final_answer_is_extracted() {
        let reply = "Thought: I know it.\nFinal Answer: Test result: success\nAll good.";
        assert_eq!(
            parse_step(reply),
            AgentStep::Final("Test result: success\nAll good.".to_string())
        );
    }

    #[test]
    fn final_answer_before_action_wins() {
        let reply = "Final Answer: the plan is:\nAction: nothing\nAction Input: none";
        assert!(matches!(parse_step(reply), AgentStep::Final(_)));
    }

    #[test]
    fn plain_reply_is_final() {
        assert_eq!(
            parse_step("  just prose  "),
            AgentStep::Final("just prose".to_string())
        );
    }

    #[test]
    fn action_input_stops_at_trailing_final_answer() {
        let reply = "Action: web_search\nAction Input: rust\nFinal Answer: guessed";
        assert_eq!(
            parse_step(reply),
            AgentStep::Action {
                tool: "web_search".to_string(),
                input: "rust".to_string(),
            }
        );
    }

    #[test]
    fn strip_observation_keeps_text_without_marker() {
        assert_eq!(strip_observation("a\nb"), "a\nb");
        assert_eq!(strip_observation("a\n  Observation: x\nb"), "a\n");
    }
}
