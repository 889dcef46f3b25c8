//! Small multi-agent crews driven by a large language model.
//!
//! Two pipelines are provided:
//!
//! - **[`research`]**: a researcher with a web search tool reports on a topic
//!   and a writer turns the report into a blog article.
//! - **[`develop`]**: a develop, execute, test, debug loop. A developer writes
//!   a program, a tester runs it in the execution sandbox, and a debugger
//!   repairs it until a test report passes or the attempt budget runs out.
//!
//! The layering follows a strict split:
//!
//! - **[`core`]**: pure logic (records, verdicts, reply parsing). No I/O.
//! - **[`llm`]**: blocking chat clients behind [`llm::LlmClient`].
//! - **[`agents`]**: agents, tasks, the sequential crew, and prompts.
//! - **[`io`]**: configuration, child processes, the agent tools, logs.

pub mod agents;
pub mod core;
pub mod develop;
pub mod exit_codes;
pub mod io;
pub mod llm;
pub mod logging;
pub mod research;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
