//! Minimal crew framework: agents with personas and tools, tasks, and a
//! sequential crew that threads task outputs into later tasks.

pub mod agent;
pub mod crew;
pub mod prompt;
pub mod tool;

pub use agent::{Agent, Persona};
pub use crew::{Crew, CrewOutput, Task, TaskOutput};
pub use tool::Tool;
