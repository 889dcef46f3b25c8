//! Tools agents can call through the `Action:` protocol.

/// A named capability an agent can invoke by text.
///
/// Tools never fail from the agent's point of view: every problem is turned
/// into text the agent can read and react to.
pub trait Tool {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn run(&self, input: &str) -> String;
}
