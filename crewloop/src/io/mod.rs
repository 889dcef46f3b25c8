//! Side-effecting helpers: configuration, child processes, agent tools and
//! iteration logs.

pub mod config;
pub mod iteration_log;
pub mod process;
pub mod sandbox;
pub mod search;
