//! Deterministic, pure logic shared by the crew pipelines.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod code_block;
pub mod react;
pub mod types;
pub mod verdict;
