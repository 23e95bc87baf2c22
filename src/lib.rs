//! ptyharness - concurrent integration tests for interactive programs
//!
//! This library runs many isolated test sessions at once. Each session drives
//! a program attached to a pseudo-terminal through a scripted test case,
//! asserts on the program's output by polling its log, and every session's
//! failure is reported together at the end of the run.

pub mod assert;
pub mod cli;
pub mod commands;
pub mod common;
pub mod orchestrator;
pub mod pty;
pub mod script;
pub mod session;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use orchestrator::{aggregate, run_cases, RunReport};
pub use session::{LogSink, Session, SessionOptions, SessionState};
