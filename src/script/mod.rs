//! Test case scripts
//!
//! Loading test case files, the per-session environment, named commands and
//! the engine that runs a case's steps.

mod case;
mod commands;
mod engine;
mod env;

pub use case::{load_cases, TestCase, TestStep};
pub use commands::{parse_duration, CommandFn, CommandRegistry};
pub use engine::{ScriptEngine, StepEngine};
pub use env::{ProgramInput, ScriptContext, ScriptEnv};
