//! Script engines
//!
//! The harness treats the engine as a collaborator: it prepares the
//! environment once per session through `setup`, then hands over the test
//! case and an explicit context in `run`.

use crate::common::{Error, Result};

use super::case::TestCase;
use super::commands::CommandRegistry;
use super::env::{ScriptContext, ScriptEnv};

/// Executes a test case's script for one session
pub trait ScriptEngine: Send + Sync {
    /// Adjust the session environment before anything runs
    fn setup(&self, _env: &mut ScriptEnv) -> Result<()> {
        Ok(())
    }

    /// Run the script to completion; the first failing step ends it
    fn run(&self, case: &TestCase, ctx: &mut ScriptContext) -> Result<()>;
}

/// Engine that runs each step by dispatching to a named command
#[derive(Clone)]
pub struct StepEngine {
    commands: CommandRegistry,
}

impl StepEngine {
    pub fn new(commands: CommandRegistry) -> Self {
        Self { commands }
    }
}

impl Default for StepEngine {
    fn default() -> Self {
        Self::new(CommandRegistry::builtin())
    }
}

impl ScriptEngine for StepEngine {
    fn run(&self, case: &TestCase, ctx: &mut ScriptContext) -> Result<()> {
        for (i, step) in case.steps.iter().enumerate() {
            let number = i + 1;
            let wrap = |source: Error| Error::Step {
                number,
                command: step.to_string(),
                source: Box::new(source),
            };

            let command = self
                .commands
                .get(&step.cmd)
                .ok_or_else(|| wrap(Error::usage(format!("unknown command '{}'", step.cmd))))?;

            tracing::debug!(session = %ctx.env().id, step = number, command = %step, "running step");
            command(&mut *ctx, step.negate, &step.args).map_err(wrap)?;
        }
        Ok(())
    }
}
