//! Per-session script environment and the context handed to commands

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::assert::RetryStrategy;
use crate::common::{Error, Result};
use crate::pty::{OutputSink, PtyCommand};
use crate::session::{Interrupt, LogSink};

/// Mutable environment prepared for one session before its script runs
#[derive(Debug, Clone)]
pub struct ScriptEnv {
    /// Session id
    pub id: String,
    /// Root of the session's private directory tree
    pub work_dir: PathBuf,
    /// Variables layered over the harness's own environment
    pub vars: BTreeMap<String, String>,
}

impl ScriptEnv {
    pub fn new(id: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            work_dir: work_dir.into(),
            vars: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// A command that runs inside this environment: overlay applied, work dir as cwd
    pub fn command(&self, argv: &[String]) -> Result<PtyCommand> {
        Ok(PtyCommand::from_argv(argv)?
            .envs(&self.vars)
            .cwd(&self.work_dir))
    }
}

/// Shared handle to the driven program's terminal input
pub type ProgramInput = Arc<Mutex<Option<OutputSink>>>;

/// Everything a script command may touch, passed in explicitly
///
/// Commands never look session state up by name; the session builds one of
/// these and hands it to the engine.
pub struct ScriptContext {
    env: ScriptEnv,
    log: LogSink,
    strategy: RetryStrategy,
    input: Option<ProgramInput>,
    interrupt: Interrupt,
}

impl ScriptContext {
    pub fn new(env: ScriptEnv, log: LogSink, strategy: RetryStrategy) -> Self {
        Self {
            env,
            log,
            strategy,
            input: None,
            interrupt: Interrupt::new(),
        }
    }

    /// Attach the terminal input of the session's driven program
    pub fn with_input(mut self, input: ProgramInput) -> Self {
        self.input = Some(input);
        self
    }

    /// Share the session's teardown signal with this script
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn env(&self) -> &ScriptEnv {
        &self.env
    }

    pub fn work_dir(&self) -> &Path {
        &self.env.work_dir
    }

    pub fn log(&self) -> &LogSink {
        &self.log
    }

    pub fn strategy(&self) -> &RetryStrategy {
        &self.strategy
    }

    /// Raised when the session is torn down; blocking commands must honour it
    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    pub fn has_program(&self) -> bool {
        self.input.is_some()
    }

    /// Type `bytes` into the driven program's terminal
    pub fn send(&self, bytes: &[u8]) -> Result<()> {
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| Error::usage("send requires a test case with a program"))?;
        let mut guard = input
            .lock()
            .map_err(|_| Error::Internal("program input lock poisoned".to_string()))?;
        let writer = guard
            .as_mut()
            .ok_or_else(|| Error::usage("program input is already closed"))?;
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }
}
