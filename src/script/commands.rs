//! Named script commands
//!
//! Every command receives the script context, the negation flag and its
//! argument list, and reports failure through its `Result`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::assert::log_wait;
use crate::common::{Error, Result};
use crate::pty::{check_status, PtyProcess};

use super::case::is_contained;
use super::env::ScriptContext;

/// Signature shared by all script commands
pub type CommandFn = dyn Fn(&mut ScriptContext, bool, &[String]) -> Result<()> + Send + Sync;

/// Registry of commands available to scripts, keyed by name
#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Arc<CommandFn>>,
}

impl CommandRegistry {
    /// Registry with no commands at all
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in commands
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("errlogwait", errlogwait);
        registry.register("exec", exec);
        registry.register("send", send);
        registry.register("sleep", sleep);
        registry.register("exists", exists);
        registry
    }

    /// Add or replace a command
    pub fn register<F>(&mut self, name: &str, command: F)
    where
        F: Fn(&mut ScriptContext, bool, &[String]) -> Result<()> + Send + Sync + 'static,
    {
        self.commands.insert(name.to_string(), Arc::new(command));
    }

    pub fn get(&self, name: &str) -> Option<Arc<CommandFn>> {
        self.commands.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }
}

/// `errlogwait REGEX`: poll the session log until REGEX matches
fn errlogwait(ctx: &mut ScriptContext, negate: bool, args: &[String]) -> Result<()> {
    log_wait(ctx.log(), negate, args, ctx.strategy(), ctx.interrupt()).map(|_| ())
}

/// `exec PROGRAM [ARGS...]`: run to completion on a pty, output into the session log
///
/// Negated, the program must exit unsuccessfully (it must still start).
fn exec(ctx: &mut ScriptContext, negate: bool, args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Err(Error::usage("exec expects a program to run"));
    }
    let cmd = ctx.env().command(args)?;
    let interrupted = || Error::Interrupted(format!("exec {}", cmd.display()));
    if ctx.interrupt().is_raised() {
        return Err(interrupted());
    }
    tracing::debug!(command = %cmd.display(), negate, "exec");

    let process = PtyProcess::spawn(&cmd, Some(Box::new(ctx.log().clone())))?;
    let tracked = ctx.interrupt().track(process.killer());
    let status = process.wait()?;
    drop(tracked);
    if ctx.interrupt().is_raised() {
        return Err(interrupted());
    }

    match (check_status(&cmd.program, &status), negate) {
        (Ok(()), false) | (Err(_), true) => Ok(()),
        (Err(e), false) => Err(e),
        (Ok(()), true) => Err(Error::exit(
            &cmd.program,
            "exit code 0, expected failure",
        )),
    }
}

/// `send TEXT...`: type the arguments, space separated, into the program's terminal
///
/// A carriage return is appended, as if Enter had been pressed.
fn send(ctx: &mut ScriptContext, negate: bool, args: &[String]) -> Result<()> {
    if negate {
        return Err(Error::usage("send does not support negation"));
    }
    if args.is_empty() {
        return Err(Error::usage("send expects text to type"));
    }
    let mut line = args.join(" ");
    line.push('\r');
    ctx.send(line.as_bytes())
}

/// `sleep DURATION`: pause the script, e.g. `500ms` or `2s`
fn sleep(ctx: &mut ScriptContext, negate: bool, args: &[String]) -> Result<()> {
    if negate {
        return Err(Error::usage("sleep does not support negation"));
    }
    let [duration] = args else {
        return Err(Error::usage("sleep expects a single duration argument"));
    };
    if ctx.interrupt().sleep(parse_duration(duration)?) {
        Ok(())
    } else {
        Err(Error::Interrupted(format!("sleep {}", duration)))
    }
}

/// `exists PATH...`: every path exists under the work directory (none, if negated)
fn exists(ctx: &mut ScriptContext, negate: bool, args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Err(Error::usage("exists expects at least one path"));
    }
    for name in args {
        if !is_contained(std::path::Path::new(name)) {
            return Err(Error::usage(format!(
                "exists: '{}' must be relative to the work directory",
                name
            )));
        }
        let present = ctx.work_dir().join(name).exists();
        if present == negate {
            let expectation = if negate { "not to exist" } else { "to exist" };
            return Err(Error::TestAssertion(format!(
                "expected '{}' {}",
                name, expectation
            )));
        }
    }
    Ok(())
}

/// Parse `250ms`, `3s` or `1m`
pub fn parse_duration(text: &str) -> Result<Duration> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| Error::usage(format!("invalid duration '{}'", text)))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" | "" => Ok(Duration::from_secs(value)),
        "m" => value
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| Error::usage(format!("duration '{}' is too long", text))),
        _ => Err(Error::usage(format!(
            "invalid duration unit '{}' in '{}' (use ms, s or m)",
            unit, text
        ))),
    }
}
