//! Child processes attached to a pseudo-terminal
//!
//! Many interactive programs change their buffering (or refuse to run) when
//! stdout is not a terminal, so every program the harness drives gets a pty.
//! The master side is drained on a dedicated thread for the whole life of the
//! child: the kernel's pty buffer is small and a child blocks as soon as it
//! fills, which would deadlock against a parent sitting in `wait()`.

use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, ExitStatus, MasterPty, PtySize};

use crate::common::{Error, Result};

/// Exit code reported by [`launch`] when the child could not be started
pub const LAUNCH_FAILURE: i32 = 1;

/// How long `wait` lets the drain loop finish after the child exits.
/// A grandchild that inherited the terminal can keep it open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

const READ_CHUNK: usize = 8192;

/// Destination for drained terminal output
pub type OutputSink = Box<dyn Write + Send>;

/// Kill handle that stays usable while another thread waits on the child
pub type Killer = Box<dyn ChildKiller + Send + Sync>;

/// A program invocation: argv, environment overlay and working directory
#[derive(Debug, Clone, Default)]
pub struct PtyCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Variables layered over the harness's own environment
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl PtyCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Build from an argv vector; the first element is the program
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::usage("empty command line"))?;
        Ok(Self::new(program.clone()).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Human-readable command line for logs and error messages
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_builder(&self) -> CommandBuilder {
        let mut builder = CommandBuilder::new(&self.program);
        builder.args(&self.args);
        for (key, value) in &self.env {
            builder.env(key, value);
        }
        if let Some(dir) = &self.cwd {
            builder.cwd(dir);
        }
        builder
    }
}

/// A running child attached to a pty whose output is being drained
pub struct PtyProcess {
    program: String,
    child: Box<dyn Child + Send + Sync>,
    master: Box<dyn MasterPty + Send>,
    drain: Option<JoinHandle<()>>,
    drained_rx: mpsc::Receiver<u64>,
}

impl PtyProcess {
    /// Spawn `cmd` on a fresh pty and start draining its output into `output`
    ///
    /// With no output sink the drained bytes are discarded.
    pub fn spawn(cmd: &PtyCommand, output: Option<OutputSink>) -> Result<Self> {
        let launch_err = |e: &dyn std::fmt::Display| Error::launch(&cmd.program, e);

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| launch_err(&format!("failed to open pty: {e}")))?;

        let child = pair
            .slave
            .spawn_command(cmd.to_builder())
            .map_err(|e| launch_err(&e))?;

        // Our copy of the slave must go, otherwise the master never sees
        // end-of-stream when the child exits.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| launch_err(&format!("failed to clone pty reader: {e}")))?;

        let (drained_tx, drained_rx) = mpsc::channel();
        let program = cmd.program.clone();
        let drain = thread::Builder::new()
            .name(format!("pty-drain:{}", program))
            .spawn(move || {
                let total = drain_loop(reader, output);
                tracing::trace!(program = %program, bytes = total, "pty drained");
                let _ = drained_tx.send(total);
            })
            .map_err(|e| launch_err(&format!("failed to start drain thread: {e}")))?;

        tracing::debug!(
            command = %cmd.display(),
            pid = ?child.process_id(),
            "spawned pty child"
        );

        Ok(Self {
            program: cmd.program.clone(),
            child,
            master: pair.master,
            drain: Some(drain),
            drained_rx,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }

    /// Handle that can terminate the child from another thread
    pub fn killer(&self) -> Killer {
        self.child.clone_killer()
    }

    /// Writer feeding the child's terminal input (can be taken once)
    pub fn take_writer(&self) -> Result<OutputSink> {
        self.master
            .take_writer()
            .map_err(|e| Error::Internal(format!("pty writer unavailable: {e}")))
    }

    /// Block until the child exits and its output has been drained
    pub fn wait(mut self) -> Result<ExitStatus> {
        let status = self.child.wait().map_err(|e| {
            Error::Internal(format!("failed to wait for '{}': {}", self.program, e))
        })?;

        match self.drained_rx.recv_timeout(DRAIN_GRACE) {
            Ok(_) => {
                if let Some(handle) = self.drain.take() {
                    let _ = handle.join();
                }
            }
            Err(_) => {
                tracing::warn!(
                    program = %self.program,
                    "terminal still open after exit, abandoning drain loop"
                );
            }
        }

        tracing::debug!(program = %self.program, code = status.exit_code(), "pty child exited");
        Ok(status)
    }
}

/// Copy everything from the pty master into `output` until the terminal hangs up
fn drain_loop(mut reader: Box<dyn Read + Send>, mut output: Option<OutputSink>) -> u64 {
    let mut buf = [0u8; READ_CHUNK];
    let mut total = 0u64;
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                total += n as u64;
                if let Some(out) = output.as_mut() {
                    if let Err(e) = out.write_all(&buf[..n]) {
                        // Keep reading so the child never blocks on a full buffer
                        tracing::warn!(error = %e, "dropping pty output, sink rejected write");
                        output = None;
                    }
                }
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            // Linux reports EIO on the master once the last slave fd closes
            Err(_) => break,
        }
    }
    if let Some(out) = output.as_mut() {
        let _ = out.flush();
    }
    total
}

/// Convert a child's exit status into the harness error taxonomy
pub fn check_status(program: &str, status: &ExitStatus) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(Error::exit(program, format!("exit code {}", status.exit_code())))
    }
}

/// Run a command on a pty to completion and return its exit code
///
/// Returns [`LAUNCH_FAILURE`] without waiting when the child cannot be
/// started. Output is discarded unless `output` is given.
pub fn launch(cmd: &PtyCommand, output: Option<OutputSink>) -> i32 {
    let process = match PtyProcess::spawn(cmd, output) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(command = %cmd.display(), error = %e, "failed to start");
            return LAUNCH_FAILURE;
        }
    };

    match process.wait() {
        Ok(status) if status.success() => 0,
        Ok(status) => match i32::try_from(status.exit_code()) {
            Ok(0) | Err(_) => LAUNCH_FAILURE,
            Ok(code) => code,
        },
        Err(e) => {
            tracing::error!(command = %cmd.display(), error = %e, "wait failed");
            LAUNCH_FAILURE
        }
    }
}
