//! Session lifecycle
//!
//! A session is one test case running in isolation: its own work directory,
//! environment overlay, log sink, driven program and script thread.
//!
//! Lifecycle: `create` (Created) -> `start` (Running) -> `wait` (Done/Failed)
//! -> `close` (Closing, then Done/Failed). `close` always runs exactly once,
//! from an explicit call or from `Drop`.

mod interrupt;
mod log_sink;

pub use interrupt::{Interrupt, Tracked};
pub use log_sink::LogSink;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use crate::assert::RetryStrategy;
use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::pty::{check_status, Killer, PtyProcess};
use crate::script::{ProgramInput, ScriptContext, ScriptEngine, ScriptEnv, TestCase};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Work directory and environment prepared, nothing running
    Created,
    /// Script and program running
    Running,
    /// Teardown in progress
    Closing,
    /// Finished without error
    Done,
    /// Finished with an error
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Closing => write!(f, "closing"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Settings shared by every session of a run
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Parent of all session work directories
    pub workdir_root: PathBuf,
    pub keep_workdir: bool,
    /// Mirror session logs to `<workdir_root>/<session dir>.log`
    pub log_to_file: bool,
    /// Variables every session starts with
    pub env: BTreeMap<String, String>,
    pub strategy: RetryStrategy,
    /// Time a program gets to exit by itself after its script passed
    pub quit_grace: Duration,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        let mut env = BTreeMap::new();
        for name in &config.session.passthrough_env {
            if let Ok(value) = std::env::var(name) {
                env.insert(name.clone(), value);
            }
        }
        env.extend(config.env.clone());

        Self {
            workdir_root: paths::workdir_root(config.session.workdir_root.as_deref()),
            keep_workdir: config.session.keep_workdirs,
            log_to_file: config.session.log_sessions,
            env,
            strategy: config.assertion.strategy(),
            quit_grace: Duration::from_millis(config.session.quit_grace_ms),
        }
    }
}

/// State shared between the session and its worker threads
struct Shared {
    id: String,
    state: Mutex<SessionState>,
    /// First error from either worker; later errors are only logged
    first_error: OnceLock<Error>,
    killer: Mutex<Option<Killer>>,
    /// Set once the harness has signalled the program
    stopped: AtomicBool,
    exited: Mutex<bool>,
    exited_cv: Condvar,
    interrupt: Interrupt,
    log: LogSink,
}

impl Shared {
    fn set_state(&self, state: SessionState) {
        *lock(&self.state) = state;
    }

    fn record(&self, error: Error) {
        if let Err(later) = self.first_error.set(error) {
            tracing::debug!(session = %self.id, error = %later, "additional session error");
        }
    }

    /// Terminate the driven program if it is still running
    ///
    /// How a program the harness killed exits is not held against the session.
    fn kill_program(&self) {
        if let Some(mut killer) = lock(&self.killer).take() {
            self.stopped.store(true, Ordering::SeqCst);
            if let Err(e) = killer.kill() {
                tracing::debug!(session = %self.id, error = %e, "kill failed, program already gone");
            }
        }
    }

    fn mark_exited(&self) {
        *lock(&self.exited) = true;
        self.exited_cv.notify_all();
    }

    /// Wait up to `grace` for the driven program to exit; true if it did
    fn wait_exited(&self, grace: Duration) -> bool {
        let exited = lock(&self.exited);
        let (exited, _) = self
            .exited_cv
            .wait_timeout_while(exited, grace, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
        *exited
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One isolated test case execution
pub struct Session {
    shared: Arc<Shared>,
    case: Arc<TestCase>,
    engine: Arc<dyn ScriptEngine>,
    env: ScriptEnv,
    strategy: RetryStrategy,
    quit_grace: Duration,
    work_dir: Mutex<Option<TempDir>>,
    keep_workdir: bool,
    workers: Mutex<Vec<JoinHandle<()>>>,
    result: OnceLock<Result<()>>,
    started_at: OnceLock<Instant>,
    finished_at: OnceLock<Instant>,
    closed: AtomicBool,
}

impl Session {
    /// Prepare a session: private work directory, environment, log sink
    ///
    /// The work directory gets `_tmp` and `home` subdirectories that back
    /// `TMPDIR` and `HOME`, so tools that cache or watch files never see
    /// another session's state.
    pub fn create(
        id: &str,
        case: Arc<TestCase>,
        engine: Arc<dyn ScriptEngine>,
        options: &SessionOptions,
    ) -> Result<Self> {
        let setup_err = |what: &str, e: &dyn std::fmt::Display| Error::Setup(format!("{what}: {e}"));

        std::fs::create_dir_all(&options.workdir_root)
            .map_err(|e| setup_err(&format!("create {}", options.workdir_root.display()), &e))?;
        let work_dir = tempfile::Builder::new()
            .prefix(&format!("{}-", paths::sanitize_id(id)))
            .tempdir_in(&options.workdir_root)
            .map_err(|e| setup_err("create work directory", &e))?;
        let root = work_dir.path().to_path_buf();

        let tmp = root.join("_tmp");
        let home = root.join("home");
        for dir in [&tmp, &home] {
            std::fs::create_dir_all(dir)
                .map_err(|e| setup_err(&format!("create {}", dir.display()), &e))?;
        }
        write_files(&root, &case)?;

        let mut env = ScriptEnv::new(id, &root);
        env.vars = options.env.clone();
        env.set("TMPDIR", tmp.display().to_string());
        env.set("HOME", home.display().to_string());
        env.set("WORK", root.display().to_string());
        env.vars.extend(case.env.clone());
        engine.setup(&mut env)?;

        let log = if options.log_to_file {
            let path = mirror_path(&root);
            let sink = LogSink::with_mirror(&path)
                .map_err(|e| setup_err(&format!("create log {}", path.display()), &e))?;
            tracing::info!(session = %id, log = %path.display(), "logging session output");
            sink
        } else {
            LogSink::new()
        };

        tracing::debug!(session = %id, work_dir = %root.display(), "session created");

        Ok(Self {
            shared: Arc::new(Shared {
                id: id.to_string(),
                state: Mutex::new(SessionState::Created),
                first_error: OnceLock::new(),
                killer: Mutex::new(None),
                stopped: AtomicBool::new(false),
                exited: Mutex::new(false),
                exited_cv: Condvar::new(),
                interrupt: Interrupt::new(),
                log,
            }),
            case,
            engine,
            env,
            strategy: options.strategy,
            quit_grace: options.quit_grace,
            work_dir: Mutex::new(Some(work_dir)),
            keep_workdir: options.keep_workdir,
            workers: Mutex::new(Vec::new()),
            result: OnceLock::new(),
            started_at: OnceLock::new(),
            finished_at: OnceLock::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.shared.state)
    }

    pub fn env(&self) -> &ScriptEnv {
        &self.env
    }

    pub fn work_dir(&self) -> &Path {
        &self.env.work_dir
    }

    /// The session's log; readable at any point, written only while running
    pub fn log(&self) -> &LogSink {
        &self.shared.log
    }

    /// Time from `start` until the session finished, once it has
    pub fn duration(&self) -> Option<Duration> {
        let start = self.started_at.get()?;
        let end = self.finished_at.get()?;
        Some(end.saturating_duration_since(*start))
    }

    /// Launch the program (if any) and the script; returns without waiting
    ///
    /// A program that fails to launch does not make `start` fail: the launch
    /// error becomes the session's result, reported through `wait`.
    pub fn start(&self) -> Result<()> {
        {
            let mut state = lock(&self.shared.state);
            if *state != SessionState::Created {
                return Err(Error::invalid_state("start", *state));
            }
            *state = SessionState::Running;
        }
        let _ = self.started_at.set(Instant::now());
        tracing::info!(session = %self.id(), "session starting");

        let mut workers = lock(&self.workers);
        let mut ctx = ScriptContext::new(self.env.clone(), self.shared.log.clone(), self.strategy)
            .with_interrupt(self.shared.interrupt.clone());

        if let Some(argv) = &self.case.program {
            let spawned = self.env.command(argv).and_then(|cmd| {
                PtyProcess::spawn(&cmd, Some(Box::new(self.shared.log.clone())))
            });
            let process = match spawned {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(session = %self.id(), error = %e, "program failed to launch");
                    self.shared.record(e);
                    return Ok(());
                }
            };
            tracing::debug!(session = %self.id(), pid = ?process.pid(), "program launched");
            *lock(&self.shared.killer) = Some(process.killer());

            let writer = match process.take_writer() {
                Ok(w) => Some(w),
                Err(e) => {
                    tracing::warn!(session = %self.id(), error = %e, "program input unavailable");
                    None
                }
            };
            let input: ProgramInput = Arc::new(Mutex::new(writer));
            ctx = ctx.with_input(input);

            let shared = Arc::clone(&self.shared);
            workers.push(spawn_worker(&format!("program:{}", self.id()), move || {
                watch_program(&shared, process)
            })?);
        }

        let shared = Arc::clone(&self.shared);
        let engine = Arc::clone(&self.engine);
        let case = Arc::clone(&self.case);
        let quit_grace = self.quit_grace;
        let spawned = spawn_worker(&format!("script:{}", self.id()), move || {
            run_script(&shared, engine.as_ref(), &case, ctx, quit_grace)
        });
        match spawned {
            Ok(handle) => workers.push(handle),
            Err(e) => {
                // Without a script nobody will end the program
                self.shared.record(e.clone());
                self.shared.kill_program();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Block until the script and the program have both finished
    ///
    /// Returns the first error either of them hit. The result is computed
    /// once; every later or concurrent call gets an identical copy.
    pub fn wait(&self) -> Result<()> {
        if self.state() == SessionState::Created {
            return Err(Error::invalid_state("wait", SessionState::Created));
        }
        self.result.get_or_init(|| self.finish()).clone()
    }

    fn finish(&self) -> Result<()> {
        let workers = std::mem::take(&mut *lock(&self.workers));
        for handle in workers {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                self.shared
                    .record(Error::Internal(format!("{name} thread panicked")));
            }
        }

        // Nothing writes after this point
        self.shared.log.seal();
        let _ = self.finished_at.set(Instant::now());

        let result = match self.shared.first_error.get() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        };

        let mut state = lock(&self.shared.state);
        if *state == SessionState::Running {
            *state = final_state(&result);
        }
        drop(state);

        match &result {
            Ok(()) => tracing::info!(session = %self.id(), "session passed"),
            Err(e) => tracing::info!(session = %self.id(), error = %e, "session failed"),
        }
        result
    }

    /// Tear the session down: stop the program, wait, remove the work directory
    ///
    /// Safe to call any number of times; only the first call does anything.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let previous = {
            let mut state = lock(&self.shared.state);
            let previous = *state;
            *state = SessionState::Closing;
            previous
        };
        tracing::debug!(session = %self.id(), from = %previous, "closing session");

        self.shared.interrupt.raise();
        self.shared.kill_program();
        let result = if previous == SessionState::Created {
            self.shared.log.seal();
            Ok(())
        } else {
            self.result.get_or_init(|| self.finish()).clone()
        };

        let cleanup = self.remove_work_dir();
        self.shared.set_state(final_state(&result));
        cleanup
    }

    fn remove_work_dir(&self) -> Result<()> {
        let Some(dir) = lock(&self.work_dir).take() else {
            return Ok(());
        };
        if self.keep_workdir {
            let kept = dir.keep();
            tracing::info!(session = %self.id(), work_dir = %kept.display(), "keeping work directory");
            return Ok(());
        }
        let path = dir.path().to_path_buf();
        dir.close().map_err(|e| {
            tracing::warn!(session = %self.id(), work_dir = %path.display(), error = %e, "work directory cleanup failed");
            Error::Io(format!("remove {}: {}", path.display(), e))
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(session = %self.id(), error = %e, "teardown on drop failed");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("work_dir", &self.work_dir())
            .finish()
    }
}

fn final_state(result: &Result<()>) -> SessionState {
    if result.is_ok() {
        SessionState::Done
    } else {
        SessionState::Failed
    }
}

/// Log mirror lives next to the work directory so cleanup leaves it behind
fn mirror_path(work_dir: &Path) -> PathBuf {
    let mut name = work_dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".log");
    work_dir.with_file_name(name)
}

fn write_files(root: &Path, case: &TestCase) -> Result<()> {
    for (name, content) in &case.files {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Setup(format!("create {}: {}", parent.display(), e)))?;
        }
        std::fs::write(&path, content)
            .map_err(|e| Error::Setup(format!("write {}: {}", path.display(), e)))?;
    }
    Ok(())
}

fn spawn_worker<F>(name: &str, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|e| Error::Setup(format!("spawn {name} thread: {e}")))
}

/// Wait for the driven program and record how it ended
fn watch_program(shared: &Shared, process: PtyProcess) {
    let program = process.program().to_string();
    let outcome = process.wait().and_then(|status| check_status(&program, &status));
    // Exited: the pid must not be signalled any more
    lock(&shared.killer).take();
    shared.mark_exited();

    match outcome {
        Err(e) if shared.stopped.load(Ordering::SeqCst) => {
            tracing::debug!(session = %shared.id, status = %e, "program stopped by harness");
        }
        Err(e) => {
            tracing::debug!(session = %shared.id, error = %e, "program ended with error");
            shared.record(e);
        }
        Ok(()) => {}
    }
}

/// Run the script, then make sure the program ends
///
/// A failed script kills the program at once. A passing one sends the
/// case's `quit` input, closes the terminal input and gives the program
/// `quit_grace` to exit before it is killed.
fn run_script(
    shared: &Shared,
    engine: &dyn ScriptEngine,
    case: &TestCase,
    mut ctx: ScriptContext,
    quit_grace: Duration,
) {
    let _span = tracing::info_span!("session", id = %shared.id).entered();

    match engine.run(case, &mut ctx) {
        Ok(()) => {
            if let Some(quit) = &case.quit {
                tracing::debug!("script finished, sending quit input");
                if let Err(e) = ctx.send(quit.as_bytes()) {
                    shared.record(e);
                    shared.kill_program();
                    return;
                }
            }
            if !ctx.has_program() {
                return;
            }
            // Dropping the writer hands the program EOF
            drop(ctx);
            if !shared.wait_exited(quit_grace) {
                tracing::debug!(grace_ms = quit_grace.as_millis() as u64, "program still running, stopping it");
                shared.kill_program();
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "script failed");
            shared.record(e);
            shared.kill_program();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::script::{StepEngine, TestStep};

    fn options(root: &Path) -> SessionOptions {
        SessionOptions {
            workdir_root: root.to_path_buf(),
            keep_workdir: false,
            log_to_file: false,
            env: BTreeMap::from([("SHARED".to_string(), "1".to_string())]),
            strategy: RetryStrategy::default().with_deadline(Duration::from_millis(500)),
            quit_grace: Duration::from_secs(2),
        }
    }

    fn case(name: &str, program: Option<&[&str]>, steps: Vec<TestStep>) -> Arc<TestCase> {
        Arc::new(TestCase {
            name: name.to_string(),
            description: None,
            program: program.map(|p| p.iter().map(|s| s.to_string()).collect()),
            quit: None,
            env: BTreeMap::new(),
            files: BTreeMap::from([("data/input.txt".to_string(), "seed".to_string())]),
            steps,
            source: None,
        })
    }

    fn step(cmd: &str, args: &[&str]) -> TestStep {
        TestStep {
            cmd: cmd.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            negate: false,
        }
    }

    fn engine() -> Arc<dyn ScriptEngine> {
        Arc::new(StepEngine::default())
    }

    #[test]
    fn test_create_isolates_environment() {
        let root = tempfile::tempdir().unwrap();
        let session = Session::create("iso", case("iso", None, vec![]), engine(), &options(root.path())).unwrap();

        let work = session.work_dir().to_path_buf();
        assert!(work.starts_with(root.path()));
        assert!(work.join("_tmp").is_dir());
        assert!(work.join("home").is_dir());
        assert_eq!(std::fs::read_to_string(work.join("data/input.txt")).unwrap(), "seed");

        let env = session.env();
        assert_eq!(env.get("TMPDIR"), Some(work.join("_tmp").display().to_string().as_str()));
        assert_eq!(env.get("HOME"), Some(work.join("home").display().to_string().as_str()));
        assert_eq!(env.get("SHARED"), Some("1"));
        assert_eq!(session.state(), SessionState::Created);
    }

    #[test]
    fn test_sessions_get_distinct_work_dirs() {
        let root = tempfile::tempdir().unwrap();
        let a = Session::create("same", case("same", None, vec![]), engine(), &options(root.path())).unwrap();
        let b = Session::create("same", case("same", None, vec![]), engine(), &options(root.path())).unwrap();
        assert_ne!(a.work_dir(), b.work_dir());
    }

    #[test]
    fn test_program_output_reaches_log_and_wait_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let c = case(
            "echo",
            Some(&["sh", "-c", "echo hello-$SHARED; sleep 0.2"]),
            vec![step("errlogwait", &["hello-1"])],
        );
        let session = Session::create("echo", c, engine(), &options(root.path())).unwrap();
        session.start().unwrap();

        let first = session.wait();
        let second = session.wait();
        assert!(first.is_ok(), "{first:?}");
        assert_eq!(first, second);
        assert_eq!(session.state(), SessionState::Done);
        assert!(session.log().is_sealed());
        assert!(session.duration().is_some());
    }

    #[test]
    fn test_failing_program_result_is_cached() {
        let root = tempfile::tempdir().unwrap();
        let c = case("exit", Some(&["sh", "-c", "exit 3"]), vec![]);
        let session = Session::create("exit", c, engine(), &options(root.path())).unwrap();
        session.start().unwrap();

        let first = session.wait().unwrap_err();
        let second = session.wait().unwrap_err();
        assert_eq!(first, Error::exit("sh", "exit code 3"));
        assert_eq!(first, second);
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn test_script_failure_stops_long_running_program() {
        let root = tempfile::tempdir().unwrap();
        let c = case(
            "stuck",
            Some(&["sh", "-c", "sleep 60"]),
            vec![step("errlogwait", &["never printed"])],
        );
        let session = Session::create("stuck", c, engine(), &options(root.path())).unwrap();
        let started = Instant::now();
        session.start().unwrap();

        let err = session.wait().unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(err.code(), "TIMEOUT");
    }

    #[test]
    fn test_launch_failure_surfaces_through_wait() {
        let root = tempfile::tempdir().unwrap();
        let c = case("missing", Some(&["/no/such/program"]), vec![]);
        let session = Session::create("missing", c, engine(), &options(root.path())).unwrap();

        session.start().unwrap();
        assert!(matches!(session.wait(), Err(Error::Launch { .. })));
    }

    #[test]
    fn test_start_twice_and_wait_before_start_are_rejected() {
        let root = tempfile::tempdir().unwrap();
        let session = Session::create("twice", case("twice", None, vec![]), engine(), &options(root.path())).unwrap();

        assert!(matches!(session.wait(), Err(Error::InvalidState { .. })));
        session.start().unwrap();
        assert!(matches!(session.start(), Err(Error::InvalidState { .. })));
        session.wait().unwrap();
    }

    #[test]
    fn test_quit_input_ends_program() {
        let root = tempfile::tempdir().unwrap();
        let c = Arc::new(TestCase {
            quit: Some("bye\r".to_string()),
            ..(*case("quit", Some(&["sh", "-c", "echo prompt; read line; echo got-$line"]), vec![step("errlogwait", &["prompt"])])).clone()
        });
        let session = Session::create("quit", c, engine(), &options(root.path())).unwrap();
        session.start().unwrap();

        session.wait().unwrap();
        assert!(session.log().text().contains("got-bye"));
    }

    #[test]
    fn test_close_removes_work_dir_once() {
        let root = tempfile::tempdir().unwrap();
        let session = Session::create("close", case("close", None, vec![]), engine(), &options(root.path())).unwrap();
        let work = session.work_dir().to_path_buf();
        session.start().unwrap();
        session.wait().unwrap();

        session.close().unwrap();
        session.close().unwrap();
        assert!(!work.exists());
        assert_eq!(session.state(), SessionState::Done);
    }

    #[test]
    fn test_close_without_start_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let session = Session::create("idle", case("idle", None, vec![]), engine(), &options(root.path())).unwrap();
        let work = session.work_dir().to_path_buf();

        drop(session);
        assert!(!work.exists());
    }

    #[test]
    fn test_keep_workdir_and_log_mirror() {
        let root = tempfile::tempdir().unwrap();
        let mut opts = options(root.path());
        opts.keep_workdir = true;
        opts.log_to_file = true;
        let c = case("kept", Some(&["sh", "-c", "echo mirrored"]), vec![]);
        let session = Session::create("kept", c, engine(), &opts).unwrap();
        let work = session.work_dir().to_path_buf();
        session.start().unwrap();
        session.wait().unwrap();
        session.close().unwrap();

        assert!(work.exists());
        let mirror = std::fs::read_to_string(mirror_path(&work)).unwrap();
        assert!(mirror.contains("mirrored"));
    }

    #[test]
    fn test_program_ignoring_eof_is_stopped_after_script_passes() {
        let root = tempfile::tempdir().unwrap();
        let c = case(
            "forever",
            Some(&["sh", "-c", "echo ready; while :; do sleep 1; done"]),
            vec![step("errlogwait", &["ready"])],
        );
        let mut opts = options(root.path());
        opts.quit_grace = Duration::from_millis(200);
        let session = Session::create("forever", c, engine(), &opts).unwrap();
        let started = Instant::now();
        session.start().unwrap();

        assert_eq!(session.wait(), Ok(()));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(session.state(), SessionState::Done);
    }

    #[test]
    fn test_program_exiting_within_grace_keeps_its_status() {
        let root = tempfile::tempdir().unwrap();
        let c = case(
            "late-exit",
            Some(&["sh", "-c", "echo ready; sleep 0.05; exit 6"]),
            vec![step("errlogwait", &["ready"])],
        );
        let mut opts = options(root.path());
        opts.quit_grace = Duration::from_secs(5);
        let session = Session::create("late-exit", c, engine(), &opts).unwrap();
        session.start().unwrap();

        assert_eq!(session.wait(), Err(Error::exit("sh", "exit code 6")));
    }

    #[test]
    fn test_close_interrupts_running_exec() {
        let root = tempfile::tempdir().unwrap();
        let c = case(
            "busy",
            None,
            vec![step("exec", &["sh", "-c", "echo inside; sleep 1000"])],
        );
        let session = Session::create("busy", c, engine(), &options(root.path())).unwrap();
        let work = session.work_dir().to_path_buf();
        session.start().unwrap();

        let strategy = RetryStrategy::default().with_deadline(Duration::from_secs(10));
        assert!(crate::assert::poll_until(|| session.log().text().contains("inside"), &strategy).found);

        let started = Instant::now();
        session.close().unwrap();
        assert!(started.elapsed() < Duration::from_secs(15));
        assert!(!work.exists());
        assert_eq!(session.wait().unwrap_err().code(), "INTERRUPTED");
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn test_close_interrupts_pending_log_wait() {
        let root = tempfile::tempdir().unwrap();
        let mut opts = options(root.path());
        opts.strategy = RetryStrategy::default();
        let c = case("polling", None, vec![step("errlogwait", &["never printed"])]);
        let session = Session::create("polling", c, engine(), &opts).unwrap();
        session.start().unwrap();
        thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        session.close().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(session.wait().unwrap_err().code(), "INTERRUPTED");
    }
}
