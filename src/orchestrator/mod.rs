//! Run orchestration
//!
//! Turns a set of test cases into running sessions, waits for all of them and
//! produces a report. Sessions are always torn down, whatever happened.

mod aggregate;
mod report;

pub use aggregate::{aggregate, combine, wait_all, SessionOutcome};
pub use report::{RunReport, SessionReport};

use std::sync::Arc;

use crate::common::{Error, Result};
use crate::script::{ScriptEngine, TestCase};
use crate::session::{Session, SessionOptions};

/// Run every case in its own concurrent session and report the results
///
/// If any session cannot be created or started, the run is abandoned: every
/// session already running is stopped and torn down and the setup error is
/// returned instead of a report.
pub async fn run_cases(
    cases: Vec<TestCase>,
    engine: Arc<dyn ScriptEngine>,
    options: &SessionOptions,
) -> Result<RunReport> {
    tracing::info!(cases = cases.len(), root = %options.workdir_root.display(), "starting run");

    let mut sessions: Vec<Arc<Session>> = Vec::with_capacity(cases.len());
    for case in cases {
        let id = case.name.clone();
        let started = Session::create(&id, Arc::new(case), Arc::clone(&engine), options)
            .map(Arc::new)
            .and_then(|session| {
                session.start()?;
                Ok(session)
            });

        match started {
            Ok(session) => sessions.push(session),
            Err(e) => {
                let e = e.in_session(&id);
                tracing::error!(error = %e, running = sessions.len(), "aborting run");
                close_all(sessions).await;
                return Err(e);
            }
        }
    }

    let outcomes = wait_all(&sessions).await;
    close_all(sessions).await;

    let report = RunReport::new(outcomes);
    tracing::info!(passed = report.passed, failed = report.failed, "run finished");
    Ok(report)
}

/// Close every session off the async runtime; teardown blocks on processes and disk
async fn close_all(sessions: Vec<Arc<Session>>) {
    let closing = tokio::task::spawn_blocking(move || {
        for session in &sessions {
            if let Err(e) = session.close() {
                tracing::warn!(session = %session.id(), error = %e, "teardown failed");
            }
        }
    });
    if let Err(e) = closing.await {
        tracing::error!(error = %Error::Internal(e.to_string()), "teardown task failed");
    }
}
