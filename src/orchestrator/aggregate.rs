//! Fan-out/fan-in over started sessions

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::common::{Error, Result};
use crate::session::Session;

/// How one session ended
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub id: String,
    pub result: Result<()>,
    pub duration: Option<Duration>,
}

/// Wait for every session, in parallel, and collect outcomes in completion order
///
/// One blocking waiter per session runs in a task group. A slow session never
/// delays collecting a fast one, and nothing returns until every waiter has.
pub async fn wait_all(sessions: &[Arc<Session>]) -> Vec<SessionOutcome> {
    let mut waiters = JoinSet::new();
    for session in sessions {
        let session = Arc::clone(session);
        waiters.spawn_blocking(move || {
            let result = session.wait();
            SessionOutcome {
                id: session.id().to_string(),
                result,
                duration: session.duration(),
            }
        });
    }

    let mut outcomes = Vec::with_capacity(sessions.len());
    while let Some(joined) = waiters.join_next().await {
        match joined {
            Ok(outcome) => {
                if let Err(e) = &outcome.result {
                    tracing::debug!(session = %outcome.id, error = %e, "session reported failure");
                }
                outcomes.push(outcome);
            }
            Err(e) => {
                tracing::error!(error = %e, "session waiter did not complete");
                outcomes.push(SessionOutcome {
                    id: "<unknown>".to_string(),
                    result: Err(Error::Internal(format!("session waiter failed: {e}"))),
                    duration: None,
                });
            }
        }
    }
    outcomes
}

/// Fold outcomes into one result: success only if every session succeeded
///
/// Failures keep completion order and are tagged with their session id.
pub fn combine(outcomes: &[SessionOutcome]) -> Result<()> {
    let errors: Vec<Error> = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().err().map(|e| e.clone().in_session(&o.id)))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Aggregate(errors))
    }
}

/// Wait for all sessions and report a single combined result
///
/// Never fails fast: every session is waited for before anything is reported.
pub async fn aggregate(sessions: &[Arc<Session>]) -> Result<()> {
    combine(&wait_all(sessions).await)
}
