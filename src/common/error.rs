//! Error types for the harness
//!
//! Every failure a session can produce maps onto one of these variants.
//! Errors are `Clone` so a session's terminal result can be cached and handed
//! out unchanged to every caller of `Session::wait`.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // === Process Errors ===
    #[error("Failed to launch '{program}': {reason}")]
    Launch { program: String, reason: String },

    #[error("'{program}' exited with {status}")]
    Exit { program: String, status: String },

    // === Assertion Errors ===
    #[error("Timed out after {after:?} waiting for {pattern:?} in session log")]
    Timeout { pattern: String, after: Duration },

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    #[error("step {number} ({command}): {source}")]
    Step {
        number: usize,
        command: String,
        #[source]
        source: Box<Error>,
    },

    // === Session Errors ===
    #[error("Session '{id}': {source}")]
    Session {
        id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Session setup failed: {0}")]
    Setup(String),

    #[error("Interrupted by session teardown: {0}")]
    Interrupted(String),

    #[error("Cannot {action} while session is {state}")]
    InvalidState { action: String, state: String },

    #[error("{} session(s) failed:\n{}", .0.len(), join_messages(.0))]
    Aggregate(Vec<Error>),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid test case '{path}': {reason}")]
    CaseParse { path: String, reason: String },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(String),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(String),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_messages(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

impl Error {
    /// Create a launch error for a program that could not be started
    pub fn launch(program: &str, reason: impl std::fmt::Display) -> Self {
        Self::Launch {
            program: program.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an exit error from a process exit status
    pub fn exit(program: &str, status: impl std::fmt::Display) -> Self {
        Self::Exit {
            program: program.to_string(),
            status: status.to_string(),
        }
    }

    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(action: &str, state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            action: action.to_string(),
            state: state.to_string(),
        }
    }

    /// Attach a session id to an error
    pub fn in_session(self, id: &str) -> Self {
        Self::Session {
            id: id.to_string(),
            source: Box::new(self),
        }
    }

    /// Short machine-readable category, used in JSON reports
    pub fn code(&self) -> &'static str {
        match self {
            Error::Launch { .. } => "LAUNCH",
            Error::Exit { .. } => "EXIT",
            Error::Timeout { .. } => "TIMEOUT",
            Error::Usage(_) => "USAGE",
            Error::TestAssertion(_) => "ASSERTION",
            Error::Session { source, .. } | Error::Step { source, .. } => source.code(),
            Error::Interrupted(_) => "INTERRUPTED",
            Error::Aggregate(_) => "AGGREGATE",
            Error::Config(_) | Error::ConfigParse(_) | Error::CaseParse { .. } => "CONFIG",
            Error::Setup(_) | Error::InvalidState { .. } => "SESSION",
            _ => "INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_message_keeps_every_error() {
        let err = Error::Aggregate(vec![
            Error::exit("vim", "exit status 2").in_session("first"),
            Error::Timeout {
                pattern: "ready".to_string(),
                after: Duration::from_secs(30),
            }
            .in_session("second"),
        ]);

        let msg = err.to_string();
        assert!(msg.starts_with("2 session(s) failed"));
        assert!(msg.contains("Session 'first': 'vim' exited with exit status 2"));
        assert!(msg.contains("Session 'second': Timed out after 30s"));
        assert!(msg.contains("\"ready\""));
    }

    #[test]
    fn test_code_looks_through_session_wrapper() {
        let err = Error::usage("bad").in_session("s1");
        assert_eq!(err.code(), "USAGE");

        let step = Error::Step {
            number: 1,
            command: "exec \"sleep\"".to_string(),
            source: Box::new(Error::Interrupted("exec 'sleep'".to_string())),
        };
        assert_eq!(step.in_session("s2").code(), "INTERRUPTED");
    }
}
