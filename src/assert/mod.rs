//! Asynchronous assertions against session output
//!
//! `poll_until` is the generic primitive; `wait_for_pattern` and `log_wait`
//! apply it to a session's [`LogSink`](crate::session::LogSink).

mod log_wait;
mod retry;

pub use log_wait::{log_wait, wait_for_pattern, wait_for_pattern_until, LogSource};
pub use retry::{poll_until, poll_with, PollOutcome, RetryStrategy};
