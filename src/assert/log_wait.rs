//! Waiting for text to show up in a session log

use regex::bytes::Regex;

use super::retry::{poll_with, PollOutcome, RetryStrategy};
use crate::common::{Error, Result};
use crate::session::{Interrupt, LogSink};

/// Output that can be matched as a whole
pub trait LogSource {
    /// Everything written so far
    fn snapshot(&self) -> Vec<u8>;
}

impl LogSource for LogSink {
    fn snapshot(&self) -> Vec<u8> {
        LogSink::snapshot(self)
    }
}

/// Poll `sink` until `pattern` matches somewhere in everything logged so far
///
/// Each attempt matches against a fresh snapshot of the whole log, so output
/// that arrived before the call counts too.
pub fn wait_for_pattern<S>(sink: &S, pattern: &Regex, strategy: &RetryStrategy) -> Result<PollOutcome>
where
    S: LogSource + ?Sized,
{
    wait_for_pattern_until(sink, pattern, strategy, &Interrupt::new())
}

/// [`wait_for_pattern`] that gives up early once `interrupt` is raised
pub fn wait_for_pattern_until<S>(
    sink: &S,
    pattern: &Regex,
    strategy: &RetryStrategy,
    interrupt: &Interrupt,
) -> Result<PollOutcome>
where
    S: LogSource + ?Sized,
{
    let outcome = poll_with(
        || pattern.is_match(&sink.snapshot()),
        strategy,
        |delay| interrupt.sleep(delay),
    );

    if outcome.found {
        tracing::debug!(
            pattern = %pattern,
            attempts = outcome.attempts,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "pattern found in session log"
        );
        Ok(outcome)
    } else if interrupt.is_raised() {
        tracing::debug!(pattern = %pattern, attempts = outcome.attempts, "pattern wait interrupted");
        Err(Error::Interrupted(format!("waiting for {:?}", pattern.as_str())))
    } else {
        tracing::debug!(pattern = %pattern, attempts = outcome.attempts, "pattern wait timed out");
        Err(Error::Timeout {
            pattern: pattern.as_str().to_string(),
            after: strategy.deadline,
        })
    }
}

/// Check `errlogwait`'s arguments and compile its pattern
///
/// Negation is rejected outright: "wait until X never appears" has no
/// meaningful end short of the deadline, and quietly turning it into a single
/// check would let tests pass by accident.
fn log_wait_pattern(negate: bool, args: &[String]) -> Result<Regex> {
    if negate {
        return Err(Error::usage("errlogwait does not support negation"));
    }
    let [pattern] = args else {
        return Err(Error::usage(format!(
            "errlogwait expects a single argument, the regexp to search for (got {})",
            args.len()
        )));
    };
    Regex::new(pattern).map_err(|e| Error::usage(format!("errlogwait failed to compile {:?}: {}", pattern, e)))
}

/// The `errlogwait` script command: validate, then poll
///
/// Nothing is read from `sink` unless the call is well formed.
pub fn log_wait<S>(
    sink: &S,
    negate: bool,
    args: &[String],
    strategy: &RetryStrategy,
    interrupt: &Interrupt,
) -> Result<PollOutcome>
where
    S: LogSource + ?Sized,
{
    let regex = log_wait_pattern(negate, args)?;
    wait_for_pattern_until(sink, &regex, strategy, interrupt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    fn short(deadline_ms: u64) -> RetryStrategy {
        RetryStrategy::default().with_deadline(Duration::from_millis(deadline_ms))
    }

    /// Fixed log content that counts how often it is read
    struct CountingLog {
        content: Vec<u8>,
        reads: AtomicUsize,
    }

    impl CountingLog {
        fn with(content: &[u8]) -> Self {
            Self {
                content: content.to_vec(),
                reads: AtomicUsize::new(0),
            }
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    impl LogSource for CountingLog {
        fn snapshot(&self) -> Vec<u8> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.content.clone()
        }
    }

    #[test]
    fn test_ready_written_after_50ms_found_on_backoff_schedule() {
        let sink = LogSink::new();
        let writer = sink.clone();
        let started = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            writer.append(b"server is ready\n").unwrap();
        });

        let regex = Regex::new("ready").unwrap();
        let outcome = wait_for_pattern(&sink, &regex, &RetryStrategy::default()).unwrap();
        handle.join().unwrap();

        assert!(outcome.found);
        assert!(started.elapsed() >= Duration::from_millis(50));
        // Attempts at 0, 10, 25, 47.5, 81.25ms: a match lands on roughly the fifth
        assert!(outcome.attempts >= 3 && outcome.attempts <= 8, "attempts = {}", outcome.attempts);
        assert!(outcome.elapsed < Duration::from_secs(1));
    }

    #[test]
    fn test_matches_across_whole_log() {
        let sink = LogSink::new();
        sink.append(b"first line\nsecond ").unwrap();
        sink.append(b"line\n").unwrap();

        let regex = Regex::new(r"second line").unwrap();
        let outcome = wait_for_pattern(&sink, &regex, &short(100)).unwrap();
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn test_never_matching_pattern_times_out_at_deadline() {
        let sink = LogSink::new();
        let regex = Regex::new("never").unwrap();
        let strategy = RetryStrategy::new(Duration::from_millis(20), 2.0, Duration::from_millis(250));
        let started = Instant::now();
        let err = wait_for_pattern(&sink, &regex, &strategy).unwrap_err();

        let elapsed = started.elapsed();
        assert!(elapsed >= strategy.deadline, "elapsed = {elapsed:?}");
        assert!(elapsed < strategy.deadline + Duration::from_millis(150), "elapsed = {elapsed:?}");
        assert_eq!(
            err,
            Error::Timeout {
                pattern: "never".to_string(),
                after: Duration::from_millis(250)
            }
        );
    }

    #[test]
    fn test_negation_is_usage_error_without_polling() {
        let log = CountingLog::with(b"ready");
        let err = log_wait(&log, true, &["ready".to_string()], &RetryStrategy::default(), &Interrupt::new())
            .unwrap_err();

        assert!(matches!(err, Error::Usage(ref m) if m.contains("negation")));
        assert_eq!(log.reads(), 0);
    }

    #[test]
    fn test_wrong_argument_count_is_usage_error() {
        let log = CountingLog::with(b"");
        let strategy = RetryStrategy::default();
        let interrupt = Interrupt::new();

        let none = log_wait(&log, false, &[], &strategy, &interrupt).unwrap_err();
        assert!(matches!(none, Error::Usage(_)));

        let two = log_wait(&log, false, &["a".to_string(), "b".to_string()], &strategy, &interrupt).unwrap_err();
        assert!(matches!(two, Error::Usage(ref m) if m.contains("got 2")));
        assert_eq!(log.reads(), 0);
    }

    #[test]
    fn test_bad_regex_is_usage_error() {
        let log = CountingLog::with(b"");
        let err = log_wait(&log, false, &["(unclosed".to_string()], &RetryStrategy::default(), &Interrupt::new())
            .unwrap_err();
        assert!(matches!(err, Error::Usage(ref m) if m.contains("compile")));
        assert_eq!(log.reads(), 0);
    }

    #[test]
    fn test_well_formed_call_reads_log() {
        let log = CountingLog::with(b"ready");
        let outcome = log_wait(&log, false, &["ready".to_string()], &short(100), &Interrupt::new()).unwrap();
        assert_eq!(outcome.attempts, 1);
        assert_eq!(log.reads(), 1);
    }

    #[test]
    fn test_interrupt_ends_wait_early() {
        let sink = LogSink::new();
        let interrupt = Interrupt::new();
        let raiser = interrupt.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            raiser.raise();
        });

        let started = Instant::now();
        let err = log_wait(&sink, false, &["absent".to_string()], &RetryStrategy::default(), &interrupt).unwrap_err();
        handle.join().unwrap();

        assert!(matches!(err, Error::Interrupted(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    #[ignore = "runs for the full default 30s deadline"]
    fn test_default_deadline_is_thirty_seconds() {
        let sink = LogSink::new();
        let started = Instant::now();
        let err = log_wait(&sink, false, &["absent".to_string()], &RetryStrategy::default(), &Interrupt::new())
            .unwrap_err();

        let elapsed = started.elapsed();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(elapsed >= Duration::from_secs(30));
        assert!(elapsed < Duration::from_secs(31));
    }
}
