//! Bounded polling with exponential backoff
//!
//! Driven programs give the harness no completion signal, so assertions poll:
//! check immediately, then sleep `initial`, `initial * factor`, ... between
//! checks until the condition holds or the deadline passes.

use std::thread;
use std::time::{Duration, Instant};

/// Backoff schedule bounded by an overall time limit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryStrategy {
    /// Sleep before the second attempt
    pub initial: Duration,
    /// Growth applied to the sleep after every attempt (>= 1.0)
    pub factor: f64,
    /// Total time budget measured from the first attempt
    pub deadline: Duration,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(10),
            factor: 1.5,
            deadline: Duration::from_secs(30),
        }
    }
}

impl RetryStrategy {
    pub fn new(initial: Duration, factor: f64, deadline: Duration) -> Self {
        Self {
            initial,
            factor,
            deadline,
        }
    }

    pub fn with_deadline(self, deadline: Duration) -> Self {
        Self { deadline, ..self }
    }

    /// Successive sleeps between attempts, ignoring the deadline
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let factor = self.factor.max(1.0);
        let cap = self.deadline.max(self.initial);
        std::iter::successors(Some(self.initial.min(cap)), move |prev| {
            let nanos = (prev.as_nanos() as f64 * factor).round();
            if nanos >= cap.as_nanos() as f64 {
                Some(cap)
            } else {
                Some(Duration::from_nanos(nanos as u64))
            }
        })
    }
}

/// Result of a [`poll_until`] run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollOutcome {
    pub found: bool,
    /// Number of times the predicate was evaluated
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Evaluate `predicate` on the strategy's schedule until it returns true or
/// the deadline passes
///
/// The first evaluation happens immediately. Sleeps are clipped so the final
/// evaluation happens at the deadline, never noticeably after it.
pub fn poll_until<F>(predicate: F, strategy: &RetryStrategy) -> PollOutcome
where
    F: FnMut() -> bool,
{
    poll_with(predicate, strategy, |delay| {
        thread::sleep(delay);
        true
    })
}

/// [`poll_until`] with a caller-supplied sleep
///
/// `pause` returning `false` abandons the poll early; the outcome then has
/// `found == false` and is reported before the deadline.
pub fn poll_with<F, P>(mut predicate: F, strategy: &RetryStrategy, mut pause: P) -> PollOutcome
where
    F: FnMut() -> bool,
    P: FnMut(Duration) -> bool,
{
    let start = Instant::now();
    let deadline = start + strategy.deadline;
    let mut delays = strategy.delays();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if predicate() {
            return PollOutcome {
                found: true,
                attempts,
                elapsed: start.elapsed(),
            };
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }

        let delay = delays.next().unwrap_or(strategy.initial);
        if !pause(delay.min(deadline - now)) {
            break;
        }
    }

    PollOutcome {
        found: false,
        attempts,
        elapsed: start.elapsed(),
    }
}
