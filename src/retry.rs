//! Bounded retry with an explicit delay schedule.
//!
//! [`next_step`] is the pure decision; [`poll_with_schedule`] drives an async
//! operation with it. Chain calls with open-ended exponential backoff use the
//! `backoff` crate directly (see `chain::rpc`).

use std::future::Future;
use std::time::Duration;

/// What to do before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// Sleep for the delay, then attempt again.
    Retry(Duration),
    GiveUp,
}

/// Decide the step after `attempts_made` attempts out of `max_attempts`.
///
/// The delay for attempt `n` (0-based) is `schedule[n]`, repeating the last
/// entry when the schedule is shorter than `max_attempts`.
pub fn next_step(attempts_made: usize, max_attempts: usize, schedule: &[Duration]) -> RetryStep {
    if attempts_made >= max_attempts {
        return RetryStep::GiveUp;
    }
    let delay = schedule
        .get(attempts_made)
        .or_else(|| schedule.last())
        .copied()
        .unwrap_or(Duration::ZERO);
    RetryStep::Retry(delay)
}

/// Result of polling until a value shows up.
#[derive(Debug)]
pub enum PollOutcome<T, E> {
    Found { value: T, attempts: usize },
    /// Every attempt returned nothing or failed.
    Exhausted {
        attempts: usize,
        last_error: Option<E>,
    },
}

/// Sleep-then-call `op` once per schedule entry until it yields `Some`.
///
/// Errors are treated as transient: they are remembered and the next attempt
/// proceeds. `op` receives the 1-based attempt number.
pub async fn poll_with_schedule<T, E, F, Fut>(schedule: &[Duration], mut op: F) -> PollOutcome<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let max_attempts = schedule.len();
    let mut attempts = 0;
    let mut last_error = None;

    while let RetryStep::Retry(delay) = next_step(attempts, max_attempts, schedule) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        attempts += 1;
        match op(attempts).await {
            Ok(Some(value)) => return PollOutcome::Found { value, attempts },
            Ok(None) => {}
            Err(e) => last_error = Some(e),
        }
    }

    PollOutcome::Exhausted {
        attempts,
        last_error,
    }
}
