//! The retry/DLQ decision as a pure function of `(attempts, max_retries,
//! backoff_base)`, so it can be unit tested without a database.

use crate::model::JobState;
use crate::timestamp::add_seconds;
use chrono::{DateTime, Utc};

/// Outcome of applying the retry policy after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Re-queue for another attempt at `next_run_at`.
    Retry { next_run_at: String },
    /// Exhausted retries: move to the dead-letter queue.
    DeadLetter,
}

/// Decide what happens to a job after it completes.
///
/// `ok == true` always yields `JobState::Completed` and is handled
/// directly by `Store::complete`; this function covers the failure path
/// only, mirroring the teacher's `mark_failed` which dead-letters once
/// `attempt > max_retries` and otherwise schedules exponential backoff.
pub fn decide(attempts: i64, max_retries: i64, backoff_base: i64, now: DateTime<Utc>) -> RetryOutcome {
    if attempts > max_retries {
        return RetryOutcome::DeadLetter;
    }
    let delay_seconds = backoff_base.pow(attempts.max(0) as u32);
    let next_run_at = crate::timestamp::format(add_seconds(now, delay_seconds));
    RetryOutcome::Retry { next_run_at }
}

/// State a job lands in after `decide` — `Pending` for a retry,
/// `Dead` once it is dead-lettered.
pub fn resulting_state(outcome: &RetryOutcome) -> JobState {
    match outcome {
        RetryOutcome::Retry { .. } => JobState::Pending,
        RetryOutcome::DeadLetter => JobState::Dead,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, secs).unwrap()
    }

    #[test]
    fn retries_until_max_then_dead_letters() {
        let now = at(0);
        assert_eq!(
            decide(1, 3, 2, now),
            RetryOutcome::Retry { next_run_at: crate::timestamp::format(at(2)) }
        );
        assert_eq!(
            decide(2, 3, 2, now),
            RetryOutcome::Retry { next_run_at: crate::timestamp::format(at(4)) }
        );
        assert_eq!(
            decide(3, 3, 2, now),
            RetryOutcome::Retry { next_run_at: crate::timestamp::format(at(8)) }
        );
        assert_eq!(decide(4, 3, 2, now), RetryOutcome::DeadLetter);
    }

    #[test]
    fn backoff_grows_exponentially_with_base() {
        let now = at(0);
        let RetryOutcome::Retry { next_run_at } = decide(2, 10, 3, now) else {
            panic!("expected retry");
        };
        assert_eq!(next_run_at, crate::timestamp::format(at(9)));
    }

    #[test]
    fn zero_max_retries_dead_letters_after_first_attempt() {
        assert_eq!(decide(1, 0, 2, at(0)), RetryOutcome::DeadLetter);
    }
}
