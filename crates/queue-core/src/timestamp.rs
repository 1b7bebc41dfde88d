//! Canonical timestamp format: ISO-8601 UTC, second precision,
//! `YYYY-MM-DDTHH:MM:SSZ`. Stored as text so every comparison the Store
//! performs (scheduling, tie-breaks, ordering) is a lexical string
//! comparison, which is equivalent to chronological order at this
//! precision.

use chrono::{DateTime, Duration, Utc};

use crate::error::{QueueError, Result};

const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Render a timestamp in the canonical format.
pub fn format(dt: DateTime<Utc>) -> String {
    dt.format(FORMAT).to_string()
}

/// Parse a canonical timestamp back into a `DateTime<Utc>`.
pub fn parse(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_str(s, FORMAT)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| QueueError::BadInput(format!("invalid timestamp {s:?}: {e}")))
}

/// The current instant, rendered in the canonical format.
pub fn now_iso(clock: &dyn Clock) -> String {
    format(clock.now())
}

/// Abstracts "what time is it" so the retry policy and claimer are
/// testable without sleeping or racing the real clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Add a whole number of seconds to a timestamp, returning the canonical
/// string form. Used by the retry policy to compute `next_run_at`.
pub fn add_seconds(dt: DateTime<Utc>, seconds: i64) -> DateTime<Utc> {
    dt + Duration::seconds(seconds)
}
