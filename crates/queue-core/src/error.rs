//! Structured error type for the queue engine.
//!
//! Mirrors the error kinds named by the control surface contract: `BadInput`
//! and `NotFound` are user-facing, `Conflict` and `Timeout` are internal
//! signals consumed within this crate family, and `Io` covers storage and
//! log-file faults.

use thiserror::Error;

/// Errors surfaced by the queue engine.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Malformed enqueue payload: missing `id`/`command`, or invalid JSON.
    #[error("bad input: {0}")]
    BadInput(String),

    /// Referenced job or DLQ entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A claim lost the race to another worker. Internal; callers retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Executor exceeded the per-attempt wall-clock limit. Internal; flows
    /// through the retry policy rather than propagating to a caller.
    #[error("timeout after {0}s")]
    Timeout(u64),

    /// Storage or log I/O fault.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for QueueError {
    fn from(err: std::io::Error) -> Self {
        QueueError::Io(err.to_string())
    }
}

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, QueueError>;
