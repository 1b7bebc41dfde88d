//! The storage contract. `queue-sqlite::SqliteStore` is the only
//! implementation; everything above this trait (worker loop, HTTP API,
//! CLI) is written against it so the engine's domain logic never touches
//! SQL directly.

use crate::error::Result;
use crate::model::{DlqEntry, Job, JobDescriptor, JobFilter, QueueStatus, WorkerRow};

/// Domain-level operations over the persisted queue state. Each method is
/// one atomic unit of work from the caller's point of view; implementors
/// run it inside a single transaction.
pub trait Store: Send + Sync {
    /// Insert a new job, or update an existing one with the same id
    /// (upsert), matching `spec.md`'s enqueue contract.
    fn enqueue(&self, descriptor: JobDescriptor) -> Result<Job>;

    /// Atomically claim the next ready job for `worker_id`, if any.
    /// Candidates are `pending`, due (`run_at` null or `<= now`) and
    /// scheduled (`next_run_at <= now`); ties break on
    /// `priority DESC, created_at ASC, id ASC`.
    fn claim(&self, worker_id: &str) -> Result<Option<Job>>;

    /// Mark a claimed job as completed.
    fn complete(&self, job_id: &str) -> Result<()>;

    /// Apply the retry policy to a claimed job that just failed: either
    /// reschedule it as `pending` with a new `next_run_at`, or dead-letter
    /// it once `max_retries` is exhausted.
    fn fail(&self, job_id: &str) -> Result<()>;

    /// Fetch a single job by id.
    fn get_job(&self, job_id: &str) -> Result<Option<Job>>;

    /// List jobs, optionally filtered by state.
    fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>>;

    /// Delete a job outright, regardless of its state. Does not cascade to
    /// the DLQ: a dead-lettered job's DLQ row survives its jobs row being
    /// deleted.
    fn delete_job(&self, job_id: &str) -> Result<()>;

    /// List the dead-letter queue.
    fn list_dlq(&self) -> Result<Vec<DlqEntry>>;

    /// Move a dead-lettered job back to `pending` with `attempts` reset
    /// to zero, ready to be claimed again.
    fn requeue_dlq(&self, job_id: &str) -> Result<()>;

    /// Aggregate job-state counts and live worker count.
    fn status(&self) -> Result<QueueStatus>;

    /// Register a worker under a unique id.
    fn register_worker(&self, worker_id: &str) -> Result<()>;

    /// Remove a worker's registration.
    fn unregister_worker(&self, worker_id: &str) -> Result<()>;

    /// List currently registered workers.
    fn list_workers(&self) -> Result<Vec<WorkerRow>>;

    /// Reset any `processing` job whose `locked_by` is not a currently
    /// registered worker back to `pending`, clearing lock fields. Called
    /// once by a worker at startup before it begins polling.
    fn recover_stuck_jobs(&self) -> Result<u64>;

    /// Read a single config value.
    fn get_config(&self, key: &str) -> Result<Option<String>>;

    /// Write a single config value.
    fn set_config(&self, key: &str, value: &str) -> Result<()>;

    /// Snapshot every config key/value pair.
    fn config_snapshot(&self) -> Result<Vec<(String, String)>>;
}
