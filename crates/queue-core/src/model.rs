//! Job, DLQ entry, and worker registry row types.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
///
/// `Failed` is never constructed by this crate — it exists only because
/// the status summary bucket named it in the original prototype, and a
/// surviving client may still expect the key to be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Dead,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Dead => "dead",
            JobState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobState::Pending),
            "processing" => Some(JobState::Processing),
            "completed" => Some(JobState::Completed),
            "dead" => Some(JobState::Dead),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }
}

/// A job row as persisted by the Store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub command: String,
    pub state: JobState,
    pub attempts: i64,
    pub max_retries: i64,
    pub timeout_seconds: i64,
    pub priority: i64,
    pub run_at: Option<String>,
    pub next_run_at: String,
    pub created_at: String,
    pub updated_at: String,
    pub locked_by: Option<String>,
    pub locked_at: Option<String>,
}

/// Caller-supplied fields for `Store::enqueue`. `state` and `attempts` only
/// take effect when the id is brand new — the upsert path always resets an
/// existing row to `pending`/`0` regardless of what the caller supplies
/// (`spec.md` §4.2); everything else (timestamps) is derived by the Store.
#[derive(Debug, Clone, Deserialize)]
pub struct JobDescriptor {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub state: Option<JobState>,
    #[serde(default)]
    pub attempts: Option<i64>,
    #[serde(default)]
    pub max_retries: Option<i64>,
    #[serde(default)]
    pub timeout_seconds: Option<i64>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub run_at: Option<String>,
}

/// A dead-lettered job as persisted by the Store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub id: String,
    pub command: String,
    pub attempts: i64,
    pub max_retries: i64,
    pub failed_at: String,
    pub last_error: String,
}

/// A registered worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRow {
    pub worker_id: String,
    pub started_at: String,
}

/// Aggregate counts returned by `Store::status`, keyed by job state plus
/// the live worker count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStatus {
    pub workers: i64,
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub dead: i64,
    pub failed: i64,
}

/// Filter accepted by `Store::list_jobs`.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub state: Option<JobState>,
}
