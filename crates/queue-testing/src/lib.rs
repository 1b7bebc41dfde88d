//! An in-memory [`Store`] and job-descriptor builders used by the other
//! crates' test suites, so `queue-worker`'s loop logic (and anything else
//! built against the trait) can be exercised without SQLite.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use queue_core::config::{
    KEY_BACKOFF_BASE, KEY_DEFAULT_MAX_RETRIES, KEY_JOB_TIMEOUT_SECONDS, KEY_LOG_DIR,
    KEY_POLL_INTERVAL_SECONDS, KEY_SHUTDOWN_FLAG,
};
use queue_core::model::{DlqEntry, Job, JobDescriptor, JobFilter, JobState, QueueStatus, WorkerRow};
use queue_core::retry::{decide, resulting_state, RetryOutcome};
use queue_core::{timestamp, QueueError, Result, Store};

/// A `Job` descriptor with every field defaulted, for brevity in tests.
/// Override individual fields with struct-update syntax:
/// `JobDescriptor { priority: Some(5), ..job("a", "echo hi") }`.
pub fn job(id: &str, command: &str) -> JobDescriptor {
    JobDescriptor {
        id: id.to_string(),
        command: command.to_string(),
        state: None,
        attempts: None,
        max_retries: None,
        timeout_seconds: None,
        priority: None,
        run_at: None,
    }
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, Job>,
    dlq: HashMap<String, DlqEntry>,
    config: HashMap<String, String>,
    workers: HashMap<String, WorkerRow>,
}

/// `HashMap`-backed `Store`, guarded by a single mutex. Mirrors
/// `SqliteStore`'s semantics exactly (same claim tie-break, same retry
/// policy) but with nothing to open or tear down, for fast unit tests.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut config = HashMap::new();
        config.insert(KEY_BACKOFF_BASE.to_string(), "2".to_string());
        config.insert(KEY_DEFAULT_MAX_RETRIES.to_string(), "3".to_string());
        config.insert(KEY_POLL_INTERVAL_SECONDS.to_string(), "1".to_string());
        config.insert(KEY_SHUTDOWN_FLAG.to_string(), "0".to_string());
        config.insert(KEY_JOB_TIMEOUT_SECONDS.to_string(), "0".to_string());
        config.insert(KEY_LOG_DIR.to_string(), "logs".to_string());
        MemoryStore {
            inner: Mutex::new(Inner { jobs: HashMap::new(), dlq: HashMap::new(), config, workers: HashMap::new() }),
        }
    }
}

impl Store for MemoryStore {
    fn enqueue(&self, descriptor: JobDescriptor) -> Result<Job> {
        if descriptor.id.trim().is_empty() || descriptor.command.trim().is_empty() {
            return Err(QueueError::BadInput("id and command are required".into()));
        }
        let mut inner = self.inner.lock().unwrap();
        let now = timestamp::now_iso(&queue_core::SystemClock);
        let default_max_retries: i64 =
            inner.config.get(KEY_DEFAULT_MAX_RETRIES).and_then(|v| v.parse().ok()).unwrap_or(3);
        let run_at = descriptor.run_at.clone().unwrap_or_else(|| now.clone());
        let max_retries = descriptor.max_retries.unwrap_or(default_max_retries);
        let timeout_seconds = descriptor.timeout_seconds.unwrap_or(0);
        let priority = descriptor.priority.unwrap_or(0);

        let is_new = !inner.jobs.contains_key(&descriptor.id);
        let created_at = inner.jobs.get(&descriptor.id).map(|j| j.created_at.clone()).unwrap_or_else(|| now.clone());
        // Only honored on a brand-new row: an existing row is always reset
        // to pending/0, per spec.md §4.2's upsert semantics.
        let (state, attempts) = if is_new {
            (descriptor.state.unwrap_or(JobState::Pending), descriptor.attempts.unwrap_or(0))
        } else {
            (JobState::Pending, 0)
        };

        let job = Job {
            id: descriptor.id.clone(),
            command: descriptor.command,
            state,
            attempts,
            max_retries,
            timeout_seconds,
            priority,
            run_at: Some(run_at.clone()),
            next_run_at: run_at,
            created_at,
            updated_at: now,
            locked_by: None,
            locked_at: None,
        };
        inner.jobs.insert(descriptor.id, job.clone());
        Ok(job)
    }

    fn claim(&self, worker_id: &str) -> Result<Option<Job>> {
        let mut inner = self.inner.lock().unwrap();
        let now = timestamp::now_iso(&queue_core::SystemClock);

        let candidate_id = inner
            .jobs
            .values()
            .filter(|j| {
                j.state == JobState::Pending
                    && j.next_run_at.as_str() <= now.as_str()
                    && j.run_at.as_deref().map(|r| r <= now.as_str()).unwrap_or(true)
            })
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| a.created_at.cmp(&b.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|j| j.id.clone());

        let Some(job_id) = candidate_id else {
            return Ok(None);
        };

        let job = inner.jobs.get_mut(&job_id).unwrap();
        if job.state != JobState::Pending {
            return Ok(None);
        }
        job.state = JobState::Processing;
        job.locked_by = Some(worker_id.to_string());
        job.locked_at = Some(now.clone());
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    fn complete(&self, job_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let now = timestamp::now_iso(&queue_core::SystemClock);
        let job = inner.jobs.get_mut(job_id).ok_or_else(|| QueueError::NotFound(format!("job {job_id}")))?;
        job.state = JobState::Completed;
        job.locked_by = None;
        job.locked_at = None;
        job.updated_at = now;
        Ok(())
    }

    fn fail(&self, job_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let now_dt = Utc::now();
        let now = timestamp::format(now_dt);
        let backoff_base: i64 = inner.config.get(KEY_BACKOFF_BASE).and_then(|v| v.parse().ok()).unwrap_or(2);

        let (attempts, max_retries, command) = {
            let job = inner.jobs.get(job_id).ok_or_else(|| QueueError::NotFound(format!("job {job_id}")))?;
            (job.attempts + 1, job.max_retries, job.command.clone())
        };
        let outcome = decide(attempts, max_retries, backoff_base, now_dt);
        let new_state = resulting_state(&outcome);

        let job = inner.jobs.get_mut(job_id).unwrap();
        job.attempts = attempts;
        job.state = new_state;
        job.locked_by = None;
        job.locked_at = None;
        job.updated_at = now.clone();
        if let RetryOutcome::Retry { next_run_at } = &outcome {
            job.next_run_at = next_run_at.clone();
        }

        if matches!(outcome, RetryOutcome::DeadLetter) {
            inner.dlq.insert(
                job_id.to_string(),
                DlqEntry {
                    id: job_id.to_string(),
                    command,
                    attempts,
                    max_retries,
                    failed_at: now,
                    last_error: "failed".to_string(),
                },
            );
        }
        Ok(())
    }

    fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        Ok(self.inner.lock().unwrap().jobs.get(job_id).cloned())
    }

    fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>> {
        let inner = self.inner.lock().unwrap();
        let mut jobs: Vec<Job> = match filter.state {
            Some(state) => inner.jobs.values().filter(|j| j.state == state).cloned().collect(),
            None => inner.jobs.values().cloned().collect(),
        };
        if filter.state.is_some() {
            jobs.sort_by(|a, b| b.priority.cmp(&a.priority));
        }
        Ok(jobs)
    }

    fn delete_job(&self, job_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.jobs.remove(job_id).is_none() {
            return Err(QueueError::NotFound(format!("job {job_id}")));
        }
        Ok(())
    }

    fn list_dlq(&self) -> Result<Vec<DlqEntry>> {
        let inner = self.inner.lock().unwrap();
        let mut entries: Vec<DlqEntry> = inner.dlq.values().cloned().collect();
        entries.sort_by(|a, b| b.failed_at.cmp(&a.failed_at));
        Ok(entries)
    }

    fn requeue_dlq(&self, job_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.dlq.remove(job_id).is_none() {
            return Err(QueueError::NotFound(format!("job {job_id} not in dead-letter queue")));
        }
        let now = timestamp::now_iso(&queue_core::SystemClock);
        if let Some(job) = inner.jobs.get_mut(job_id) {
            job.state = JobState::Pending;
            job.attempts = 0;
            job.next_run_at = now.clone();
            job.updated_at = now;
            job.locked_by = None;
            job.locked_at = None;
        }
        Ok(())
    }

    fn status(&self) -> Result<QueueStatus> {
        let inner = self.inner.lock().unwrap();
        let mut status = QueueStatus { workers: inner.workers.len() as i64, ..Default::default() };
        for job in inner.jobs.values() {
            match job.state {
                JobState::Pending => status.pending += 1,
                JobState::Processing => status.processing += 1,
                JobState::Completed => status.completed += 1,
                JobState::Dead => status.dead += 1,
                JobState::Failed => status.failed += 1,
            }
        }
        Ok(status)
    }

    fn register_worker(&self, worker_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let now = timestamp::now_iso(&queue_core::SystemClock);
        inner.workers.insert(worker_id.to_string(), WorkerRow { worker_id: worker_id.to_string(), started_at: now });
        Ok(())
    }

    fn unregister_worker(&self, worker_id: &str) -> Result<()> {
        self.inner.lock().unwrap().workers.remove(worker_id);
        Ok(())
    }

    fn list_workers(&self) -> Result<Vec<WorkerRow>> {
        Ok(self.inner.lock().unwrap().workers.values().cloned().collect())
    }

    fn recover_stuck_jobs(&self) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let now = timestamp::now_iso(&queue_core::SystemClock);
        let registered: Vec<String> = inner.workers.keys().cloned().collect();
        let mut recovered = 0u64;
        for job in inner.jobs.values_mut() {
            if job.state == JobState::Processing
                && job.locked_by.as_ref().map(|w| !registered.contains(w)).unwrap_or(true)
            {
                job.state = JobState::Pending;
                job.locked_by = None;
                job.locked_at = None;
                job.updated_at = now.clone();
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    fn get_config(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().unwrap().config.get(key).cloned())
    }

    fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.inner.lock().unwrap().config.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn config_snapshot(&self) -> Result<Vec<(String, String)>> {
        Ok(self.inner.lock().unwrap().config.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_then_claim_round_trips() {
        let store = MemoryStore::new();
        store.enqueue(job("a", "echo hi")).unwrap();
        let claimed = store.claim("worker-1").unwrap().unwrap();
        assert_eq!(claimed.id, "a");
        assert_eq!(claimed.state, JobState::Processing);
    }

    #[test]
    fn claim_is_exclusive() {
        let store = MemoryStore::new();
        store.enqueue(job("a", "echo hi")).unwrap();
        assert!(store.claim("worker-1").unwrap().is_some());
        assert!(store.claim("worker-2").unwrap().is_none());
    }

    #[test]
    fn fail_dead_letters_after_max_retries() {
        let store = MemoryStore::new();
        store.enqueue(JobDescriptor { max_retries: Some(0), ..job("a", "false") }).unwrap();
        store.claim("worker-1").unwrap();
        store.fail("a").unwrap();
        assert_eq!(store.get_job("a").unwrap().unwrap().state, JobState::Dead);
        assert_eq!(store.list_dlq().unwrap().len(), 1);
    }

    #[test]
    fn delete_job_does_not_cascade_to_dlq() {
        let store = MemoryStore::new();
        store.enqueue(JobDescriptor { max_retries: Some(0), ..job("a", "false") }).unwrap();
        store.claim("worker-1").unwrap();
        store.fail("a").unwrap();
        assert_eq!(store.list_dlq().unwrap().len(), 1);

        store.delete_job("a").unwrap();
        assert!(store.get_job("a").unwrap().is_none());
        assert_eq!(store.list_dlq().unwrap().len(), 1, "the DLQ row must survive the jobs row being deleted");
    }

    #[test]
    fn delete_job_errors_when_only_a_dlq_row_remains() {
        let store = MemoryStore::new();
        store.enqueue(JobDescriptor { max_retries: Some(0), ..job("a", "false") }).unwrap();
        store.claim("worker-1").unwrap();
        store.fail("a").unwrap();
        store.delete_job("a").unwrap();

        assert!(matches!(store.delete_job("a"), Err(QueueError::NotFound(_))));
    }

    #[test]
    fn enqueue_honors_seeded_state_and_attempts_on_a_new_row() {
        let store = MemoryStore::new();
        store
            .enqueue(JobDescriptor { state: Some(JobState::Completed), attempts: Some(2), ..job("a", "echo hi") })
            .unwrap();
        let got = store.get_job("a").unwrap().unwrap();
        assert_eq!(got.state, JobState::Completed);
        assert_eq!(got.attempts, 2);
    }

    #[test]
    fn enqueue_ignores_seeded_state_and_attempts_on_an_existing_row() {
        let store = MemoryStore::new();
        store.enqueue(job("a", "echo hi")).unwrap();
        store.claim("worker-1").unwrap();
        store.complete("a").unwrap();

        store
            .enqueue(JobDescriptor {
                state: Some(JobState::Completed),
                attempts: Some(7),
                ..job("a", "echo again")
            })
            .unwrap();
        let got = store.get_job("a").unwrap().unwrap();
        assert_eq!(got.state, JobState::Pending);
        assert_eq!(got.attempts, 0);
    }
}
