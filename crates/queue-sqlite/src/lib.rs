//! SQLite-backed [`Store`] implementation.
//!
//! A single embedded database file, opened with `PRAGMA journal_mode=WAL`
//! and a busy timeout so concurrent worker threads and the read-only HTTP
//! API can share one handle without colliding. Every `Store` method is one
//! transaction; the SQL mirrors the original prototype's schema and
//! statements exactly, including its tie-break order on claim.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use queue_core::config::{
    KEY_BACKOFF_BASE, KEY_DEFAULT_MAX_RETRIES, KEY_JOB_TIMEOUT_SECONDS, KEY_LOG_DIR,
    KEY_POLL_INTERVAL_SECONDS, KEY_SHUTDOWN_FLAG,
};
use queue_core::model::{DlqEntry, Job, JobDescriptor, JobFilter, JobState, QueueStatus, WorkerRow};
use queue_core::{timestamp, QueueError, Result, Store};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
  id TEXT PRIMARY KEY,
  command TEXT NOT NULL,
  state TEXT NOT NULL DEFAULT 'pending',
  attempts INTEGER NOT NULL DEFAULT 0,
  max_retries INTEGER NOT NULL DEFAULT 3,
  timeout_seconds INTEGER DEFAULT 0,
  priority INTEGER DEFAULT 0,
  run_at TEXT DEFAULT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  next_run_at TEXT NOT NULL,
  locked_by TEXT,
  locked_at TEXT
);
CREATE TABLE IF NOT EXISTS dlq (
  id TEXT PRIMARY KEY,
  command TEXT NOT NULL,
  attempts INTEGER NOT NULL,
  max_retries INTEGER NOT NULL,
  failed_at TEXT NOT NULL,
  last_error TEXT
);
CREATE TABLE IF NOT EXISTS config (key TEXT PRIMARY KEY, value TEXT NOT NULL);
CREATE TABLE IF NOT EXISTS workers (worker_id TEXT PRIMARY KEY, started_at TEXT NOT NULL);
"#;

const DEFAULT_CONFIG: &[(&str, &str)] = &[
    (KEY_BACKOFF_BASE, "2"),
    (KEY_DEFAULT_MAX_RETRIES, "3"),
    (KEY_POLL_INTERVAL_SECONDS, "1"),
    (KEY_SHUTDOWN_FLAG, "0"),
    (KEY_JOB_TIMEOUT_SECONDS, "0"),
    (KEY_LOG_DIR, "logs"),
];

/// SQLite-backed store. A single owned handle behind a mutex is enough
/// for a process with a handful of worker threads; callers share one
/// `SqliteStore` (typically wrapped in an `Arc`) across those threads.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if absent) the database at `path`, enable WAL mode,
    /// run the schema, and seed default config values that aren't
    /// already present.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(to_queue_error)?;
        Self::init(conn)
    }

    /// In-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(to_queue_error)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5)).map_err(to_queue_error)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(to_queue_error)?;
        conn.execute_batch(SCHEMA_SQL).map_err(to_queue_error)?;
        for (k, v) in DEFAULT_CONFIG {
            conn.execute(
                "INSERT OR IGNORE INTO config(key, value) VALUES (?1, ?2)",
                params![k, v],
            )
            .map_err(to_queue_error)?;
        }
        info!("sqlite store opened");
        Ok(SqliteStore { conn: Mutex::new(conn) })
    }

    fn cfg_get(conn: &Connection, key: &str) -> Result<String> {
        conn.query_row("SELECT value FROM config WHERE key = ?1", params![key], |r| r.get(0))
            .optional()
            .map_err(to_queue_error)?
            .ok_or_else(|| QueueError::NotFound(format!("config key {key}")))
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let state: String = row.get("state")?;
        Ok(Job {
            id: row.get("id")?,
            command: row.get("command")?,
            state: JobState::parse(&state).unwrap_or(JobState::Pending),
            attempts: row.get("attempts")?,
            max_retries: row.get("max_retries")?,
            timeout_seconds: row.get("timeout_seconds")?,
            priority: row.get("priority")?,
            run_at: row.get("run_at")?,
            next_run_at: row.get("next_run_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            locked_by: row.get("locked_by")?,
            locked_at: row.get("locked_at")?,
        })
    }
}

fn to_queue_error(e: rusqlite::Error) -> QueueError {
    QueueError::Io(e.to_string())
}

impl Store for SqliteStore {
    fn enqueue(&self, descriptor: JobDescriptor) -> Result<Job> {
        if descriptor.id.trim().is_empty() || descriptor.command.trim().is_empty() {
            return Err(QueueError::BadInput("id and command are required".into()));
        }
        let conn = self.conn.lock().unwrap();
        let now = timestamp::now_iso(&queue_core::SystemClock);
        let run_at = descriptor.run_at.clone().unwrap_or_else(|| now.clone());
        let default_max_retries: i64 = Self::cfg_get(&conn, KEY_DEFAULT_MAX_RETRIES)?
            .parse()
            .unwrap_or(3);
        let max_retries = descriptor.max_retries.unwrap_or(default_max_retries);
        let timeout_seconds = descriptor.timeout_seconds.unwrap_or(0);
        let priority = descriptor.priority.unwrap_or(0);
        // Only honored on a brand-new row: the ON CONFLICT path below always
        // resets state/attempts, per spec.md §4.2's upsert semantics.
        let initial_state = descriptor.state.unwrap_or(JobState::Pending);
        let initial_attempts = descriptor.attempts.unwrap_or(0);

        conn.execute(
            r#"
            INSERT INTO jobs(id, command, state, attempts, max_retries, timeout_seconds,
                              priority, run_at, created_at, updated_at, next_run_at,
                              locked_by, locked_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, ?8, NULL, NULL)
            ON CONFLICT(id) DO UPDATE SET
              command = excluded.command,
              state = 'pending',
              attempts = 0,
              updated_at = excluded.updated_at,
              next_run_at = excluded.next_run_at,
              timeout_seconds = excluded.timeout_seconds,
              priority = excluded.priority,
              run_at = excluded.run_at,
              locked_by = NULL,
              locked_at = NULL
            "#,
            params![
                descriptor.id,
                descriptor.command,
                initial_state.as_str(),
                initial_attempts,
                max_retries,
                timeout_seconds,
                priority,
                run_at,
                now,
            ],
        )
        .map_err(to_queue_error)?;

        debug!(job_id = %descriptor.id, priority, %run_at, "enqueued job");

        conn.query_row("SELECT * FROM jobs WHERE id = ?1", params![descriptor.id], Self::row_to_job)
            .map_err(to_queue_error)
    }

    fn claim(&self, worker_id: &str) -> Result<Option<Job>> {
        let conn = self.conn.lock().unwrap();
        let now = timestamp::now_iso(&queue_core::SystemClock);

        let candidate: Option<String> = conn
            .query_row(
                r#"
                SELECT id FROM jobs
                WHERE state = 'pending'
                  AND next_run_at <= ?1
                  AND (run_at IS NULL OR run_at <= ?1)
                ORDER BY priority DESC, created_at ASC, id ASC
                LIMIT 1
                "#,
                params![now],
                |r| r.get(0),
            )
            .optional()
            .map_err(to_queue_error)?;

        let Some(job_id) = candidate else {
            return Ok(None);
        };

        let updated = conn
            .execute(
                "UPDATE jobs SET state = 'processing', locked_by = ?1, locked_at = ?2, updated_at = ?2
                 WHERE id = ?3 AND state = 'pending'",
                params![worker_id, now, job_id],
            )
            .map_err(to_queue_error)?;

        if updated == 0 {
            // Lost the race to another worker between the select and the update.
            return Ok(None);
        }

        debug!(job_id = %job_id, worker_id, "claimed job");

        conn.query_row("SELECT * FROM jobs WHERE id = ?1", params![job_id], Self::row_to_job)
            .optional()
            .map_err(to_queue_error)
    }

    fn complete(&self, job_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = timestamp::now_iso(&queue_core::SystemClock);
        let updated = conn
            .execute(
                "UPDATE jobs SET state = 'completed', updated_at = ?1, locked_by = NULL, locked_at = NULL
                 WHERE id = ?2",
                params![now, job_id],
            )
            .map_err(to_queue_error)?;
        if updated == 0 {
            return Err(QueueError::NotFound(format!("job {job_id}")));
        }
        Ok(())
    }

    fn fail(&self, job_id: &str) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let now_dt = Utc::now();
        let now = timestamp::format(now_dt);

        let job = conn
            .query_row("SELECT * FROM jobs WHERE id = ?1", params![job_id], Self::row_to_job)
            .optional()
            .map_err(to_queue_error)?
            .ok_or_else(|| QueueError::NotFound(format!("job {job_id}")))?;

        let backoff_base: i64 = Self::cfg_get(&conn, KEY_BACKOFF_BASE)?.parse().unwrap_or(2);
        let attempts = job.attempts + 1;
        let outcome = queue_core::retry::decide(attempts, job.max_retries, backoff_base, now_dt);

        let tx = conn.transaction().map_err(to_queue_error)?;
        match outcome {
            queue_core::retry::RetryOutcome::DeadLetter => {
                tx.execute(
                    "UPDATE jobs SET state = 'dead', attempts = ?1, updated_at = ?2, locked_by = NULL, locked_at = NULL
                     WHERE id = ?3",
                    params![attempts, now, job_id],
                )
                .map_err(to_queue_error)?;
                tx.execute(
                    "INSERT OR REPLACE INTO dlq(id, command, attempts, max_retries, failed_at, last_error)
                     VALUES (?1, ?2, ?3, ?4, ?5, 'failed')",
                    params![job_id, job.command, attempts, job.max_retries, now],
                )
                .map_err(to_queue_error)?;
                info!(job_id, attempts, "job dead-lettered");
            }
            queue_core::retry::RetryOutcome::Retry { next_run_at } => {
                tx.execute(
                    "UPDATE jobs SET state = 'pending', attempts = ?1, next_run_at = ?2, updated_at = ?3,
                     locked_by = NULL, locked_at = NULL WHERE id = ?4",
                    params![attempts, next_run_at, now, job_id],
                )
                .map_err(to_queue_error)?;
                debug!(job_id, attempts, %next_run_at, "job rescheduled for retry");
            }
        }
        tx.commit().map_err(to_queue_error)?;
        Ok(())
    }

    fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM jobs WHERE id = ?1", params![job_id], Self::row_to_job)
            .optional()
            .map_err(to_queue_error)
    }

    fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>> {
        let conn = self.conn.lock().unwrap();
        let mut jobs = Vec::new();
        if let Some(state) = filter.state {
            let mut stmt = conn
                .prepare("SELECT * FROM jobs WHERE state = ?1 ORDER BY priority DESC")
                .map_err(to_queue_error)?;
            let rows = stmt
                .query_map(params![state.as_str()], Self::row_to_job)
                .map_err(to_queue_error)?;
            for row in rows {
                jobs.push(row.map_err(to_queue_error)?);
            }
        } else {
            let mut stmt = conn.prepare("SELECT * FROM jobs").map_err(to_queue_error)?;
            let rows = stmt.query_map([], Self::row_to_job).map_err(to_queue_error)?;
            for row in rows {
                jobs.push(row.map_err(to_queue_error)?);
            }
        }
        Ok(jobs)
    }

    fn delete_job(&self, job_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let deleted_jobs =
            conn.execute("DELETE FROM jobs WHERE id = ?1", params![job_id]).map_err(to_queue_error)?;
        if deleted_jobs == 0 {
            return Err(QueueError::NotFound(format!("job {job_id}")));
        }
        Ok(())
    }

    fn list_dlq(&self) -> Result<Vec<DlqEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT * FROM dlq ORDER BY failed_at DESC")
            .map_err(to_queue_error)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DlqEntry {
                    id: row.get("id")?,
                    command: row.get("command")?,
                    attempts: row.get("attempts")?,
                    max_retries: row.get("max_retries")?,
                    failed_at: row.get("failed_at")?,
                    last_error: row.get("last_error")?,
                })
            })
            .map_err(to_queue_error)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(to_queue_error)?);
        }
        Ok(entries)
    }

    fn requeue_dlq(&self, job_id: &str) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let exists: Option<String> = conn
            .query_row("SELECT id FROM dlq WHERE id = ?1", params![job_id], |r| r.get(0))
            .optional()
            .map_err(to_queue_error)?;
        if exists.is_none() {
            return Err(QueueError::NotFound(format!("job {job_id} not in dead-letter queue")));
        }
        let now = timestamp::now_iso(&queue_core::SystemClock);
        let tx = conn.transaction().map_err(to_queue_error)?;
        tx.execute(
            "UPDATE jobs SET state = 'pending', attempts = 0, next_run_at = ?1, updated_at = ?1,
             locked_by = NULL, locked_at = NULL WHERE id = ?2",
            params![now, job_id],
        )
        .map_err(to_queue_error)?;
        tx.execute("DELETE FROM dlq WHERE id = ?1", params![job_id])
            .map_err(to_queue_error)?;
        tx.commit().map_err(to_queue_error)?;
        info!(job_id, "requeued dead-lettered job");
        Ok(())
    }

    fn status(&self) -> Result<QueueStatus> {
        let conn = self.conn.lock().unwrap();
        let mut status = QueueStatus::default();
        let mut stmt = conn
            .prepare("SELECT state, COUNT(*) FROM jobs GROUP BY state")
            .map_err(to_queue_error)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(to_queue_error)?;
        for row in rows {
            let (state, count) = row.map_err(to_queue_error)?;
            match state.as_str() {
                "pending" => status.pending = count,
                "processing" => status.processing = count,
                "completed" => status.completed = count,
                "dead" => status.dead = count,
                "failed" => status.failed = count,
                _ => {}
            }
        }
        status.workers = conn
            .query_row("SELECT COUNT(*) FROM workers", [], |r| r.get(0))
            .map_err(to_queue_error)?;
        Ok(status)
    }

    fn register_worker(&self, worker_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = timestamp::now_iso(&queue_core::SystemClock);
        conn.execute(
            "INSERT OR REPLACE INTO workers(worker_id, started_at) VALUES (?1, ?2)",
            params![worker_id, now],
        )
        .map_err(to_queue_error)?;
        Ok(())
    }

    fn unregister_worker(&self, worker_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM workers WHERE worker_id = ?1", params![worker_id])
            .map_err(to_queue_error)?;
        Ok(())
    }

    fn list_workers(&self) -> Result<Vec<WorkerRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM workers").map_err(to_queue_error)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(WorkerRow {
                    worker_id: row.get("worker_id")?,
                    started_at: row.get("started_at")?,
                })
            })
            .map_err(to_queue_error)?;
        let mut workers = Vec::new();
        for row in rows {
            workers.push(row.map_err(to_queue_error)?);
        }
        Ok(workers)
    }

    fn recover_stuck_jobs(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let now = timestamp::now_iso(&queue_core::SystemClock);
        let recovered = conn
            .execute(
                r#"
                UPDATE jobs SET state = 'pending', locked_by = NULL, locked_at = NULL, updated_at = ?1
                WHERE state = 'processing'
                  AND (locked_by IS NULL OR locked_by NOT IN (SELECT worker_id FROM workers))
                "#,
                params![now],
            )
            .map_err(to_queue_error)?;
        if recovered > 0 {
            info!(recovered, "recovered stuck jobs from crashed workers");
        }
        Ok(recovered as u64)
    }

    fn get_config(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT value FROM config WHERE key = ?1", params![key], |r| r.get(0))
            .optional()
            .map_err(to_queue_error)
    }

    fn set_config(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO config(key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .map_err(to_queue_error)?;
        Ok(())
    }

    fn config_snapshot(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT key, value FROM config").map_err(to_queue_error)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(to_queue_error)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(to_queue_error)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_core::model::JobDescriptor;

    fn descriptor(id: &str, command: &str) -> JobDescriptor {
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

    #[test]
    fn enqueue_then_claim_round_trips() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.enqueue(descriptor("a", "echo hi")).unwrap();
        let claimed = store.claim("worker-1").unwrap().unwrap();
        assert_eq!(claimed.id, "a");
        assert_eq!(claimed.state, JobState::Processing);
        assert_eq!(claimed.locked_by.as_deref(), Some("worker-1"));
    }

    #[test]
    fn claim_is_exclusive_across_workers() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.enqueue(descriptor("a", "echo hi")).unwrap();
        assert!(store.claim("worker-1").unwrap().is_some());
        assert!(store.claim("worker-2").unwrap().is_none());
    }

    #[test]
    fn higher_priority_is_claimed_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .enqueue(JobDescriptor { priority: Some(1), ..descriptor("low", "true") })
            .unwrap();
        store
            .enqueue(JobDescriptor { priority: Some(5), ..descriptor("high", "true") })
            .unwrap();
        let claimed = store.claim("worker-1").unwrap().unwrap();
        assert_eq!(claimed.id, "high");
    }

    #[test]
    fn fail_dead_letters_after_max_retries() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .enqueue(JobDescriptor { max_retries: Some(1), ..descriptor("a", "false") })
            .unwrap();
        store.claim("worker-1").unwrap().unwrap();
        store.fail("a").unwrap();
        let job = store.get_job("a").unwrap().unwrap();
        assert_eq!(job.state, JobState::Pending);

        store.claim("worker-1").unwrap();
        store.fail("a").unwrap();
        let job = store.get_job("a").unwrap().unwrap();
        assert_eq!(job.state, JobState::Dead);
        assert_eq!(store.list_dlq().unwrap().len(), 1);
    }

    #[test]
    fn requeue_dlq_resets_attempts_and_clears_entry() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .enqueue(JobDescriptor { max_retries: Some(0), ..descriptor("a", "false") })
            .unwrap();
        store.claim("worker-1").unwrap().unwrap();
        store.fail("a").unwrap();
        assert_eq!(store.list_dlq().unwrap().len(), 1);

        store.requeue_dlq("a").unwrap();
        assert!(store.list_dlq().unwrap().is_empty());
        let job = store.get_job("a").unwrap().unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);
    }

    #[test]
    fn requeue_nonexistent_dlq_entry_errors() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(store.requeue_dlq("ghost"), Err(QueueError::NotFound(_))));
    }

    #[test]
    fn recover_stuck_jobs_resets_orphaned_processing_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.enqueue(descriptor("a", "true")).unwrap();
        store.register_worker("worker-1").unwrap();
        store.claim("worker-1").unwrap().unwrap();
        store.unregister_worker("worker-1").unwrap();

        let recovered = store.recover_stuck_jobs().unwrap();
        assert_eq!(recovered, 1);
        let job = store.get_job("a").unwrap().unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert!(job.locked_by.is_none());
    }

    #[test]
    fn enqueue_upserts_and_resets_state() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.enqueue(descriptor("a", "echo 1")).unwrap();
        store.claim("worker-1").unwrap().unwrap();
        store.complete("a").unwrap();

        store.enqueue(descriptor("a", "echo 2")).unwrap();
        let job = store.get_job("a").unwrap().unwrap();
        assert_eq!(job.command, "echo 2");
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);
    }

    #[test]
    fn status_counts_match_job_states() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.enqueue(descriptor("a", "true")).unwrap();
        store.enqueue(descriptor("b", "true")).unwrap();
        store.claim("worker-1").unwrap();
        store.complete("a").unwrap();

        let status = store.status().unwrap();
        assert_eq!(status.completed, 1);
        assert_eq!(status.pending, 1);
    }

    #[test]
    fn committed_state_survives_reopening_the_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.enqueue(descriptor("a", "echo hi")).unwrap();
            store.claim("worker-1").unwrap().unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        let job = reopened.get_job("a").unwrap().unwrap();
        assert_eq!(job.state, JobState::Processing);
        assert_eq!(job.locked_by.as_deref(), Some("worker-1"));
    }

    #[test]
    fn claim_is_exclusive_across_concurrently_racing_threads() {
        use std::sync::Arc;

        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.enqueue(descriptor("a", "echo hi")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.claim(&format!("worker-{n}")).unwrap().is_some())
            })
            .collect();

        let winners: usize = handles.into_iter().map(|h| h.join().unwrap()).filter(|won| *won).count();
        assert_eq!(winners, 1, "exactly one concurrent claim should win the race");
    }

    #[test]
    fn fail_advances_next_run_at_monotonically_across_retries() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .enqueue(JobDescriptor { max_retries: Some(5), ..descriptor("a", "false") })
            .unwrap();

        store.claim("worker-1").unwrap().unwrap();
        store.fail("a").unwrap();
        let after_first = store.get_job("a").unwrap().unwrap().next_run_at;

        store.claim("worker-1").unwrap().unwrap();
        store.fail("a").unwrap();
        let after_second = store.get_job("a").unwrap().unwrap().next_run_at;

        assert!(after_second > after_first, "{after_second} should be strictly later than {after_first}");
    }

    #[test]
    fn delete_job_does_not_cascade_to_dlq() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .enqueue(JobDescriptor { max_retries: Some(0), ..descriptor("a", "false") })
            .unwrap();
        store.claim("worker-1").unwrap().unwrap();
        store.fail("a").unwrap();
        assert_eq!(store.list_dlq().unwrap().len(), 1);

        store.delete_job("a").unwrap();
        assert!(store.get_job("a").unwrap().is_none());
        assert_eq!(store.list_dlq().unwrap().len(), 1, "the DLQ row must survive the jobs row being deleted");
    }

    #[test]
    fn delete_job_errors_when_only_a_dlq_row_remains() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .enqueue(JobDescriptor { max_retries: Some(0), ..descriptor("a", "false") })
            .unwrap();
        store.claim("worker-1").unwrap().unwrap();
        store.fail("a").unwrap();
        store.delete_job("a").unwrap();

        assert!(matches!(store.delete_job("a"), Err(QueueError::NotFound(_))));
    }

    #[test]
    fn enqueue_honors_seeded_state_and_attempts_on_a_new_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .enqueue(JobDescriptor {
                state: Some(JobState::Completed),
                attempts: Some(2),
                ..descriptor("a", "echo hi")
            })
            .unwrap();
        let job = store.get_job("a").unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.attempts, 2);
    }

    #[test]
    fn enqueue_ignores_seeded_state_and_attempts_on_an_existing_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.enqueue(descriptor("a", "echo hi")).unwrap();
        store.claim("worker-1").unwrap().unwrap();
        store.complete("a").unwrap();

        store
            .enqueue(JobDescriptor {
                state: Some(JobState::Completed),
                attempts: Some(7),
                ..descriptor("a", "echo again")
            })
            .unwrap();
        let job = store.get_job("a").unwrap().unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);
    }
}
