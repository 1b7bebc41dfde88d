//! Worker state machine: register, claim/execute/retry, unregister.
//!
//! Mirrors the original prototype's `worker_loop`/`run_job` pair almost
//! line for line, generalized over `Store` so it runs against either
//! `SqliteStore` or (in tests) `queue_testing::MemoryStore`.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use queue_core::config::{KEY_JOB_TIMEOUT_SECONDS, KEY_LOG_DIR, KEY_POLL_INTERVAL_SECONDS, KEY_SHUTDOWN_FLAG};
use queue_core::executor::Executor;
use queue_core::{Job, Result, Store};

/// Builds a worker id of the form `<hostname>-<pid>-<n>`, distinct across
/// hosts and across multiple in-process workers, per `spec.md` §4.6's
/// "each must have a distinct worker id".
pub fn worker_id(index: usize) -> String {
    let host = gethostname::gethostname().to_string_lossy().into_owned();
    let pid = std::process::id();
    format!("{host}-{pid}-{index}")
}

/// Runs one worker's lifecycle to completion: register, poll loop until
/// `shutdown_flag='1'`, unregister. Blocking; intended to run on its own
/// `std::thread`.
pub fn run(store: &dyn Store, worker_id: &str) -> Result<()> {
    store.register_worker(worker_id)?;
    info!(worker_id, "worker registered");
    store.recover_stuck_jobs()?;

    let result = poll_loop(store, worker_id);

    // Best-effort: a crashed worker leaves its row behind for the next
    // worker's `recover_stuck_jobs` to clean up, per spec.md §4.3/§4.6.
    let _ = store.unregister_worker(worker_id);
    info!(worker_id, "worker unregistered");
    result
}

fn poll_loop(store: &dyn Store, worker_id: &str) -> Result<()> {
    let executor = Executor;
    loop {
        if store.get_config(KEY_SHUTDOWN_FLAG)?.as_deref() == Some("1") {
            info!(worker_id, "shutdown flag set, exiting");
            return Ok(());
        }

        match store.claim(worker_id)? {
            Some(job) => run_job(store, &executor, &job)?,
            None => {
                let poll_interval: u64 =
                    store.get_config(KEY_POLL_INTERVAL_SECONDS)?.and_then(|v| v.parse().ok()).unwrap_or(1);
                std::thread::sleep(Duration::from_secs(poll_interval));
            }
        }
    }
}

/// Run a claimed job through the executor and apply the retry/DLQ policy.
/// A log-write or executor I/O fault fails the current attempt rather
/// than killing the worker, per spec.md §7's "Transient I/O" handling.
fn run_job(store: &dyn Store, executor: &Executor, job: &Job) -> Result<()> {
    let timeout_seconds = if job.timeout_seconds > 0 {
        job.timeout_seconds
    } else {
        store.get_config(KEY_JOB_TIMEOUT_SECONDS)?.and_then(|v| v.parse().ok()).unwrap_or(0)
    };
    let log_dir = store.get_config(KEY_LOG_DIR)?.unwrap_or_else(|| "logs".to_string());
    let unix_seconds = chrono::Utc::now().timestamp();

    let outcome = executor.run(std::path::Path::new(&log_dir), &job.id, &job.command, timeout_seconds, unix_seconds);

    match outcome {
        Ok(result) if result.ok => {
            debug!(job_id = %job.id, "job completed successfully");
            store.complete(&job.id)?;
        }
        Ok(_) => {
            store.fail(&job.id)?;
        }
        Err(err) => {
            warn!(job_id = %job.id, %err, "job attempt failed with an I/O error");
            store.fail(&job.id)?;
        }
    }
    Ok(())
}

/// Spawns `count` workers on their own `std::thread`s against a shared
/// `Store`. The caller waits on the returned handles (e.g. until an
/// interrupt flips `shutdown_flag`) to let them drain.
pub fn spawn_workers(store: Arc<dyn Store>, count: usize) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|n| {
            let store = Arc::clone(&store);
            let id = worker_id(n);
            std::thread::spawn(move || {
                if let Err(err) = run(store.as_ref(), &id) {
                    warn!(worker_id = %id, %err, "worker exited with an error");
                }
            })
        })
        .collect()
}
