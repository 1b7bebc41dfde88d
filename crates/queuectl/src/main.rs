//! `queuectl`: enqueue, list, status, worker start, DLQ list/retry, and
//! `serve` for the read-only HTTP control surface. Wires `queue-sqlite`,
//! `queue-worker`, and `queue-api` together over `queue-core`'s `Store`
//! trait.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use queue_core::config::QueueConfig;
use queue_core::model::{JobDescriptor, JobFilter, JobState};
use queue_core::Store;
use queue_sqlite::SqliteStore;

#[derive(Parser)]
#[command(name = "queuectl", about = "Durable, persistent job queue with retries, priorities, and a DLQ", version)]
struct Cli {
    /// Path to the SQLite database file.
    #[arg(long, global = true, default_value = "queue.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a job. ARG is a JSON object literal or `@path` to read JSON from a file.
    Enqueue { job_json: String },
    /// Print worker count and per-state job counts.
    Status,
    /// List jobs, optionally filtered by state.
    List {
        #[arg(long)]
        state: Option<String>,
    },
    /// Worker management.
    Worker {
        #[command(subcommand)]
        command: WorkerCommands,
    },
    /// Dead-letter queue management.
    Dlq {
        #[command(subcommand)]
        command: DlqCommands,
    },
    /// Start the read-only HTTP control surface.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
    },
}

#[derive(Subcommand)]
enum WorkerCommands {
    /// Start one or more workers and block until interrupted.
    Start {
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
}

#[derive(Subcommand)]
enum DlqCommands {
    /// List dead-lettered jobs.
    List,
    /// Requeue a dead-lettered job back to pending.
    Retry { job_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&cli.db)?);
    load_config(&store, &cli.db)?;

    match cli.command {
        Commands::Enqueue { job_json } => cmd_enqueue(&store, &job_json),
        Commands::Status => cmd_status(&store),
        Commands::List { state } => cmd_list(&store, state),
        Commands::Worker { command: WorkerCommands::Start { count } } => cmd_worker_start(store, count).await,
        Commands::Dlq { command } => match command {
            DlqCommands::List => cmd_dlq_list(&store),
            DlqCommands::Retry { job_id } => cmd_dlq_retry(&store, &job_id),
        },
        Commands::Serve { addr } => queue_api::serve(store, addr).await,
    }
}

/// Layers built-in defaults, an optional `queue.toml` next to the
/// database, and `QUEUECTL_*` env vars, then seeds the settable keys
/// into the store. `shutdown_flag` is never touched here — it is
/// runtime-only, per `spec.md` §4.9/`SPEC_FULL.md` §4.9.
fn load_config(store: &Arc<dyn Store>, db_path: &Path) -> Result<()> {
    let mut config = QueueConfig::default();

    let toml_path = db_path.with_file_name("queue.toml");
    if toml_path.exists() {
        let contents = std::fs::read_to_string(&toml_path)
            .with_context(|| format!("reading {}", toml_path.display()))?;
        let file: QueueConfig = toml::from_str(&contents).with_context(|| format!("parsing {}", toml_path.display()))?;
        config = config.merge_file(file);
    }

    let env: HashMap<String, String> = std::env::vars().filter(|(k, _)| k.starts_with("QUEUECTL_")).collect();
    config = config.merge_env(&env);

    for (key, value) in config.as_kv() {
        store.set_config(key, &value)?;
    }
    Ok(())
}

fn parse_job_json(arg: &str) -> Result<JobDescriptor> {
    let raw = if let Some(path) = arg.strip_prefix('@') {
        std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?
    } else {
        arg.to_string()
    };
    serde_json::from_str(&raw).context("invalid job JSON")
}

fn cmd_enqueue(store: &Arc<dyn Store>, job_json: &str) -> Result<()> {
    let descriptor = parse_job_json(job_json)?;
    let job = store.enqueue(descriptor)?;
    println!("Enqueued job {} (priority={}, run_at={})", job.id, job.priority, job.next_run_at);
    Ok(())
}

fn cmd_status(store: &Arc<dyn Store>) -> Result<()> {
    let status = store.status()?;
    println!("Workers: {}", status.workers);
    println!("{:<10} {}", "pending", status.pending);
    println!("{:<10} {}", "processing", status.processing);
    println!("{:<10} {}", "completed", status.completed);
    println!("{:<10} {}", "failed", status.failed);
    println!("{:<10} {}", "dead", status.dead);
    Ok(())
}

fn cmd_list(store: &Arc<dyn Store>, state: Option<String>) -> Result<()> {
    let filter = match state {
        Some(s) => {
            let parsed = JobState::parse(&s).with_context(|| format!("unknown state {s:?}"))?;
            JobFilter { state: Some(parsed) }
        }
        None => JobFilter::default(),
    };
    for job in store.list_jobs(filter)? {
        println!("{}", serde_json::to_string(&job)?);
    }
    Ok(())
}

async fn cmd_worker_start(store: Arc<dyn Store>, count: usize) -> Result<()> {
    store.set_config(queue_core::config::KEY_SHUTDOWN_FLAG, "0")?;
    let handles = queue_worker::spawn_workers(Arc::clone(&store), count);
    println!("Started {} worker(s). Press Ctrl+C to stop.", handles.len());

    tokio::signal::ctrl_c().await?;
    println!("\nStopping workers...");
    store.set_config(queue_core::config::KEY_SHUTDOWN_FLAG, "1")?;

    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}

fn cmd_dlq_list(store: &Arc<dyn Store>) -> Result<()> {
    for entry in store.list_dlq()? {
        println!("{}", serde_json::to_string(&entry)?);
    }
    Ok(())
}

fn cmd_dlq_retry(store: &Arc<dyn Store>, job_id: &str) -> Result<()> {
    store.requeue_dlq(job_id)?;
    println!("Requeued DLQ job {job_id}");
    Ok(())
}
