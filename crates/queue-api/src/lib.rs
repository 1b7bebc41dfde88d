//! Read-only HTTP control surface over a [`Store`], plus log fetch, DLQ
//! requeue and job delete — the six routes of `spec.md` §6, CORS-open for
//! an untrusted dashboard client.
//!
//! `Store` is synchronous; every handler bridges into it with
//! `spawn_blocking` rather than make the trait `async-trait`, since the
//! only implementation (SQLite) is blocking anyway (`SPEC_FULL.md` §9).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use queue_core::config::KEY_LOG_DIR;
use queue_core::model::JobFilter;
use queue_core::{QueueError, Store};

#[derive(Clone)]
struct AppState {
    store: Arc<dyn Store>,
}

/// Wraps [`QueueError`] so it can be returned directly from a handler;
/// maps per `spec.md` §7: `BadInput`->400, `NotFound`->404, else->500.
struct ApiError(QueueError);

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            QueueError::BadInput(_) => StatusCode::BAD_REQUEST,
            QueueError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Build the router. Exposed separately from [`serve`] so tests can drive
/// requests in-process without binding a socket.
pub fn router(store: Arc<dyn Store>) -> Router {
    let state = AppState { store };
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/:job_id", delete(delete_job))
        .route("/dlq", get(list_dlq))
        .route("/dlq/retry/:job_id", post(retry_dlq))
        .route("/logs/:job_id", get(get_log))
        .route("/status", get(get_status))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until the process is killed.
pub async fn serve(store: Arc<dyn Store>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(store);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "queue-api listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn list_jobs(State(state): State<AppState>) -> Result<Json<Vec<queue_core::Job>>, ApiError> {
    let store = state.store;
    let mut jobs = tokio::task::spawn_blocking(move || store.list_jobs(JobFilter::default()))
        .await
        .expect("blocking task panicked")?;
    jobs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Ok(Json(jobs))
}

async fn list_dlq(State(state): State<AppState>) -> Result<Json<Vec<queue_core::DlqEntry>>, ApiError> {
    let store = state.store;
    let entries = tokio::task::spawn_blocking(move || store.list_dlq()).await.expect("blocking task panicked")?;
    Ok(Json(entries))
}

async fn get_status(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let store = state.store;
    let status = tokio::task::spawn_blocking(move || store.status()).await.expect("blocking task panicked")?;
    Ok(Json(json_status(status)))
}

/// `spec.md` §6 specifies `{"workers": n, "jobs": {state: count, ...}}`,
/// distinct from `QueueStatus`'s flat field layout used internally.
fn json_status(status: queue_core::QueueStatus) -> serde_json::Value {
    json!({
        "workers": status.workers,
        "jobs": {
            "pending": status.pending,
            "processing": status.processing,
            "completed": status.completed,
            "failed": status.failed,
            "dead": status.dead,
        }
    })
}

async fn delete_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    let store = state.store;
    tokio::task::spawn_blocking(move || store.delete_job(&job_id))
        .await
        .expect("blocking task panicked")?;
    Ok(Json(json!({ "message": "deleted" })))
}

async fn retry_dlq(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    let store = state.store;
    tokio::task::spawn_blocking(move || store.requeue_dlq(&job_id))
        .await
        .expect("blocking task panicked")?;
    Ok(Json(json!({ "message": "requeued" })))
}

async fn get_log(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<String, ApiError> {
    let store = state.store;
    let log_dir =
        tokio::task::spawn_blocking(move || store.get_config(KEY_LOG_DIR)).await.expect("blocking task panicked")?;
    let log_dir = log_dir.unwrap_or_else(|| "logs".to_string());

    let path = tokio::task::spawn_blocking(move || latest_log_path(&log_dir, &job_id))
        .await
        .expect("blocking task panicked")?;

    let path = path.ok_or_else(|| ApiError(QueueError::NotFound("no log found for this job".to_string())))?;
    tokio::fs::read_to_string(path).await.map_err(|e| ApiError(QueueError::Io(e.to_string())))
}

/// Picks the lexically-latest `<job_id>__<unix_seconds>.log` file under
/// `log_dir`, matching the original's `sorted(glob(...), reverse=True)`.
fn latest_log_path(log_dir: &str, job_id: &str) -> Option<std::path::PathBuf> {
    let prefix = format!("{job_id}__");
    let mut matches: Vec<std::path::PathBuf> = std::fs::read_dir(log_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|name| name.starts_with(&prefix) && name.ends_with(".log"))
                .unwrap_or(false)
        })
        .collect();
    matches.sort();
    matches.pop()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use queue_testing::{job, MemoryStore};
    use tower::ServiceExt;

    #[tokio::test]
    async fn status_route_reports_counts() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        store.enqueue(job("a", "true")).unwrap();
        let app = router(store);

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn delete_missing_job_is_404() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let app = router(store);

        let response = app
            .oneshot(Request::builder().method("DELETE").uri("/jobs/ghost").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn retry_missing_dlq_entry_is_404() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let app = router(store);

        let response = app
            .oneshot(Request::builder().method("POST").uri("/dlq/retry/ghost").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn latest_log_picks_reverse_lexical_max() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a__100.log"), "old").unwrap();
        std::fs::write(dir.path().join("a__200.log"), "new").unwrap();
        let path = latest_log_path(dir.path().to_str().unwrap(), "a").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "new");
    }

    #[test]
    fn latest_log_returns_none_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(latest_log_path(dir.path().to_str().unwrap(), "ghost").is_none());
    }
}
