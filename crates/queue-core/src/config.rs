//! Typed view over the Store's `config` key/value table, plus the
//! layered loader (`queuectl` uses this to fold defaults, an optional
//! `queue.toml`, and `QUEUECTL_*` env vars into one struct before the
//! values are seeded into the database).

use serde::Deserialize;
use std::collections::HashMap;

/// Config keys as stored, in string form, in the Store's `config` table.
pub const KEY_BACKOFF_BASE: &str = "backoff_base";
pub const KEY_DEFAULT_MAX_RETRIES: &str = "default_max_retries";
pub const KEY_POLL_INTERVAL_SECONDS: &str = "poll_interval_seconds";
pub const KEY_SHUTDOWN_FLAG: &str = "shutdown_flag";
pub const KEY_JOB_TIMEOUT_SECONDS: &str = "job_timeout_seconds";
pub const KEY_LOG_DIR: &str = "log_dir";

/// Typed defaults for every config key. `shutdown_flag` is intentionally
/// absent here: it is runtime-only and always seeded as `"0"` by the
/// Store on first open, never settable from a file or environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub backoff_base: i64,
    pub default_max_retries: i64,
    pub poll_interval_seconds: u64,
    pub job_timeout_seconds: i64,
    pub log_dir: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            backoff_base: 2,
            default_max_retries: 3,
            poll_interval_seconds: 1,
            job_timeout_seconds: 0,
            log_dir: "logs".to_string(),
        }
    }
}

impl QueueConfig {
    /// Fold a parsed `queue.toml` over the defaults.
    pub fn merge_file(mut self, file: QueueConfig) -> Self {
        let defaults = QueueConfig::default();
        if file.backoff_base != defaults.backoff_base {
            self.backoff_base = file.backoff_base;
        }
        if file.default_max_retries != defaults.default_max_retries {
            self.default_max_retries = file.default_max_retries;
        }
        if file.poll_interval_seconds != defaults.poll_interval_seconds {
            self.poll_interval_seconds = file.poll_interval_seconds;
        }
        if file.job_timeout_seconds != defaults.job_timeout_seconds {
            self.job_timeout_seconds = file.job_timeout_seconds;
        }
        if file.log_dir != defaults.log_dir {
            self.log_dir = file.log_dir;
        }
        self
    }

    /// Fold `QUEUECTL_*` environment variables over the current values.
    /// Unset or unparsable variables are left untouched.
    pub fn merge_env(mut self, env: &HashMap<String, String>) -> Self {
        if let Some(v) = env.get("QUEUECTL_BACKOFF_BASE").and_then(|v| v.parse().ok()) {
            self.backoff_base = v;
        }
        if let Some(v) = env.get("QUEUECTL_DEFAULT_MAX_RETRIES").and_then(|v| v.parse().ok()) {
            self.default_max_retries = v;
        }
        if let Some(v) = env.get("QUEUECTL_POLL_INTERVAL_SECONDS").and_then(|v| v.parse().ok()) {
            self.poll_interval_seconds = v;
        }
        if let Some(v) = env.get("QUEUECTL_JOB_TIMEOUT_SECONDS").and_then(|v| v.parse().ok()) {
            self.job_timeout_seconds = v;
        }
        if let Some(v) = env.get("QUEUECTL_LOG_DIR") {
            self.log_dir = v.clone();
        }
        self
    }

    /// Render as the string key/value pairs the Store persists.
    pub fn as_kv(&self) -> Vec<(&'static str, String)> {
        vec![
            (KEY_BACKOFF_BASE, self.backoff_base.to_string()),
            (KEY_DEFAULT_MAX_RETRIES, self.default_max_retries.to_string()),
            (KEY_POLL_INTERVAL_SECONDS, self.poll_interval_seconds.to_string()),
            (KEY_JOB_TIMEOUT_SECONDS, self.job_timeout_seconds.to_string()),
            (KEY_LOG_DIR, self.log_dir.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_override_wins_over_default() {
        let base = QueueConfig::default();
        let file = QueueConfig { backoff_base: 4, ..QueueConfig::default() };
        let merged = base.merge_file(file);
        assert_eq!(merged.backoff_base, 4);
        assert_eq!(merged.default_max_retries, 3);
    }

    #[test]
    fn env_override_wins_over_file() {
        let mut env = HashMap::new();
        env.insert("QUEUECTL_LOG_DIR".to_string(), "/var/log/queue".to_string());
        let merged = QueueConfig::default().merge_env(&env);
        assert_eq!(merged.log_dir, "/var/log/queue");
    }

    #[test]
    fn shutdown_flag_has_no_settable_key() {
        let kv = QueueConfig::default().as_kv();
        assert!(kv.iter().all(|(k, _)| *k != KEY_SHUTDOWN_FLAG));
    }
}
