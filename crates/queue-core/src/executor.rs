//! Runs a claimed job's command and captures its output to a log file.
//!
//! Mirrors the original prototype's `run_job`: the command is handed to
//! a shell, stdout and stderr are interleaved into one log file, and a
//! wall-clock timeout (when non-zero) kills the child rather than
//! waiting forever.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::Result;

/// Outcome of running a job's command.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub ok: bool,
    pub log_path: PathBuf,
}

/// Runs shell commands with an optional timeout, writing a log file per
/// attempt under `log_dir`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Executor;

impl Executor {
    /// Execute `command` under `sh -c`, logging to
    /// `<log_dir>/<job_id>__<unix_seconds>.log`. `timeout_seconds == 0`
    /// means no timeout, matching the config/job default.
    ///
    /// On normal completion writes `$ <command>\n\n<stdout>\n<stderr>\nExit:<rc>\n`;
    /// on timeout writes `[timeout] exceeded <T>s\n` and reports failure.
    pub fn run(
        &self,
        log_dir: &Path,
        job_id: &str,
        command: &str,
        timeout_seconds: i64,
        unix_seconds: i64,
    ) -> Result<ExecutionResult> {
        fs::create_dir_all(log_dir)?;
        let log_path = log_dir.join(format!("{job_id}__{unix_seconds}.log"));

        debug!(job_id, command, timeout_seconds, "spawning job command");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let ok = if timeout_seconds <= 0 {
            let output = child.wait_with_output()?;
            self.write_completion_log(&log_path, command, &output.stdout, &output.stderr, output.status.code())?;
            output.status.success()
        } else {
            match self.wait_with_timeout(&mut child, Duration::from_secs(timeout_seconds as u64))? {
                Some(status) => {
                    let mut stdout = Vec::new();
                    let mut stderr = Vec::new();
                    if let Some(mut out) = child.stdout.take() {
                        let _ = out.read_to_end(&mut stdout);
                    }
                    if let Some(mut err) = child.stderr.take() {
                        let _ = err.read_to_end(&mut stderr);
                    }
                    self.write_completion_log(&log_path, command, &stdout, &stderr, status.code())?;
                    status.success()
                }
                None => {
                    warn!(job_id, timeout_seconds, "job exceeded timeout, killing process");
                    let _ = child.kill();
                    let _ = child.wait();
                    fs::write(&log_path, format!("[timeout] exceeded {timeout_seconds}s\n"))?;
                    false
                }
            }
        };

        Ok(ExecutionResult { ok, log_path })
    }

    /// Poll `try_wait` until the child exits or the deadline passes.
    /// `Ok(None)` means the deadline passed with the child still running.
    fn wait_with_timeout(
        &self,
        child: &mut std::process::Child,
        timeout: Duration,
    ) -> Result<Option<std::process::ExitStatus>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    fn write_completion_log(
        &self,
        log_path: &Path,
        command: &str,
        stdout: &[u8],
        stderr: &[u8],
        rc: Option<i32>,
    ) -> Result<()> {
        let mut f = fs::File::create(log_path)?;
        write!(f, "$ {command}\n\n")?;
        f.write_all(stdout)?;
        writeln!(f)?;
        f.write_all(stderr)?;
        writeln!(f)?;
        writeln!(f, "Exit:{}", rc.unwrap_or(-1))?;
        Ok(())
    }
}
