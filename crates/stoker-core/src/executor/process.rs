//! Process-isolated execution of work specs.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::WorkExecutor;
use crate::domain::{TaskId, TaskOutcome, WorkSpec};

/// Captured-stdout artifact inside a task's directory.
pub const STDOUT_LOG: &str = "stdout.log";

/// Captured-stderr artifact inside a task's directory.
pub const STDERR_LOG: &str = "stderr.log";

/// Failure artifact: `{"error": ..., "trace": ...}` written on any fault.
pub const EXCEPTION_LOG: &str = "exception.json";

/// How much of the captured stderr is quoted back into a failure trace.
const TRACE_TAIL_BYTES: usize = 8 * 1024;

/// Runs each task as a child process with stdout/stderr redirected to
/// per-task artifact files.
///
/// Isolation is structural: a crash, a non-zero exit or resource misuse in
/// the task body is contained in the child and reported as a `Failed`
/// outcome, never as an error from `execute`. The artifact directory is
/// written only by the single execution for that task, so no locking is
/// needed around it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, spec: &WorkSpec, dir: &Path) -> std::io::Result<TaskOutcome> {
        tokio::fs::create_dir_all(dir).await?;

        let stdout_path = dir.join(STDOUT_LOG);
        let stderr_path = dir.join(STDERR_LOG);
        let stdout_file = std::fs::File::create(&stdout_path)?;
        let stderr_file = std::fs::File::create(&stderr_path)?;

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(if spec.payload.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::from(stderr_file))
            // Abandoned work must not orphan children.
            .kill_on_drop(true);

        let mut child = command.spawn()?;

        if let Some(payload) = &spec.payload
            && let Some(mut stdin) = child.stdin.take()
        {
            let bytes = serde_json::to_vec(payload)?;
            stdin.write_all(&bytes).await?;
            // Dropping the handle closes the pipe so the child sees EOF.
        }

        let status = child.wait().await?;
        if status.success() {
            Ok(TaskOutcome::completed(success_result(
                &stdout_path,
                &stderr_path,
            )))
        } else {
            let error = format!("process '{}' exited with {}", spec.program, status);
            let mut trace = read_tail(&stderr_path, TRACE_TAIL_BYTES).await;
            if trace.is_empty() {
                trace = error.clone();
            }
            Ok(TaskOutcome::failed(error, trace))
        }
    }
}

#[async_trait]
impl WorkExecutor for ProcessExecutor {
    async fn execute(&self, id: TaskId, spec: &WorkSpec, artifact_dir: &Path) -> TaskOutcome {
        let outcome = match self.run(spec, artifact_dir).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let error = format!("failed to launch '{}': {}", spec.program, e);
                debug!(task_id = %id, error = %error, "work execution fault");
                TaskOutcome::failed(error.clone(), error)
            }
        };

        if let TaskOutcome::Failed { error, trace } = &outcome {
            write_exception_log(artifact_dir, error, trace).await;
        }
        outcome
    }
}

fn success_result(stdout_path: &Path, stderr_path: &Path) -> serde_json::Value {
    json!({
        "exit_code": 0,
        "stdout_path": stdout_path,
        "stderr_path": stderr_path,
    })
}

async fn write_exception_log(dir: &Path, error: &str, trace: &str) {
    let path: PathBuf = dir.join(EXCEPTION_LOG);
    let body = json!({ "error": error, "trace": trace });
    // The directory may be missing if the fault was its own creation.
    let _ = tokio::fs::create_dir_all(dir).await;
    if let Err(e) = tokio::fs::write(&path, body.to_string()).await {
        warn!(path = %path.display(), error = %e, "could not write exception artifact");
    }
}

async fn read_tail(path: &Path, limit: usize) -> String {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let start = bytes.len().saturating_sub(limit);
            String::from_utf8_lossy(&bytes[start..]).into_owned()
        }
        Err(_) => String::new(),
    }
}
