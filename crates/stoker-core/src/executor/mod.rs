//! Worker execution seam.

mod process;

pub use process::ProcessExecutor;

use std::path::Path;

use async_trait::async_trait;

use crate::domain::{TaskId, TaskOutcome, WorkSpec};

/// Executes one unit of work in isolation.
///
/// The production implementation runs work in a separate OS process
/// ([`ProcessExecutor`]); tests swap in in-process doubles. This trait is the
/// seam that keeps the queue independent of how work actually runs.
///
/// Contract: implementations convert every fault into
/// [`TaskOutcome::Failed`]; nothing a task body does may reach the dispatch
/// loop as an error or a panic.
#[async_trait]
pub trait WorkExecutor: Send + Sync {
    /// Run `spec` to completion, writing captured output under
    /// `artifact_dir` (created lazily).
    async fn execute(&self, id: TaskId, spec: &WorkSpec, artifact_dir: &Path) -> TaskOutcome;
}
