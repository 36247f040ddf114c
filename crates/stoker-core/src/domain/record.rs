//! Task record: immutable identity plus mutable lifecycle fields.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{TaskId, TaskStatus, WorkSpec};

/// Full lifecycle state of one submitted unit of work.
///
/// Design:
/// - The registry's copy is the single source of truth; queue structures
///   hold `TaskId` only.
/// - `created_at <= started_at <= completed_at` whenever both sides are set.
/// - Exactly one of `result` / (`error`, `trace`) is populated once the task
///   is terminal; neither is populated before that.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub name: String,
    pub description: String,
    pub category: String,
    pub spec: WorkSpec,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub trace: Option<String>,
}

impl TaskRecord {
    /// Create a Pending record for a newly submitted task.
    pub fn pending(
        id: TaskId,
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        spec: WorkSpec,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
            category: category.into(),
            spec,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            trace: None,
        }
    }

    /// Merge a partial update into this record.
    ///
    /// The registry applies each call as one unit under its lock; fields left
    /// `None` in the update are untouched.
    pub fn apply(&mut self, update: TaskUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(started_at) = update.started_at {
            self.started_at = Some(started_at);
        }
        if let Some(completed_at) = update.completed_at {
            self.completed_at = Some(completed_at);
        }
        if let Some(result) = update.result {
            self.result = Some(result);
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
        if let Some(trace) = update.trace {
            self.trace = Some(trace);
        }
    }
}

/// Partial-field update merged atomically by the registry.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub trace: Option<String>,
}

impl TaskUpdate {
    /// Pending -> Running, stamping `started_at`.
    pub fn running() -> Self {
        Self {
            status: Some(TaskStatus::Running),
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Running -> Completed, stamping `completed_at` and the result payload.
    pub fn completed(result: serde_json::Value) -> Self {
        Self {
            status: Some(TaskStatus::Completed),
            completed_at: Some(Utc::now()),
            result: Some(result),
            ..Self::default()
        }
    }

    /// Running -> Failed, stamping `completed_at`, `error` and `trace`.
    pub fn failed(error: impl Into<String>, trace: impl Into<String>) -> Self {
        Self {
            status: Some(TaskStatus::Failed),
            completed_at: Some(Utc::now()),
            error: Some(error.into()),
            trace: Some(trace.into()),
            ..Self::default()
        }
    }

    /// Pending | Running -> Cancelled, stamping `completed_at`.
    pub fn cancelled() -> Self {
        Self {
            status: Some(TaskStatus::Cancelled),
            completed_at: Some(Utc::now()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TaskRecord {
        TaskRecord::pending(
            TaskId::generate(),
            "probe",
            "a test task",
            "default",
            WorkSpec::new("true"),
        )
    }

    #[test]
    fn new_record_is_pending_with_no_outputs() {
        let record = record();
        assert_eq!(record.status, TaskStatus::Pending);
        assert!(record.started_at.is_none());
        assert!(record.completed_at.is_none());
        assert!(record.result.is_none());
        assert!(record.error.is_none());
        assert!(record.trace.is_none());
    }

    #[test]
    fn apply_leaves_unset_fields_untouched() {
        let mut record = record();
        record.apply(TaskUpdate::running());

        assert_eq!(record.status, TaskStatus::Running);
        assert!(record.started_at.is_some());
        assert!(record.completed_at.is_none());
        assert!(record.result.is_none());
    }

    #[test]
    fn completed_update_populates_result_only() {
        let mut record = record();
        record.apply(TaskUpdate::running());
        record.apply(TaskUpdate::completed(serde_json::json!({"exit_code": 0})));

        assert_eq!(record.status, TaskStatus::Completed);
        assert!(record.result.is_some());
        assert!(record.error.is_none());
        assert!(record.trace.is_none());
        assert!(record.created_at <= record.started_at.unwrap());
        assert!(record.started_at.unwrap() <= record.completed_at.unwrap());
    }

    #[test]
    fn failed_update_populates_error_and_trace_only() {
        let mut record = record();
        record.apply(TaskUpdate::running());
        record.apply(TaskUpdate::failed("boom", "trace line"));

        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.result.is_none());
        assert_eq!(record.error.as_deref(), Some("boom"));
        assert_eq!(record.trace.as_deref(), Some("trace line"));
    }
}
