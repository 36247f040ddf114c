//! Shared task registry.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::domain::{TaskId, TaskRecord, TaskStatus, TaskUpdate};

/// Thread-safe map of task id -> record, shared by every queue.
///
/// Design:
/// - One mutex guards all reads and writes; each method takes and releases
///   it within the call, so reads are point-in-time snapshots and a single
///   `update` is indivisible.
/// - Lifecycle is process-wide: the factory creates it once and it lives
///   until application shutdown. Nothing is persisted across restarts.
#[derive(Default)]
pub struct TaskRegistry {
    records: Mutex<HashMap<TaskId, TaskRecord>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record keyed by its id.
    ///
    /// Uniqueness is guaranteed by the id generation scheme, so an existing
    /// entry is simply replaced.
    pub fn add(&self, record: TaskRecord) {
        self.records.lock().unwrap().insert(record.id, record);
    }

    /// Merge `update` into the record for `id` as one indivisible operation.
    ///
    /// An unknown id is a silent no-op: queues only update records they
    /// created, so a miss means the record was already cleared.
    pub fn update(&self, id: TaskId, update: TaskUpdate) {
        if let Some(record) = self.records.lock().unwrap().get_mut(&id) {
            record.apply(update);
        }
    }

    /// Snapshot of one record.
    pub fn get(&self, id: TaskId) -> Option<TaskRecord> {
        self.records.lock().unwrap().get(&id).cloned()
    }

    /// Snapshot of all records.
    pub fn list_all(&self) -> Vec<TaskRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }

    /// Snapshot of the records belonging to one category.
    pub fn list_by_category(&self, category: &str) -> Vec<TaskRecord> {
        self.records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.category == category)
            .cloned()
            .collect()
    }

    /// Snapshot of the records currently in `status`.
    pub fn list_by_status(&self, status: TaskStatus) -> Vec<TaskRecord> {
        self.records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect()
    }

    /// Remove Completed records, optionally only those that completed before
    /// `older_than`. Returns the number removed.
    ///
    /// Failed and Cancelled records are left untouched.
    pub fn clear_completed(&self, older_than: Option<DateTime<Utc>>) -> usize {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|_, record| {
            if record.status != TaskStatus::Completed {
                return true;
            }
            match older_than {
                None => false,
                Some(cutoff) => !record.completed_at.is_some_and(|t| t < cutoff),
            }
        });
        before - records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WorkSpec;
    use chrono::Duration;

    fn record(category: &str) -> TaskRecord {
        TaskRecord::pending(
            TaskId::generate(),
            "probe",
            "a test task",
            category,
            WorkSpec::new("true"),
        )
    }

    fn terminal(category: &str, update: TaskUpdate) -> TaskRecord {
        let mut r = record(category);
        r.apply(TaskUpdate::running());
        r.apply(update);
        r
    }

    #[test]
    fn add_then_get_roundtrips() {
        let registry = TaskRegistry::new();
        let r = record("default");
        let id = r.id;
        registry.add(r);

        let fetched = registry.get(id).unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.status, TaskStatus::Pending);
        assert!(registry.get(TaskId::generate()).is_none());
    }

    #[test]
    fn update_merges_fields_atomically() {
        let registry = TaskRegistry::new();
        let r = record("default");
        let id = r.id;
        registry.add(r);

        registry.update(id, TaskUpdate::running());
        let fetched = registry.get(id).unwrap();
        assert_eq!(fetched.status, TaskStatus::Running);
        assert!(fetched.started_at.is_some());
        assert!(fetched.completed_at.is_none());
    }

    #[test]
    fn update_of_unknown_id_is_a_no_op() {
        let registry = TaskRegistry::new();
        registry.update(TaskId::generate(), TaskUpdate::running());
        assert!(registry.list_all().is_empty());
    }

    #[test]
    fn listing_filters_by_category_and_status() {
        let registry = TaskRegistry::new();
        registry.add(record("alpha"));
        registry.add(record("alpha"));
        registry.add(record("beta"));
        registry.add(terminal("beta", TaskUpdate::failed("boom", "trace")));

        assert_eq!(registry.list_all().len(), 4);
        assert_eq!(registry.list_by_category("alpha").len(), 2);
        assert_eq!(registry.list_by_category("beta").len(), 2);
        assert_eq!(registry.list_by_status(TaskStatus::Pending).len(), 3);
        assert_eq!(registry.list_by_status(TaskStatus::Failed).len(), 1);
        assert!(registry.list_by_status(TaskStatus::Running).is_empty());
    }

    #[test]
    fn clear_completed_spares_failed_and_cancelled() {
        let registry = TaskRegistry::new();
        registry.add(record("default"));
        registry.add(terminal(
            "default",
            TaskUpdate::completed(serde_json::json!({})),
        ));
        registry.add(terminal(
            "default",
            TaskUpdate::completed(serde_json::json!({})),
        ));
        registry.add(terminal("default", TaskUpdate::failed("boom", "trace")));
        registry.add(terminal("default", TaskUpdate::cancelled()));

        let removed = registry.clear_completed(None);
        assert_eq!(removed, 2);

        let left = registry.list_all();
        assert_eq!(left.len(), 3);
        assert!(
            left.iter()
                .all(|r| r.status != TaskStatus::Completed)
        );
    }

    #[test]
    fn clear_completed_honors_cutoff() {
        let registry = TaskRegistry::new();
        let mut old = terminal("default", TaskUpdate::completed(serde_json::json!({})));
        old.completed_at = Some(Utc::now() - Duration::hours(2));
        let fresh = terminal("default", TaskUpdate::completed(serde_json::json!({})));
        registry.add(old);
        registry.add(fresh);

        let removed = registry.clear_completed(Some(Utc::now() - Duration::hours(1)));
        assert_eq!(removed, 1);
        assert_eq!(registry.list_all().len(), 1);
    }
}
