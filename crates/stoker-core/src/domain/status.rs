//! Task lifecycle states.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a submitted task.
///
/// State transitions:
/// - Pending -> Running -> Completed
/// - Pending -> Running -> Failed
/// - Pending | Running -> Cancelled (only while the work has not launched
///   in a worker process)
///
/// Transitions are monotonic: a terminal state never changes again, and
/// Running never returns to Pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Submitted and waiting in the category FIFO.
    Pending,

    /// Handed to the worker pool (executing, or waiting for a pool slot).
    Running,

    /// Finished successfully; `result` is populated.
    Completed,

    /// The worker reported a failure; `error` and `trace` are populated.
    Failed,

    /// Cancelled before the work launched.
    Cancelled,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::completed(TaskStatus::Completed)]
    #[case::failed(TaskStatus::Failed)]
    #[case::cancelled(TaskStatus::Cancelled)]
    fn terminal_states_are_terminal(#[case] status: TaskStatus) {
        assert!(status.is_terminal());
    }

    #[rstest]
    #[case::pending(TaskStatus::Pending)]
    #[case::running(TaskStatus::Running)]
    fn live_states_are_not_terminal(#[case] status: TaskStatus) {
        assert!(!status.is_terminal());
    }

    #[test]
    fn serializes_as_lowercase_strings() {
        let s = serde_json::to_string(&TaskStatus::Pending).unwrap();
        assert_eq!(s, "\"pending\"");

        let s = serde_json::to_string(&TaskStatus::Cancelled).unwrap();
        assert_eq!(s, "\"cancelled\"");
    }
}
