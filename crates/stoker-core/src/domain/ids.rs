//! Task identifiers.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifier of one submitted task.
///
/// ULID-backed: 48 bits of wall-clock milliseconds plus 80 random bits, so
/// ids are generated without coordination, collide with negligible
/// probability, and sort by submission time.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Ulid);

impl TaskId {
    /// Generate a fresh id for a newly submitted task.
    pub fn generate() -> Self {
        let timestamp_ms = Utc::now().timestamp_millis() as u64;
        Self(Ulid::from_parts(timestamp_ms, rand::random()))
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for TaskId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}
