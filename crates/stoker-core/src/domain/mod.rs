//! Domain model (ids, statuses, records, work descriptions).

pub mod ids;
pub mod record;
pub mod status;
pub mod work;

pub use self::ids::TaskId;
pub use self::record::{TaskRecord, TaskUpdate};
pub use self::status::TaskStatus;
pub use self::work::{TaskOutcome, WorkSpec};
