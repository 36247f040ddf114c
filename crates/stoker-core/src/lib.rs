//! stoker-core
//!
//! Background-job execution engine: a shared task registry plus
//! category-scoped queues that dispatch submitted work to a bounded pool of
//! process-isolated workers, track lifecycle status and support best-effort
//! cancellation.
//!
//! # Modules
//! - **domain**: task ids, statuses, records and work descriptions
//! - **registry**: the shared, lock-guarded record store
//! - **executor**: the execution seam and its process-isolated implementation
//! - **queue**: per-category FIFO dispatch into the bounded worker pool
//! - **factory**: queue lifecycle and orderly shutdown
//! - **config / error**: engine configuration and the synchronous error
//!   surface

pub mod config;
pub mod domain;
pub mod error;
pub mod executor;
pub mod factory;
pub mod queue;
pub mod registry;

pub use config::Config;
pub use domain::{TaskId, TaskOutcome, TaskRecord, TaskStatus, TaskUpdate, WorkSpec};
pub use error::Error;
pub use executor::{ProcessExecutor, WorkExecutor};
pub use factory::QueueFactory;
pub use queue::TaskQueue;
pub use registry::TaskRegistry;
