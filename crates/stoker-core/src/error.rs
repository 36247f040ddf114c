//! Engine error types.

use thiserror::Error;

/// Errors surfaced synchronously by configuration and lifecycle calls.
///
/// Worker failures never appear here: they are recorded on the task record
/// (`error`, `trace`) and observed by polling the registry. A failed
/// cancellation is a `false` return, not an error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("queue with category '{0}' already exists")]
    QueueExists(String),

    #[error("queue '{0}' is stopped and no longer accepts tasks")]
    QueueStopped(String),
}
