//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Grace period granted to a dispatch loop to observe the shutdown signal.
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Engine configuration, deserializable from the host application's own
/// config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root under which every task gets an artifact directory named by its
    /// id, holding captured stdout/stderr and any exception log.
    pub artifact_root: PathBuf,

    /// How long `stop` waits for a dispatch loop before abandoning it.
    pub shutdown_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            artifact_root: std::env::temp_dir().join("stoker").join("tasks"),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}
