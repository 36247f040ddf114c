//! Work descriptions and execution outcomes.

use serde::{Deserialize, Serialize};

/// A unit of work that can be shipped across a process boundary.
///
/// Design:
/// - No in-memory closures: `program` is a resolvable executable identity
///   and the arguments are plain data, so a spec survives serialization and
///   can be launched by an isolated worker.
/// - `payload` carries structured keyword-style input; it is written to the
///   child's stdin as a single JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkSpec {
    pub program: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl WorkSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            payload: None,
        }
    }

    /// Append one positional argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Attach a JSON payload, delivered on the child's stdin.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Result of executing one task in a worker.
///
/// This is the only channel through which worker failures reach the engine:
/// an executor converts every fault into `Failed` instead of returning an
/// error or panicking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskOutcome {
    Completed { result: serde_json::Value },
    Failed { error: String, trace: String },
}

impl TaskOutcome {
    pub fn completed(result: serde_json::Value) -> Self {
        Self::Completed { result }
    }

    pub fn failed(error: impl Into<String>, trace: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
            trace: trace.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Completed { .. })
    }
}
