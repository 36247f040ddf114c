//! Category-scoped task queue: FIFO dispatch into a bounded pool of
//! isolated workers.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::domain::{TaskId, TaskOutcome, TaskRecord, TaskUpdate, WorkSpec};
use crate::error::Error;
use crate::executor::WorkExecutor;
use crate::registry::TaskRegistry;

// Launch state of a dispatched task. Exactly one compare-exchange decides
// the cancel race: either the execution flips Waiting -> Started and the
// work runs, or cancel_task flips Waiting -> Cancelled and it never does.
const LAUNCH_WAITING: u8 = 0;
const LAUNCH_STARTED: u8 = 1;
const LAUNCH_CANCELLED: u8 = 2;

/// One item in the pending FIFO.
struct PendingTask {
    id: TaskId,
    spec: WorkSpec,
}

/// A dispatched task: its launch state plus the execution join handle.
///
/// `join` is `None` while the task is still waiting for a pool slot; the
/// entry exists from the moment of dispatch so cancellation can reach it.
struct InFlight {
    launch: Arc<AtomicU8>,
    join: Option<JoinHandle<()>>,
}

/// Message from an execution task to the result collector.
///
/// `outcome` is `None` when the task was cancelled before launch: the record
/// was already finalized by `cancel_task` and only the in-flight entry needs
/// cleanup.
struct Completion {
    id: TaskId,
    outcome: Option<TaskOutcome>,
}

/// Receivers handed to the dispatch and collector loops on `start`.
struct Startup {
    pending_rx: mpsc::UnboundedReceiver<PendingTask>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
}

struct Loops {
    dispatch: JoinHandle<()>,
    collector: JoinHandle<()>,
}

/// A queue that moves pending work of one category into a bounded pool of
/// isolated workers.
///
/// Design:
/// - The pending FIFO and the in-flight map are owned by this queue; the
///   registry is the only shared-write structure and is accessed through
///   its own lock.
/// - Two loops per queue: dispatch (FIFO -> pool) and a result collector
///   draining an explicit completion channel, so registry mutation happens
///   on a known task rather than an opaque callback thread.
/// - A semaphore bounds concurrent executions to `max_concurrency`. The
///   dispatch loop itself acquires the slot before spawning the execution,
///   so pool entry follows submission order: only one serial actor ever
///   lines up for the semaphore.
pub struct TaskQueue {
    category: String,
    max_concurrency: usize,
    registry: Arc<TaskRegistry>,
    executor: Arc<dyn WorkExecutor>,
    artifact_root: PathBuf,
    shutdown_grace: Duration,

    semaphore: Arc<Semaphore>,
    /// `None` once the queue has been stopped; submissions then fail fast.
    pending_tx: Mutex<Option<mpsc::UnboundedSender<PendingTask>>>,
    inflight: Arc<Mutex<HashMap<TaskId, InFlight>>>,
    shutdown_tx: watch::Sender<bool>,
    startup: Mutex<Option<Startup>>,
    loops: Mutex<Option<Loops>>,
}

impl TaskQueue {
    pub(crate) fn new(
        category: String,
        max_concurrency: usize,
        registry: Arc<TaskRegistry>,
        executor: Arc<dyn WorkExecutor>,
        artifact_root: PathBuf,
        shutdown_grace: Duration,
    ) -> Arc<Self> {
        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);

        Arc::new(Self {
            category,
            max_concurrency,
            registry,
            executor,
            artifact_root,
            shutdown_grace,
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            pending_tx: Mutex::new(Some(pending_tx)),
            inflight: Arc::new(Mutex::new(HashMap::new())),
            shutdown_tx,
            startup: Mutex::new(Some(Startup {
                pending_rx,
                completion_tx,
                completion_rx,
            })),
            loops: Mutex::new(None),
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Launch the dispatch and collector loops. Idempotent while running;
    /// a stopped queue cannot be restarted.
    pub fn start(&self) {
        let mut loops = self.loops.lock().unwrap();
        if loops.is_some() {
            return;
        }
        let Some(startup) = self.startup.lock().unwrap().take() else {
            return;
        };

        let dispatch = tokio::spawn(dispatch_loop(
            self.category.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.executor),
            self.artifact_root.clone(),
            Arc::clone(&self.semaphore),
            Arc::clone(&self.inflight),
            startup.completion_tx,
            startup.pending_rx,
            self.shutdown_tx.subscribe(),
        ));
        let collector = tokio::spawn(collector_loop(
            self.category.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.inflight),
            startup.completion_rx,
        ));
        *loops = Some(Loops {
            dispatch,
            collector,
        });
        info!(category = %self.category, max_concurrency = self.max_concurrency, "queue started");
    }

    /// Submit a unit of work.
    ///
    /// Creates a Pending record in the registry, appends to the FIFO and
    /// returns immediately; submission never blocks on execution. `name` and
    /// `description` default to values derived from the work spec.
    pub fn add_task(
        &self,
        spec: WorkSpec,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<TaskId, Error> {
        // Holding the sender lock serializes submitters, so FIFO order and
        // registry insertion order agree.
        let pending_tx = self.pending_tx.lock().unwrap();
        let Some(pending_tx) = pending_tx.as_ref() else {
            return Err(Error::QueueStopped(self.category.clone()));
        };

        let id = TaskId::generate();
        let name = name.unwrap_or_else(|| spec.program.clone());
        let description = description
            .unwrap_or_else(|| format!("Task {} in {}", spec.program, self.category));
        let record = TaskRecord::pending(id, name, description, &self.category, spec.clone());
        self.registry.add(record);

        if pending_tx.send(PendingTask { id, spec }).is_err() {
            // Only possible if the dispatch loop died outside of stop().
            warn!(category = %self.category, task_id = %id, "pending channel closed; task will not run");
        } else {
            info!(category = %self.category, task_id = %id, "task added");
        }
        Ok(id)
    }

    /// Best-effort cancellation.
    ///
    /// Returns true and marks the record Cancelled only if the work had not
    /// yet launched in a worker. Returns false, leaving the record
    /// untouched, for an unknown id, an already-terminal task or one whose
    /// execution already started.
    pub fn cancel_task(&self, id: TaskId) -> bool {
        let inflight = self.inflight.lock().unwrap();
        let Some(entry) = inflight.get(&id) else {
            return false;
        };
        let won = entry
            .launch
            .compare_exchange(
                LAUNCH_WAITING,
                LAUNCH_CANCELLED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if won {
            self.registry.update(id, TaskUpdate::cancelled());
            info!(category = %self.category, task_id = %id, "task cancelled");
        }
        won
    }

    /// Stop the queue.
    ///
    /// Signals the dispatch loop, joins it within the grace period, then
    /// shuts the pool down: `wait = true` blocks until in-flight work has
    /// completed and every completion has been applied to the registry;
    /// `wait = false` aborts in-flight executions (their child processes are
    /// killed and their records stay as they were). Items still in the
    /// pending FIFO are abandoned as Pending either way, and a dispatched
    /// item still waiting for a pool slot is abandoned as Running.
    pub async fn stop(&self, wait: bool) {
        // Refuse new submissions first.
        self.pending_tx.lock().unwrap().take();
        let _ = self.shutdown_tx.send(true);

        let Some(Loops {
            mut dispatch,
            collector,
        }) = self.loops.lock().unwrap().take()
        else {
            return;
        };

        if tokio::time::timeout(self.shutdown_grace, &mut dispatch)
            .await
            .is_err()
        {
            warn!(category = %self.category, "dispatch loop ignored shutdown; aborting it");
            dispatch.abort();
        }

        let inflight: Vec<InFlight> = {
            let mut map = self.inflight.lock().unwrap();
            map.drain().map(|(_, entry)| entry).collect()
        };
        if wait {
            for entry in inflight {
                if let Some(join) = entry.join {
                    let _ = join.await;
                }
            }
        } else {
            for entry in inflight {
                if let Some(join) = entry.join {
                    join.abort();
                }
            }
        }

        // Every completion sender is gone once dispatch and the executions
        // are done; the collector drains what is buffered and exits.
        let _ = collector.await;
        info!(category = %self.category, wait, "queue stopped");
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("category", &self.category)
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}

/// Moves pending items into the worker pool in submission order.
///
/// The loop observes the shutdown signal between items via `select`, and a
/// fault dispatching one item is logged without terminating the loop.
#[allow(clippy::too_many_arguments)]
async fn dispatch_loop(
    category: String,
    registry: Arc<TaskRegistry>,
    executor: Arc<dyn WorkExecutor>,
    artifact_root: PathBuf,
    semaphore: Arc<Semaphore>,
    inflight: Arc<Mutex<HashMap<TaskId, InFlight>>>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    mut pending_rx: mpsc::UnboundedReceiver<PendingTask>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let item = tokio::select! {
            _ = shutdown_rx.changed() => continue,
            item = pending_rx.recv() => item,
        };
        let Some(PendingTask { id, spec }) = item else {
            // All senders dropped.
            break;
        };

        if completion_tx.is_closed() {
            error!(category = %category, task_id = %id, "result collector is gone; dropping task and continuing");
            continue;
        }

        registry.update(id, TaskUpdate::running());

        let launch = Arc::new(AtomicU8::new(LAUNCH_WAITING));
        inflight.lock().unwrap().insert(
            id,
            InFlight {
                launch: Arc::clone(&launch),
                join: None,
            },
        );

        // The pool slot is acquired here, on the single dispatch actor, so
        // tasks line up for the semaphore in submission order. This wait is
        // also the cancellation window.
        let permit = tokio::select! {
            _ = shutdown_rx.changed() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => {
                let Ok(permit) = permit else { break };
                permit
            }
        };

        let artifact_dir = artifact_root.join(id.to_string());
        let join = tokio::spawn(execute_task(
            id,
            spec,
            Arc::clone(&executor),
            artifact_dir,
            permit,
            Arc::clone(&launch),
            completion_tx.clone(),
        ));
        // The execution may already be collected; a missing entry is fine.
        if let Some(entry) = inflight.lock().unwrap().get_mut(&id) {
            entry.join = Some(join);
        }
    }
    info!(category = %category, "dispatch loop exited");
}

/// One pooled execution: settle the cancel race, run, always report.
async fn execute_task(
    id: TaskId,
    spec: WorkSpec,
    executor: Arc<dyn WorkExecutor>,
    artifact_dir: PathBuf,
    permit: OwnedSemaphorePermit,
    launch: Arc<AtomicU8>,
    completion_tx: mpsc::UnboundedSender<Completion>,
) {
    // The dispatch loop acquired the permit; holding it here keeps the pool
    // slot occupied for the lifetime of the execution.
    let _permit = permit;

    if launch
        .compare_exchange(
            LAUNCH_WAITING,
            LAUNCH_STARTED,
            Ordering::AcqRel,
            Ordering::Acquire,
        )
        .is_err()
    {
        // Lost to cancel_task; the record is already Cancelled.
        let _ = completion_tx.send(Completion { id, outcome: None });
        return;
    }

    // A panicking executor must still produce a completion, or the record
    // would sit at Running forever.
    let outcome = match AssertUnwindSafe(executor.execute(id, &spec, &artifact_dir))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "opaque panic payload".to_string());
            let error = format!("worker panicked: {message}");
            TaskOutcome::failed(error.clone(), error)
        }
    };
    if completion_tx
        .send(Completion {
            id,
            outcome: Some(outcome),
        })
        .is_err()
    {
        warn!(task_id = %id, "result collector gone; completion dropped");
    }
}

/// Applies completions to the registry and cleans up in-flight entries.
///
/// Removal happens on every path through the loop body, so a handled
/// completion can never leave a stale in-flight entry behind.
async fn collector_loop(
    category: String,
    registry: Arc<TaskRegistry>,
    inflight: Arc<Mutex<HashMap<TaskId, InFlight>>>,
    mut completion_rx: mpsc::UnboundedReceiver<Completion>,
) {
    while let Some(Completion { id, outcome }) = completion_rx.recv().await {
        match outcome {
            Some(TaskOutcome::Completed { result }) => {
                registry.update(id, TaskUpdate::completed(result));
                info!(category = %category, task_id = %id, "task completed");
            }
            Some(TaskOutcome::Failed { error: err, trace }) => {
                error!(category = %category, task_id = %id, error = %err, "task failed");
                registry.update(id, TaskUpdate::failed(err, trace));
            }
            // Cancelled before launch; cancel_task finalized the record.
            None => {}
        }
        inflight.lock().unwrap().remove(&id);
    }
}
