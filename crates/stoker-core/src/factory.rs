//! Queue factory: creates, looks up and tears down category queues.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::config::Config;
use crate::error::Error;
use crate::executor::{ProcessExecutor, WorkExecutor};
use crate::queue::TaskQueue;
use crate::registry::TaskRegistry;

/// Owns the shared registry and every category queue.
///
/// The host application constructs one factory at startup and runs
/// [`QueueFactory::shutdown`] in its own teardown sequence; there is no
/// global instance and no exit hook.
pub struct QueueFactory {
    config: Config,
    registry: Arc<TaskRegistry>,
    executor: Arc<dyn WorkExecutor>,
    queues: Mutex<HashMap<String, Arc<TaskQueue>>>,
}

impl QueueFactory {
    /// Factory running work in isolated child processes.
    pub fn new(config: Config) -> Self {
        Self::with_executor(config, Arc::new(ProcessExecutor::new()))
    }

    /// Factory with a custom execution seam (tests use in-process doubles).
    pub fn with_executor(config: Config, executor: Arc<dyn WorkExecutor>) -> Self {
        Self {
            config,
            registry: Arc::new(TaskRegistry::new()),
            executor,
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// The registry shared by all queues, for status queries.
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Create and start a queue for a new category.
    ///
    /// Fails with [`Error::QueueExists`] if the category is already
    /// registered.
    pub async fn create_queue(
        &self,
        category: &str,
        max_concurrency: usize,
    ) -> Result<Arc<TaskQueue>, Error> {
        let mut queues = self.queues.lock().await;
        self.create_locked(&mut queues, category, max_concurrency)
    }

    /// Look up an existing queue.
    pub async fn get_queue(&self, category: &str) -> Option<Arc<TaskQueue>> {
        self.queues.lock().await.get(category).cloned()
    }

    /// Return the existing queue for `category`, or create one with
    /// `default_max_concurrency`. Idempotent.
    pub async fn get_or_create_queue(
        &self,
        category: &str,
        default_max_concurrency: usize,
    ) -> Result<Arc<TaskQueue>, Error> {
        let mut queues = self.queues.lock().await;
        if let Some(queue) = queues.get(category) {
            return Ok(Arc::clone(queue));
        }
        self.create_locked(&mut queues, category, default_max_concurrency)
    }

    /// All registered category names.
    pub async fn list_queues(&self) -> Vec<String> {
        self.queues.lock().await.keys().cloned().collect()
    }

    /// Stop and discard a queue. Returns false if the category was absent.
    pub async fn remove_queue(&self, category: &str, wait: bool) -> bool {
        let queue = self.queues.lock().await.remove(category);
        match queue {
            Some(queue) => {
                queue.stop(wait).await;
                info!(category, "queue removed");
                true
            }
            None => false,
        }
    }

    /// Stop every queue. Runs once at process teardown so no worker
    /// processes are orphaned.
    pub async fn shutdown(&self, wait: bool) {
        let queues: Vec<_> = {
            let mut map = self.queues.lock().await;
            map.drain().map(|(_, queue)| queue).collect()
        };
        for queue in queues {
            queue.stop(wait).await;
        }
        info!("all queues shut down");
    }

    fn create_locked(
        &self,
        queues: &mut HashMap<String, Arc<TaskQueue>>,
        category: &str,
        max_concurrency: usize,
    ) -> Result<Arc<TaskQueue>, Error> {
        if queues.contains_key(category) {
            return Err(Error::QueueExists(category.to_string()));
        }
        let queue = TaskQueue::new(
            category.to_string(),
            max_concurrency.max(1),
            Arc::clone(&self.registry),
            Arc::clone(&self.executor),
            self.config.artifact_root.clone(),
            self.config.shutdown_grace,
        );
        queue.start();
        queues.insert(category.to_string(), Arc::clone(&queue));
        info!(category, max_concurrency, "queue created");
        Ok(queue)
    }
}
