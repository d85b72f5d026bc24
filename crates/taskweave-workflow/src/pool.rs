use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tracing::debug;

use taskweave_core::error::{Result, TaskweaveError};
use taskweave_core::traits::{TaskFn, WorkerPool};
use taskweave_core::types::{Attributes, TaskInput};

/// Worker pool on tokio's blocking threads, bounded by a semaphore.
///
/// Jobs start when the returned future is first polled.
pub struct TokioWorkerPool {
    permits: Arc<Semaphore>,
}

impl TokioWorkerPool {
    pub fn new(worker_threads: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(worker_threads.max(1))),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl WorkerPool for TokioWorkerPool {
    fn submit(&self, runner: TaskFn, input: TaskInput) -> BoxFuture<'static, Result<Attributes>> {
        let permits = Arc::clone(&self.permits);
        let node = input.node_id;
        Box::pin(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| TaskweaveError::Cancelled)?;
            debug!(node_id = node, "Worker picked up task");
            match tokio::task::spawn_blocking(move || runner(input)).await {
                Ok(result) => result,
                Err(e) if e.is_panic() => Err(TaskweaveError::execution(node, "task body panicked")),
                Err(_) => Err(TaskweaveError::execution(node, "worker was shut down")),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskweave_core::types::WorkflowSession;

    fn input(node_id: u64) -> TaskInput {
        TaskInput {
            node_id,
            data: Attributes::new(),
            session: WorkflowSession::new("t", "taskweave"),
        }
    }

    #[tokio::test]
    async fn test_runs_task_body() {
        let pool = TokioWorkerPool::new(2);
        let runner: TaskFn = Arc::new(|input: TaskInput| -> Result<Attributes> {
            let mut out = Attributes::new();
            out.insert("node".into(), json!(input.node_id));
            Ok(out)
        });
        let out = pool.submit(runner, input(5)).await.unwrap();
        assert_eq!(out["node"], json!(5));
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_panic_becomes_execution_error() {
        let pool = TokioWorkerPool::new(1);
        let runner: TaskFn = Arc::new(|_: TaskInput| -> Result<Attributes> { panic!("boom") });
        let err = pool.submit(runner, input(3)).await.unwrap_err();
        assert!(matches!(err, TaskweaveError::TaskExecution { node: 3, .. }));
    }

    #[test]
    fn test_zero_threads_still_runs() {
        assert_eq!(TokioWorkerPool::new(0).available(), 1);
    }
}
