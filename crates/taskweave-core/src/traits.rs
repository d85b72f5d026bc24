use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{Attributes, TaskInput};

/// A task body: resolved input and session in, output data out.
pub type TaskFn = Arc<dyn Fn(TaskInput) -> Result<Attributes> + Send + Sync>;

/// A reducer applied by Collect over the ordered ancestor outputs.
pub type ReducerFn = Arc<dyn Fn(Vec<Attributes>) -> Result<Attributes> + Send + Sync>;

/// Worker pool — runs local task bodies off the coordinating loop.
pub trait WorkerPool: Send + Sync + 'static {
    /// Submit one task invocation. The returned future resolves with the
    /// task output once a worker has run it.
    fn submit(&self, runner: TaskFn, input: TaskInput) -> BoxFuture<'static, Result<Attributes>>;
}

/// Remote procedure dispatch for remote-execution tasks.
pub trait RemoteCaller: Send + Sync + 'static {
    /// Invoke the procedure registered under `uri`.
    fn call(&self, uri: &str, input: TaskInput) -> BoxFuture<'static, Result<Attributes>>;
}

/// Document validation against a schema.
pub trait DocumentValidator: Send + Sync {
    /// Fails with a validation error when `document` does not conform.
    fn validate(&self, document: &Attributes) -> Result<()>;
}
