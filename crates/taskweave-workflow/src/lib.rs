//! Task state machine and scheduler for taskweave workflows.

pub mod choice;
pub mod collect;
pub mod kind;
pub mod mapper;
pub mod pool;
pub mod registry;
pub mod scheduler;
pub mod schema;
pub mod session;
pub mod start;
pub mod workflow;

pub use kind::TaskKind;
pub use pool::TokioWorkerPool;
pub use registry::TaskRegistry;
pub use scheduler::{FailureHandler, RunSummary, TaskCanceller, WorkflowRunner};
pub use schema::TaskSchema;
pub use workflow::Workflow;
