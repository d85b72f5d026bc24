use thiserror::Error;

use crate::types::NodeId;

#[derive(Debug, Error)]
pub enum TaskweaveError {
    // Task definition errors
    #[error("Task validation failed: {0}")]
    Validation(String),

    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("Ambiguous ORM mapping for node {node}: {count} patterns match")]
    AmbiguousMapping { node: NodeId, count: usize },

    #[error("Task status not supported: {0}")]
    InvalidStatus(String),

    // Graph reference errors
    #[error("Node {0} not in graph")]
    UnknownNode(NodeId),

    #[error("Edge ({0}, {1}) not in graph")]
    UnknownEdge(NodeId, NodeId),

    // Algorithm errors
    #[error("Node {goal} unreachable from node {start}")]
    Unreachable { start: NodeId, goal: NodeId },

    // Execution errors
    #[error("Mapper task {node}: {message}")]
    MapperInput { node: NodeId, message: String },

    #[error("Task {node} failed: {message}")]
    TaskExecution { node: NodeId, message: String },

    #[error("Workflow run cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TaskweaveError {
    /// Shorthand for a failure raised inside a task body.
    pub fn execution(node: NodeId, message: impl Into<String>) -> Self {
        Self::TaskExecution {
            node,
            message: message.into(),
        }
    }

    /// Errors caused by the workflow definition rather than by a task run.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::UnknownTaskType(_)
                | Self::AmbiguousMapping { .. }
                | Self::InvalidStatus(_)
                | Self::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TaskweaveError>;
