use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TaskweaveError;

/// Node identifier, unique within the owning graph and never reused.
pub type NodeId = u64;

/// Free-form attribute mapping carried by every node and edge.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Lifecycle status of a workflow task.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Ready,
    Submitted,
    Running,
    Failed,
    Aborted,
    Completed,
    Deactivated,
    /// Rejected branch of a Choice.
    Disabled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 8] = [
        TaskStatus::Ready,
        TaskStatus::Submitted,
        TaskStatus::Running,
        TaskStatus::Failed,
        TaskStatus::Aborted,
        TaskStatus::Completed,
        TaskStatus::Deactivated,
        TaskStatus::Disabled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Submitted => "submitted",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
            Self::Completed => "completed",
            Self::Deactivated => "deactivated",
            Self::Disabled => "disabled",
        }
    }

    /// No further transitions happen from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Aborted | Self::Disabled | Self::Deactivated
        )
    }

    /// Active tasks may still be cancelled.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Aborted | Self::Deactivated)
    }

    /// Terminal statuses a downstream task may proceed past.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Disabled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TaskweaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == lowered)
            .ok_or_else(|| TaskweaveError::InvalidStatus(s.to_string()))
    }
}

/// Per-task session metadata handed to every task body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSession {
    pub status: TaskStatus,
    /// Creation time.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub itime: DateTime<Utc>,
    /// Last update time.
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub utime: Option<DateTime<Utc>>,
    pub task_id: String,
    pub app: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authid: Option<String>,
}

impl WorkflowSession {
    pub fn new(task_id: impl Into<String>, app: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Ready,
            itime: Utc::now(),
            utime: None,
            task_id: task_id.into(),
            app: app.into(),
            realm: None,
            authid: None,
        }
    }

    /// Record a status change and bump the update time.
    pub fn touch(&mut self, status: TaskStatus) {
        self.status = status;
        self.utime = Some(Utc::now());
    }
}

/// Everything a task body receives: resolved input plus session metadata.
#[derive(Debug, Clone)]
pub struct TaskInput {
    pub node_id: NodeId,
    pub data: Attributes,
    pub session: WorkflowSession,
}

/// Events emitted while a workflow runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    TaskDispatched { node_id: NodeId, task_type: String },
    TaskStarted { node_id: NodeId },
    TaskCompleted { node_id: NodeId },
    TaskFailed { node_id: NodeId, error: String },
    TaskDisabled { node_id: NodeId },
    TaskAborted { node_id: NodeId },
    MapperExpanded {
        node_id: NodeId,
        items: usize,
        clones: Vec<NodeId>,
    },
    CollectWaiting { node_id: NodeId, pending: usize },
    RunComplete { completed: usize, failed: usize },
}
