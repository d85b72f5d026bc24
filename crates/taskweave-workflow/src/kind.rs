use std::fmt;
use std::str::FromStr;

use serde_json::json;

use taskweave_core::error::TaskweaveError;
use taskweave_core::types::Attributes;
use taskweave_graph::GraphOrm;

/// Node attribute selecting the task variant.
pub const TASK_TYPE_KEY: &str = "task_type";

/// Behavior variant of a workflow node, selected by its `task_type`.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum TaskKind {
    /// Loads the initial workflow input.
    Start,
    /// Local task body run on the worker pool.
    Task,
    /// Local task body run inline on the scheduler loop.
    BlockingTask,
    /// Remote procedure named by the node's `uri`.
    RemoteTask,
    /// Picks one successor at random and disables the rest.
    Choice,
    /// Fans a collection out over cloned task lineages.
    Mapper,
    /// Waits for every ancestor and reduces their outputs.
    Collect,
}

impl TaskKind {
    pub const ALL: [TaskKind; 7] = [
        TaskKind::Start,
        TaskKind::Task,
        TaskKind::BlockingTask,
        TaskKind::RemoteTask,
        TaskKind::Choice,
        TaskKind::Mapper,
        TaskKind::Collect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Task => "Task",
            Self::BlockingTask => "BlockingTask",
            Self::RemoteTask => "RemoteTask",
            Self::Choice => "Choice",
            Self::Mapper => "Mapper",
            Self::Collect => "Collect",
        }
    }

    /// The node attributes selecting this variant.
    pub fn pattern(&self) -> Attributes {
        let mut pattern = Attributes::new();
        pattern.insert(TASK_TYPE_KEY.into(), json!(self.as_str()));
        pattern
    }

    /// ORM with every variant mapped on `task_type`.
    pub fn orm() -> GraphOrm<TaskKind> {
        let mut orm = GraphOrm::new();
        for kind in Self::ALL {
            orm.map_node(kind, kind.pattern());
        }
        orm
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = TaskweaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TaskweaveError::UnknownTaskType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orm_resolves_every_kind() {
        let orm = TaskKind::orm();
        for kind in TaskKind::ALL {
            assert_eq!(orm.resolve(1, &kind.pattern()).unwrap(), Some(kind));
        }
        assert_eq!(orm.resolve(1, &Attributes::new()).unwrap(), None);
    }

    #[test]
    fn test_parse() {
        assert_eq!("Mapper".parse::<TaskKind>().unwrap(), TaskKind::Mapper);
        assert!(matches!(
            "mapper".parse::<TaskKind>(),
            Err(TaskweaveError::UnknownTaskType(_))
        ));
    }
}
