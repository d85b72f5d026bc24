use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use taskweave_core::config::SchedulerConfig;
use taskweave_core::error::{Result, TaskweaveError};
use taskweave_core::traits::{ReducerFn, TaskFn};
use taskweave_core::types::{Attributes, NodeId, TaskInput};

/// Node attribute naming the runner (or, on a Collect, the reducer).
pub const RUNNER_KEY: &str = "runner";

/// Runner used by local tasks that name none.
pub const PASSTHROUGH: &str = "passthrough";

/// Reducer used by Collect tasks that name none.
pub const COLLECT: &str = "collect";

/// Registry of task bodies and Collect reducers.
pub struct TaskRegistry {
    runners: HashMap<String, TaskFn>,
    reducers: HashMap<String, ReducerFn>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            runners: HashMap::new(),
            reducers: HashMap::new(),
        }
    }

    /// Register a task body.
    pub fn register_runner<F>(&mut self, name: impl Into<String>, runner: F)
    where
        F: Fn(TaskInput) -> Result<Attributes> + Send + Sync + 'static,
    {
        self.runners.insert(name.into(), Arc::new(runner));
    }

    /// Register a Collect reducer.
    pub fn register_reducer<F>(&mut self, name: impl Into<String>, reducer: F)
    where
        F: Fn(Vec<Attributes>) -> Result<Attributes> + Send + Sync + 'static,
    {
        self.reducers.insert(name.into(), Arc::new(reducer));
    }

    pub fn runner(&self, name: &str) -> Option<TaskFn> {
        self.runners.get(name).cloned()
    }

    pub fn reducer(&self, name: &str) -> Option<ReducerFn> {
        self.reducers.get(name).cloned()
    }

    /// List registered runner names.
    pub fn runners(&self) -> Vec<&str> {
        self.runners.keys().map(|s| s.as_str()).collect()
    }

    /// List registered reducer names.
    pub fn reducers(&self) -> Vec<&str> {
        self.reducers.keys().map(|s| s.as_str()).collect()
    }

    /// The runner a node asks for, or the pass-through runner.
    pub fn resolve_runner(&self, node: NodeId, attrs: &Attributes) -> Result<TaskFn> {
        let name = requested(node, attrs)?.unwrap_or(PASSTHROUGH);
        self.runner(name)
            .ok_or_else(|| TaskweaveError::execution(node, format!("runner '{}' not registered", name)))
    }

    /// The reducer a Collect asks for, or the default reducer.
    pub fn resolve_reducer(&self, node: NodeId, attrs: &Attributes) -> Result<ReducerFn> {
        let name = requested(node, attrs)?.unwrap_or(COLLECT);
        self.reducer(name)
            .ok_or_else(|| TaskweaveError::execution(node, format!("reducer '{}' not registered", name)))
    }

    /// Create a registry with the built-in runner and reducer.
    pub fn with_builtins(config: &SchedulerConfig) -> Self {
        let mut registry = Self::new();
        registry.register_runner(PASSTHROUGH, |input: TaskInput| Ok(input.data));
        let key = config.collect_key.clone();
        registry.register_reducer(COLLECT, move |outputs: Vec<Attributes>| {
            let mut reduced = Attributes::new();
            reduced.insert(
                key.clone(),
                Value::Array(outputs.into_iter().map(Value::Object).collect()),
            );
            Ok(reduced)
        });
        registry
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn requested(node: NodeId, attrs: &Attributes) -> Result<Option<&str>> {
    match attrs.get(RUNNER_KEY) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(name)) => Ok(Some(name.as_str())),
        Some(other) => Err(TaskweaveError::execution(
            node,
            format!("runner name must be a string, got {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskweave_core::types::WorkflowSession;

    fn input(data: Value) -> TaskInput {
        TaskInput {
            node_id: 1,
            data: match data {
                Value::Object(map) => map,
                _ => unreachable!(),
            },
            session: WorkflowSession::new("t", "taskweave"),
        }
    }

    #[test]
    fn test_builtins() {
        let registry = TaskRegistry::with_builtins(&SchedulerConfig::default());
        let runner = registry.resolve_runner(1, &Attributes::new()).unwrap();
        let out = runner(input(json!({"a": 1}))).unwrap();
        assert_eq!(out["a"], json!(1));

        let reducer = registry.resolve_reducer(2, &Attributes::new()).unwrap();
        let mut one = Attributes::new();
        one.insert("x".into(), json!(1));
        let reduced = reducer(vec![one.clone(), one]).unwrap();
        assert_eq!(reduced["collected"], json!([{"x": 1}, {"x": 1}]));
    }

    #[test]
    fn test_named_runner() {
        let mut registry = TaskRegistry::new();
        registry.register_runner("double", |input: TaskInput| {
            let n = input.data["n"].as_i64().unwrap_or(0);
            let mut out = Attributes::new();
            out.insert("n".into(), json!(n * 2));
            Ok(out)
        });
        let mut attrs = Attributes::new();
        attrs.insert(RUNNER_KEY.into(), json!("double"));
        let runner = registry.resolve_runner(1, &attrs).unwrap();
        assert_eq!(runner(input(json!({"n": 4}))).unwrap()["n"], json!(8));
        assert_eq!(registry.runners(), vec!["double"]);
    }

    #[test]
    fn test_unregistered_runner_is_execution_error() {
        let registry = TaskRegistry::new();
        let mut attrs = Attributes::new();
        attrs.insert(RUNNER_KEY.into(), json!("missing"));
        let err = registry.resolve_runner(7, &attrs).err().unwrap();
        assert!(matches!(err, TaskweaveError::TaskExecution { node: 7, .. }));
    }
}
