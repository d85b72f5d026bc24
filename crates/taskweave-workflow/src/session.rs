use chrono::Utc;
use serde_json::{json, Value};

use taskweave_core::error::Result;
use taskweave_core::types::{Attributes, NodeId, TaskStatus, WorkflowSession};
use taskweave_graph::Graph;

/// Node attribute holding the stored session record.
pub const SESSION_KEY: &str = "session";

/// Node-level fields a session record is seeded from.
const SEEDED_FIELDS: [&str; 7] = ["status", "itime", "utime", "task_id", "app", "realm", "authid"];

/// The session metadata of a task.
///
/// Built from the node's own schema fields, overlaid with its stored
/// `session` record. The node-level status always wins, since the
/// scheduler writes it first.
pub fn current_session(graph: &Graph, id: NodeId) -> Result<WorkflowSession> {
    let attrs = graph.node(id)?;
    let mut record = Attributes::new();
    for key in SEEDED_FIELDS {
        if let Some(value) = attrs.get(key) {
            record.insert(key.into(), value.clone());
        }
    }
    if let Some(Value::Object(stored)) = attrs.get(SESSION_KEY) {
        record.extend(stored.clone());
    }
    if let Some(status) = attrs.get("status").and_then(Value::as_str) {
        let status: TaskStatus = status.parse()?;
        record.insert("status".into(), json!(status.as_str()));
    }

    record.entry("status").or_insert_with(|| json!("ready"));
    record.entry("itime").or_insert_with(|| json!(Utc::now().timestamp()));
    record.entry("task_id").or_insert_with(|| json!(""));
    record.entry("app").or_insert_with(|| json!("taskweave"));

    Ok(serde_json::from_value(Value::Object(record))?)
}

/// Merge `patch` into the task's session record and refresh its update time.
pub fn update_session(graph: &mut Graph, id: NodeId, patch: &Attributes) -> Result<WorkflowSession> {
    let current = current_session(graph, id)?;
    let mut record = match serde_json::to_value(&current)? {
        Value::Object(map) => map,
        _ => Attributes::new(),
    };
    record.extend(patch.clone());

    let mut session: WorkflowSession = serde_json::from_value(Value::Object(record))?;
    session.utime = Some(Utc::now());
    graph.set_node_attr(id, SESSION_KEY, serde_json::to_value(&session)?)?;
    Ok(session)
}
