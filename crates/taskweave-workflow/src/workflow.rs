use std::path::Path;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info};

use taskweave_core::config::AppConfig;
use taskweave_core::error::{Result, TaskweaveError};
use taskweave_core::traits::DocumentValidator;
use taskweave_core::types::{Attributes, NodeId, TaskInput, TaskStatus, WorkflowSession};
use taskweave_graph::{Graph, GraphOrm, GraphView};

use crate::kind::{TaskKind, TASK_TYPE_KEY};
use crate::schema::TaskSchema;
use crate::session;

pub const INPUT_KEY: &str = "input_data";
pub const OUTPUT_KEY: &str = "output_data";
/// Per-edge rename table applied by Collect.
pub const DATA_MAPPING_KEY: &str = "data_mapping";

/// A task graph plus the dispatch and validation rules for its nodes.
///
/// The graph is the single source of truth: status, input, output and
/// session metadata all live in node attributes, so a saved workflow can
/// be reloaded and resumed.
#[derive(Debug, Clone)]
pub struct Workflow {
    graph: Graph,
    orm: GraphOrm<TaskKind>,
    schema: TaskSchema,
}

impl Workflow {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            graph: Graph::new(),
            orm: TaskKind::orm(),
            schema: TaskSchema::new(config.session.clone())?,
        })
    }

    /// Wrap an existing graph. Every node must resolve to a task kind.
    pub fn from_graph(graph: Graph, config: &AppConfig) -> Result<Self> {
        let workflow = Self {
            graph,
            ..Self::new(config)?
        };
        for id in workflow.graph.node_ids() {
            workflow.kind(id)?;
        }
        Ok(workflow)
    }

    /// Load a persisted workflow graph from JSON.
    pub fn load(path: &Path, config: &AppConfig) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let graph: Graph = serde_json::from_str(&content)?;
        info!(
            path = %path.display(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Loaded workflow"
        );
        Self::from_graph(graph, config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.graph)?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "Saved workflow");
        Ok(())
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }

    pub fn schema(&self) -> &TaskSchema {
        &self.schema
    }

    // ── Definition ──────────────────────────────────────────────

    /// Validate `attributes` against the task schema and add the task.
    ///
    /// Nothing is added when validation fails.
    pub fn add_task(&mut self, attributes: Attributes) -> Result<NodeId> {
        let data = self.schema.init_task(attributes)?;
        let id = self.graph.add_node(data);
        info!(node_id = id, task_type = ?self.graph.node(id)?.get(TASK_TYPE_KEY), "Task added");
        Ok(id)
    }

    pub fn connect(&mut self, source: NodeId, target: NodeId) -> Result<()> {
        self.graph.connect(source, target)
    }

    /// Connect with a rename table applied to `source`'s output when a
    /// Collect at `target` gathers it.
    pub fn connect_with_mapping<I, K, V>(&mut self, source: NodeId, target: NodeId, mapping: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let table: Attributes = mapping
            .into_iter()
            .map(|(from, to)| (from.into(), Value::String(to.into())))
            .collect();
        let mut attrs = Attributes::new();
        attrs.insert(DATA_MAPPING_KEY.into(), Value::Object(table));
        self.graph.add_edge(source, target, attrs)
    }

    /// Run the schema over every node.
    pub fn validate_all(&self) -> Result<()> {
        for (id, attrs) in self.graph.nodes() {
            self.schema
                .validate(attrs)
                .map_err(|e| TaskweaveError::Validation(format!("node {}: {}", id, e)))?;
        }
        Ok(())
    }

    // ── State ───────────────────────────────────────────────────

    pub fn kind(&self, id: NodeId) -> Result<TaskKind> {
        let attrs = self.graph.node(id)?;
        self.orm.resolve(id, attrs)?.ok_or_else(|| {
            let task_type = attrs
                .get(TASK_TYPE_KEY)
                .map(Value::to_string)
                .unwrap_or_else(|| "<missing>".to_string());
            TaskweaveError::UnknownTaskType(task_type)
        })
    }

    /// Current status. Nodes without one are ready.
    pub fn status(&self, id: NodeId) -> Result<TaskStatus> {
        match self.graph.node_attr(id, "status")? {
            Some(Value::String(s)) => s.parse(),
            Some(other) => Err(TaskweaveError::InvalidStatus(other.to_string())),
            None => Ok(TaskStatus::Ready),
        }
    }

    /// Set the status and mirror it into the session record.
    pub fn set_status(&mut self, id: NodeId, status: TaskStatus) -> Result<()> {
        self.graph.set_node_attr(id, "status", json!(status.as_str()))?;
        self.graph.set_node_attr(id, "utime", json!(Utc::now().timestamp()))?;
        let mut patch = Attributes::new();
        patch.insert("status".into(), json!(status.as_str()));
        session::update_session(&mut self.graph, id, &patch)?;
        debug!(node_id = id, %status, "Task status changed");
        Ok(())
    }

    pub fn session(&self, id: NodeId) -> Result<WorkflowSession> {
        session::current_session(&self.graph, id)
    }

    pub fn update_session(&mut self, id: NodeId, patch: &Attributes) -> Result<WorkflowSession> {
        session::update_session(&mut self.graph, id, patch)
    }

    /// Input with every `$<id>.<key>` reference resolved.
    pub fn get_input(&self, id: NodeId) -> Result<Attributes> {
        resolve_input(&self.graph.subgraph([id])?, id)
    }

    /// Resolved input and session, as handed to a task body.
    pub fn task_input(&self, id: NodeId) -> Result<TaskInput> {
        Ok(TaskInput {
            node_id: id,
            data: self.get_input(id)?,
            session: self.session(id)?,
        })
    }

    pub fn output(&self, id: NodeId) -> Result<Attributes> {
        Ok(object_attr(self.graph.node(id)?, OUTPUT_KEY))
    }

    pub fn set_output(&mut self, id: NodeId, output: Attributes) -> Result<()> {
        self.graph.set_node_attr(id, OUTPUT_KEY, Value::Object(output))
    }

    /// Merge `output` over the existing output data.
    pub fn merge_output(&mut self, id: NodeId, output: Attributes) -> Result<()> {
        let mut merged = self.output(id)?;
        merged.extend(output);
        self.set_output(id, merged)
    }

    // ── Lifecycle ───────────────────────────────────────────────

    /// Abort the task if it is still active. Returns whether it was.
    pub fn cancel(&mut self, id: NodeId) -> Result<bool> {
        let status = self.status(id)?;
        if !status.is_active() {
            info!(node_id = id, %status, "Unable to cancel task, not active");
            return Ok(false);
        }
        self.set_status(id, TaskStatus::Aborted)?;
        info!(node_id = id, "Cancelled task");
        Ok(true)
    }

    /// Abort every active task.
    pub fn cancel_all(&mut self) -> Result<Vec<NodeId>> {
        let mut aborted = Vec::new();
        for id in self.graph.node_ids().collect::<Vec<_>>() {
            if self.status(id)?.is_active() {
                self.set_status(id, TaskStatus::Aborted)?;
                aborted.push(id);
            }
        }
        Ok(aborted)
    }

    /// Reset tasks persisted mid-flight back to ready.
    pub fn reconcile(&mut self) -> Result<Vec<NodeId>> {
        let mut reset = Vec::new();
        for id in self.graph.node_ids().collect::<Vec<_>>() {
            if matches!(self.status(id)?, TaskStatus::Submitted | TaskStatus::Running) {
                self.set_status(id, TaskStatus::Ready)?;
                reset.push(id);
            }
        }
        Ok(reset)
    }

    /// Node ids currently in `status`, ascending.
    pub fn nodes_with_status(&self, status: TaskStatus) -> Result<Vec<NodeId>> {
        let mut found = Vec::new();
        for id in self.graph.node_ids() {
            if self.status(id)? == status {
                found.push(id);
            }
        }
        Ok(found)
    }
}

/// Resolve the input of `id` in a view.
///
/// References are looked up through the view's handle to the full graph,
/// so they resolve even when the referenced node is outside the view.
pub fn resolve_input(view: &GraphView<'_>, id: NodeId) -> Result<Attributes> {
    let raw = object_attr(view.node(id)?, INPUT_KEY);
    let full = view.full();

    raw.into_iter()
        .map(|(key, value)| -> Result<(String, Value)> {
            let resolved = match value.as_str().and_then(parse_reference) {
                Some((source, field)) => full
                    .node(source)?
                    .get(OUTPUT_KEY)
                    .and_then(|out| out.get(field))
                    .cloned()
                    .unwrap_or(Value::Null),
                None => value.clone(),
            };
            Ok((key, resolved))
        })
        .collect()
}

/// Split a `$<id>.<key>` reference. Anything else is not a reference.
pub(crate) fn parse_reference(value: &str) -> Option<(NodeId, &str)> {
    let (id, key) = value.strip_prefix('$')?.split_once('.')?;
    Some((id.parse().ok()?, key))
}

pub(crate) fn object_attr(attrs: &Attributes, key: &str) -> Attributes {
    match attrs.get(key) {
        Some(Value::Object(map)) => map.clone(),
        _ => Attributes::new(),
    }
}
