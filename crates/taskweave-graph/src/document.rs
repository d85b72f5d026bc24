use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use taskweave_core::error::TaskweaveError;
use taskweave_core::types::{Attributes, NodeId};

use crate::graph::Graph;

/// Persisted form of a [`Graph`].
///
/// Nodes are keyed by id; edges are keyed by source id and then target id.
/// The id counter is stored so a reloaded graph never hands out an id that
/// was used before the restart.
///
/// ```json
/// {
///   "directed": true,
///   "next_id": 4,
///   "nodes": { "1": {"task_type": "Start"}, "2": {}, "3": {} },
///   "edges": { "1": { "2": {} }, "2": { "3": {"data_mapping": {"a": "b"}} } }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default = "default_directed")]
    pub directed: bool,
    #[serde(default)]
    pub next_id: Option<NodeId>,
    #[serde(default)]
    pub nodes: BTreeMap<NodeId, Attributes>,
    #[serde(default)]
    pub edges: BTreeMap<NodeId, BTreeMap<NodeId, Attributes>>,
}

fn default_directed() -> bool {
    true
}

impl From<Graph> for GraphDocument {
    fn from(graph: Graph) -> Self {
        let mut edges: BTreeMap<NodeId, BTreeMap<NodeId, Attributes>> = BTreeMap::new();
        for (&(a, b), attrs) in graph.edge_table() {
            edges.entry(a).or_default().insert(b, attrs.clone());
        }
        Self {
            directed: graph.is_directed(),
            next_id: Some(graph.next_id()),
            nodes: graph.nodes().map(|(id, attrs)| (id, attrs.clone())).collect(),
            edges,
        }
    }
}

impl TryFrom<GraphDocument> for Graph {
    type Error = TaskweaveError;

    fn try_from(doc: GraphDocument) -> Result<Self, Self::Error> {
        let edges = doc
            .edges
            .into_iter()
            .flat_map(|(a, targets)| targets.into_iter().map(move |(b, attrs)| ((a, b), attrs)))
            .collect();
        Graph::from_parts(doc.directed, doc.nodes, edges, doc.next_id.unwrap_or(1))
    }
}
