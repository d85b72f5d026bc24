use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use taskweave_core::error::{Result, TaskweaveError};
use taskweave_core::types::{Attributes, NodeId};

use crate::document::GraphDocument;
use crate::view::{GraphView, GraphViewMut};

/// Mutable directed graph with attribute maps on nodes and edges.
///
/// Nodes live in an append-only id space: ids come from a single
/// monotonic counter and are never reused, even after removal, so ids
/// held by callers stay valid while the graph grows. The adjacency index
/// is derived from the edge table and kept in step with it on every
/// mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "GraphDocument", try_from = "GraphDocument")]
pub struct Graph {
    directed: bool,
    nodes: BTreeMap<NodeId, Attributes>,
    edges: BTreeMap<(NodeId, NodeId), Attributes>,
    adjacency: BTreeMap<NodeId, BTreeSet<NodeId>>,
    next_id: NodeId,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Create an empty directed graph. Ids start at 1.
    pub fn new() -> Self {
        Self {
            directed: true,
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            adjacency: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Create an empty undirected graph. Every edge is stored in both directions.
    pub fn undirected() -> Self {
        Self {
            directed: false,
            ..Self::new()
        }
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of stored edges. Undirected edges count once per direction.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The id the next added node will receive.
    pub fn next_id(&self) -> NodeId {
        self.next_id
    }

    // ── Nodes ───────────────────────────────────────────────────

    /// Add a node and return its freshly allocated id.
    pub fn add_node(&mut self, attributes: Attributes) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(id, attributes);
        self.adjacency.insert(id, BTreeSet::new());
        id
    }

    /// Remove a node together with every edge touching it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Attributes> {
        let attributes = self
            .nodes
            .remove(&id)
            .ok_or(TaskweaveError::UnknownNode(id))?;
        self.edges.retain(|&(a, b), _| a != id && b != id);
        self.adjacency.remove(&id);
        for targets in self.adjacency.values_mut() {
            targets.remove(&id);
        }
        debug!(node_id = id, "Removed node");
        Ok(attributes)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Result<&Attributes> {
        self.nodes.get(&id).ok_or(TaskweaveError::UnknownNode(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Attributes> {
        self.nodes.get_mut(&id).ok_or(TaskweaveError::UnknownNode(id))
    }

    /// Read one attribute of a node.
    pub fn node_attr(&self, id: NodeId, key: &str) -> Result<Option<&Value>> {
        Ok(self.node(id)?.get(key))
    }

    /// Set one attribute of a node.
    pub fn set_node_attr(&mut self, id: NodeId, key: impl Into<String>, value: Value) -> Result<()> {
        self.node_mut(id)?.insert(key.into(), value);
        Ok(())
    }

    /// Replace a node's whole attribute mapping.
    pub fn set_node(&mut self, id: NodeId, attributes: Attributes) -> Result<()> {
        *self.node_mut(id)? = attributes;
        Ok(())
    }

    /// Node ids in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Attributes)> {
        self.nodes.iter().map(|(id, attrs)| (*id, attrs))
    }

    /// Ids of nodes whose attributes satisfy `predicate`.
    pub fn query_nodes(&self, predicate: impl Fn(&Attributes) -> bool) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, attrs)| predicate(attrs))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Ids of nodes where `key` equals `value`.
    pub fn query_nodes_by(&self, key: &str, value: &Value) -> Vec<NodeId> {
        self.query_nodes(|attrs| attrs.get(key) == Some(value))
    }

    // ── Edges ───────────────────────────────────────────────────

    /// Add an edge. Both endpoints must exist. Re-adding an edge replaces its attributes.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, attributes: Attributes) -> Result<()> {
        self.ensure_node(source)?;
        self.ensure_node(target)?;
        if !self.directed {
            self.insert_edge(target, source, attributes.clone());
        }
        self.insert_edge(source, target, attributes);
        Ok(())
    }

    /// Add an edge without attributes.
    pub fn connect(&mut self, source: NodeId, target: NodeId) -> Result<()> {
        self.add_edge(source, target, Attributes::new())
    }

    pub fn remove_edge(&mut self, source: NodeId, target: NodeId) -> Result<Attributes> {
        let attributes = self
            .edges
            .remove(&(source, target))
            .ok_or(TaskweaveError::UnknownEdge(source, target))?;
        self.unlink(source, target);
        if !self.directed {
            self.edges.remove(&(target, source));
            self.unlink(target, source);
        }
        Ok(attributes)
    }

    pub fn contains_edge(&self, source: NodeId, target: NodeId) -> bool {
        self.edges.contains_key(&(source, target))
    }

    pub fn edge(&self, source: NodeId, target: NodeId) -> Result<&Attributes> {
        self.edges
            .get(&(source, target))
            .ok_or(TaskweaveError::UnknownEdge(source, target))
    }

    pub fn edge_mut(&mut self, source: NodeId, target: NodeId) -> Result<&mut Attributes> {
        self.edges
            .get_mut(&(source, target))
            .ok_or(TaskweaveError::UnknownEdge(source, target))
    }

    pub fn edges(&self) -> impl Iterator<Item = ((NodeId, NodeId), &Attributes)> {
        self.edges.iter().map(|(key, attrs)| (*key, attrs))
    }

    /// Edge keys whose attributes satisfy `predicate`.
    pub fn query_edges(&self, predicate: impl Fn(&Attributes) -> bool) -> Vec<(NodeId, NodeId)> {
        self.edges
            .iter()
            .filter(|(_, attrs)| predicate(attrs))
            .map(|(key, _)| *key)
            .collect()
    }

    // ── Adjacency ───────────────────────────────────────────────

    /// Directed adjacency: node id to the ids it has edges to.
    pub fn adjacency(&self) -> &BTreeMap<NodeId, BTreeSet<NodeId>> {
        &self.adjacency
    }

    /// Direct successors in ascending id order.
    pub fn successors(&self, id: NodeId) -> Result<Vec<NodeId>> {
        self.adjacency
            .get(&id)
            .map(|targets| targets.iter().copied().collect())
            .ok_or(TaskweaveError::UnknownNode(id))
    }

    /// Direct predecessors in ascending id order.
    pub fn predecessors(&self, id: NodeId) -> Result<Vec<NodeId>> {
        self.ensure_node(id)?;
        Ok(self
            .adjacency
            .iter()
            .filter(|(_, targets)| targets.contains(&id))
            .map(|(source, _)| *source)
            .collect())
    }

    // ── Views and copies ────────────────────────────────────────

    /// A read-only view restricted to `ids`, keeping a handle to this graph.
    pub fn subgraph<I>(&self, ids: I) -> Result<GraphView<'_>>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mask = self.checked_mask(ids)?;
        Ok(GraphView::new(self, mask))
    }

    /// A read/write view restricted to `ids`, keeping a handle to this graph.
    pub fn subgraph_mut<I>(&mut self, ids: I) -> Result<GraphViewMut<'_>>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mask = self.checked_mask(ids)?;
        Ok(GraphViewMut::new(self, mask))
    }

    /// Detached structural copy of `ids` and the edges between them.
    /// Ids are preserved; the copy continues this graph's id counter.
    pub fn copy<I>(&self, ids: I) -> Result<Graph>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mask = self.checked_mask(ids)?;
        let mut copy = Graph {
            directed: self.directed,
            next_id: self.next_id,
            ..Graph::new()
        };
        for &id in &mask {
            copy.nodes.insert(id, self.nodes[&id].clone());
            copy.adjacency.insert(id, BTreeSet::new());
        }
        for (&(a, b), attrs) in &self.edges {
            if mask.contains(&a) && mask.contains(&b) {
                copy.insert_edge(a, b, attrs.clone());
            }
        }
        Ok(copy)
    }

    /// Insert every node and edge of `other` under freshly allocated ids.
    ///
    /// Returns the old → new id mapping so callers can attach the boundary
    /// edges the copy does not carry.
    pub fn merge_renumbered(&mut self, other: &Graph) -> BTreeMap<NodeId, NodeId> {
        let mapping: BTreeMap<NodeId, NodeId> = other
            .nodes
            .iter()
            .map(|(&old, attrs)| (old, self.add_node(attrs.clone())))
            .collect();
        for (&(a, b), attrs) in &other.edges {
            self.insert_edge(mapping[&a], mapping[&b], attrs.clone());
        }
        debug!(nodes = mapping.len(), next_id = self.next_id, "Merged renumbered copy");
        mapping
    }

    // ── Internals ───────────────────────────────────────────────

    pub(crate) fn from_parts(
        directed: bool,
        nodes: BTreeMap<NodeId, Attributes>,
        edges: BTreeMap<(NodeId, NodeId), Attributes>,
        next_id: NodeId,
    ) -> Result<Self> {
        for &(a, b) in edges.keys() {
            if !nodes.contains_key(&a) {
                return Err(TaskweaveError::UnknownNode(a));
            }
            if !nodes.contains_key(&b) {
                return Err(TaskweaveError::UnknownNode(b));
            }
        }
        let mut edges = edges;
        if !directed {
            let missing: Vec<((NodeId, NodeId), Attributes)> = edges
                .iter()
                .filter(|(&(a, b), _)| !edges.contains_key(&(b, a)))
                .map(|(&(a, b), attrs)| ((b, a), attrs.clone()))
                .collect();
            edges.extend(missing);
        }
        let floor = nodes.keys().next_back().map_or(1, |max| max + 1);
        let mut graph = Graph {
            directed,
            nodes,
            edges,
            adjacency: BTreeMap::new(),
            next_id: next_id.max(floor),
        };
        graph.rebuild_adjacency();
        Ok(graph)
    }

    pub(crate) fn edge_table(&self) -> &BTreeMap<(NodeId, NodeId), Attributes> {
        &self.edges
    }

    fn rebuild_adjacency(&mut self) {
        self.adjacency = self.nodes.keys().map(|&id| (id, BTreeSet::new())).collect();
        for &(a, b) in self.edges.keys() {
            self.adjacency.entry(a).or_default().insert(b);
        }
    }

    fn insert_edge(&mut self, source: NodeId, target: NodeId, attributes: Attributes) {
        self.edges.insert((source, target), attributes);
        self.adjacency.entry(source).or_default().insert(target);
    }

    fn unlink(&mut self, source: NodeId, target: NodeId) {
        if let Some(targets) = self.adjacency.get_mut(&source) {
            targets.remove(&target);
        }
    }

    fn ensure_node(&self, id: NodeId) -> Result<()> {
        if self.nodes.contains_key(&id) {
            Ok(())
        } else {
            Err(TaskweaveError::UnknownNode(id))
        }
    }

    fn checked_mask<I>(&self, ids: I) -> Result<BTreeSet<NodeId>>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mask: BTreeSet<NodeId> = ids.into_iter().collect();
        if let Some(missing) = mask.iter().find(|id| !self.nodes.contains_key(id)) {
            return Err(TaskweaveError::UnknownNode(*missing));
        }
        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap_or_default()
    }

    fn chain(n: usize) -> Graph {
        let mut g = Graph::new();
        let ids: Vec<NodeId> = (0..n).map(|i| g.add_node(attrs(json!({"i": i})))).collect();
        for pair in ids.windows(2) {
            g.connect(pair[0], pair[1]).unwrap();
        }
        g
    }

    #[test]
    fn test_ids_are_monotonic_and_never_reused() {
        let mut g = Graph::new();
        let a = g.add_node(Attributes::new());
        let b = g.add_node(Attributes::new());
        assert_eq!((a, b), (1, 2));
        g.remove_node(b).unwrap();
        let c = g.add_node(Attributes::new());
        assert_eq!(c, 3);
    }

    #[test]
    fn test_edges_require_existing_nodes() {
        let mut g = Graph::new();
        let a = g.add_node(Attributes::new());
        let err = g.connect(a, 99).unwrap_err();
        assert!(matches!(err, TaskweaveError::UnknownNode(99)));
        assert!(matches!(g.edge(a, 99), Err(TaskweaveError::UnknownEdge(_, 99))));
    }

    #[test]
    fn test_remove_node_drops_incident_edges() {
        let mut g = chain(3);
        g.remove_node(2).unwrap();
        assert_eq!(g.edge_count(), 0);
        assert!(g.successors(1).unwrap().is_empty());
        assert!(matches!(g.remove_node(2), Err(TaskweaveError::UnknownNode(2))));
    }

    #[test]
    fn test_adjacency_follows_edge_table() {
        let mut g = chain(3);
        assert_eq!(g.successors(1).unwrap(), vec![2]);
        assert_eq!(g.predecessors(3).unwrap(), vec![2]);
        g.remove_edge(2, 3).unwrap();
        assert!(g.successors(2).unwrap().is_empty());
        assert!(g.predecessors(3).unwrap().is_empty());
    }

    #[test]
    fn test_undirected_edges_are_symmetric() {
        let mut g = Graph::undirected();
        let a = g.add_node(Attributes::new());
        let b = g.add_node(Attributes::new());
        g.add_edge(a, b, attrs(json!({"weight": 2}))).unwrap();
        assert!(g.contains_edge(b, a));
        assert_eq!(g.edge(b, a).unwrap()["weight"], json!(2));
        g.remove_edge(b, a).unwrap();
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn test_query_nodes_and_edges() {
        let mut g = Graph::new();
        let a = g.add_node(attrs(json!({"task_type": "Mapper"})));
        let b = g.add_node(attrs(json!({"task_type": "Task"})));
        let c = g.add_node(attrs(json!({"task_type": "Task"})));
        g.add_edge(a, b, attrs(json!({"data_mapping": {"x": "y"}}))).unwrap();
        g.connect(b, c).unwrap();

        assert_eq!(g.query_nodes_by("task_type", &json!("Task")), vec![b, c]);
        assert_eq!(g.query_edges(|e| e.contains_key("data_mapping")), vec![(a, b)]);
    }

    #[test]
    fn test_copy_keeps_ids_and_internal_edges() {
        let g = chain(4);
        let copy = g.copy([2, 3]).unwrap();
        assert_eq!(copy.node_ids().collect::<Vec<_>>(), vec![2, 3]);
        assert!(copy.contains_edge(2, 3));
        assert_eq!(copy.edge_count(), 1);
        assert_eq!(copy.next_id(), g.next_id());
        assert!(matches!(g.copy([2, 42]), Err(TaskweaveError::UnknownNode(42))));
    }

    #[test]
    fn test_merge_renumbered_allocates_disjoint_ids() {
        let mut g = chain(3);
        let lineage = g.copy([2, 3]).unwrap();
        let mapping = g.merge_renumbered(&lineage);
        assert_eq!(mapping[&2], 4);
        assert_eq!(mapping[&3], 5);
        assert!(g.contains_edge(4, 5));
        assert!(!g.contains_edge(1, 4));
        assert_eq!(g.node(4).unwrap()["i"], json!(1));
        assert_eq!(g.next_id(), 6);
    }
}
