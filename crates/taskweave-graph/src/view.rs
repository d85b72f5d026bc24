use std::collections::BTreeSet;

use serde_json::Value;

use taskweave_core::error::{Result, TaskweaveError};
use taskweave_core::types::{Attributes, NodeId};

use crate::graph::Graph;

/// Read access shared by full graphs and subgraph views.
///
/// Algorithms are written against this trait so they run unchanged on a
/// masked view, where only the visible nodes and the edges between them
/// exist.
pub trait Topology {
    /// The unrestricted graph this topology reads from.
    fn full_graph(&self) -> &Graph;

    fn contains_node(&self, id: NodeId) -> bool;

    /// Visible node ids in ascending order.
    fn node_ids(&self) -> Vec<NodeId>;

    /// Visible successors of `id` in ascending order.
    fn neighbors(&self, id: NodeId) -> Vec<NodeId>;

    /// Attributes of a visible edge.
    fn edge_attrs(&self, source: NodeId, target: NodeId) -> Option<&Attributes>;

    fn is_directed(&self) -> bool {
        self.full_graph().is_directed()
    }

    fn ensure_node(&self, id: NodeId) -> Result<()> {
        if self.contains_node(id) {
            Ok(())
        } else {
            Err(TaskweaveError::UnknownNode(id))
        }
    }
}

impl Topology for Graph {
    fn full_graph(&self) -> &Graph {
        self
    }

    fn contains_node(&self, id: NodeId) -> bool {
        Graph::contains_node(self, id)
    }

    fn node_ids(&self) -> Vec<NodeId> {
        Graph::node_ids(self).collect()
    }

    fn neighbors(&self, id: NodeId) -> Vec<NodeId> {
        self.adjacency()
            .get(&id)
            .map(|targets| targets.iter().copied().collect())
            .unwrap_or_default()
    }

    fn edge_attrs(&self, source: NodeId, target: NodeId) -> Option<&Attributes> {
        self.edge(source, target).ok()
    }
}

/// Read-only window over part of a graph.
///
/// Holds a borrowed handle to the full graph rather than owning any
/// storage, so the view and its parent always agree.
#[derive(Debug, Clone)]
pub struct GraphView<'g> {
    full: &'g Graph,
    mask: BTreeSet<NodeId>,
}

impl<'g> GraphView<'g> {
    pub(crate) fn new(full: &'g Graph, mask: BTreeSet<NodeId>) -> Self {
        Self { full, mask }
    }

    /// Lookup handle to the unrestricted graph.
    pub fn full(&self) -> &'g Graph {
        self.full
    }

    pub fn mask(&self) -> &BTreeSet<NodeId> {
        &self.mask
    }

    pub fn node_count(&self) -> usize {
        self.mask.len()
    }

    pub fn node(&self, id: NodeId) -> Result<&'g Attributes> {
        if !self.mask.contains(&id) {
            return Err(TaskweaveError::UnknownNode(id));
        }
        self.full.node(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &'g Attributes)> + '_ {
        let full = self.full;
        self.mask
            .iter()
            .filter_map(move |&id| full.node(id).ok().map(|attrs| (id, attrs)))
    }

    /// Edges with both endpoints inside the view.
    pub fn edges(&self) -> impl Iterator<Item = ((NodeId, NodeId), &'g Attributes)> + '_ {
        self.full
            .edges()
            .filter(move |((a, b), _)| self.mask.contains(a) && self.mask.contains(b))
    }

    pub fn query_nodes(&self, predicate: impl Fn(&Attributes) -> bool) -> Vec<NodeId> {
        self.nodes()
            .filter(|(_, attrs)| predicate(attrs))
            .map(|(id, _)| id)
            .collect()
    }
}

impl Topology for GraphView<'_> {
    fn full_graph(&self) -> &Graph {
        self.full
    }

    fn contains_node(&self, id: NodeId) -> bool {
        self.mask.contains(&id)
    }

    fn node_ids(&self) -> Vec<NodeId> {
        self.mask.iter().copied().collect()
    }

    fn neighbors(&self, id: NodeId) -> Vec<NodeId> {
        if !self.mask.contains(&id) {
            return Vec::new();
        }
        self.full
            .neighbors(id)
            .into_iter()
            .filter(|n| self.mask.contains(n))
            .collect()
    }

    fn edge_attrs(&self, source: NodeId, target: NodeId) -> Option<&Attributes> {
        if self.mask.contains(&source) && self.mask.contains(&target) {
            self.full.edge_attrs(source, target)
        } else {
            None
        }
    }
}

/// Read/write window over part of a graph.
///
/// Writes through [`GraphViewMut::node_mut`] are limited to visible nodes;
/// [`GraphViewMut::full_mut`] deliberately reaches past the mask.
#[derive(Debug)]
pub struct GraphViewMut<'g> {
    full: &'g mut Graph,
    mask: BTreeSet<NodeId>,
}

impl<'g> GraphViewMut<'g> {
    pub(crate) fn new(full: &'g mut Graph, mask: BTreeSet<NodeId>) -> Self {
        Self { full, mask }
    }

    pub fn mask(&self) -> &BTreeSet<NodeId> {
        &self.mask
    }

    /// Read-only view over the same mask.
    pub fn as_view(&self) -> GraphView<'_> {
        GraphView::new(self.full, self.mask.clone())
    }

    pub fn full(&self) -> &Graph {
        self.full
    }

    pub fn full_mut(&mut self) -> &mut Graph {
        self.full
    }

    pub fn node(&self, id: NodeId) -> Result<&Attributes> {
        if !self.mask.contains(&id) {
            return Err(TaskweaveError::UnknownNode(id));
        }
        self.full.node(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Attributes> {
        if !self.mask.contains(&id) {
            return Err(TaskweaveError::UnknownNode(id));
        }
        self.full.node_mut(id)
    }

    pub fn set_node_attr(&mut self, id: NodeId, key: impl Into<String>, value: Value) -> Result<()> {
        self.node_mut(id)?.insert(key.into(), value);
        Ok(())
    }
}
