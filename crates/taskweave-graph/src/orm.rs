use taskweave_core::error::{Result, TaskweaveError};
use taskweave_core::types::{Attributes, NodeId};

use crate::graph::Graph;

/// Maps node attribute patterns to behavior variants.
///
/// A pattern matches a node when every key it names is present on the
/// node with an equal value. Graph storage is untouched: the variant is
/// looked up at dispatch time from the node's current attributes.
#[derive(Debug, Clone)]
pub struct GraphOrm<V> {
    mappings: Vec<(V, Attributes)>,
}

impl<V> Default for GraphOrm<V> {
    fn default() -> Self {
        Self {
            mappings: Vec::new(),
        }
    }
}

impl<V: Clone> GraphOrm<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `variant` for nodes matching `pattern`. Empty patterns never match.
    pub fn map_node(&mut self, variant: V, pattern: Attributes) {
        self.mappings.push((variant, pattern));
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// The variant whose pattern matches `attributes`, if any.
    ///
    /// More than one match is a configuration error.
    pub fn resolve(&self, node: NodeId, attributes: &Attributes) -> Result<Option<V>> {
        let mut matched = self
            .mappings
            .iter()
            .filter(|(_, pattern)| matches(pattern, attributes))
            .map(|(variant, _)| variant);

        let first = matched.next().cloned();
        let extra = matched.count();
        if extra > 0 {
            return Err(TaskweaveError::AmbiguousMapping {
                node,
                count: extra + 1,
            });
        }
        Ok(first)
    }

    /// Resolve the variant of a node in `graph`.
    pub fn resolve_node(&self, graph: &Graph, node: NodeId) -> Result<Option<V>> {
        self.resolve(node, graph.node(node)?)
    }
}

fn matches(pattern: &Attributes, attributes: &Attributes) -> bool {
    !pattern.is_empty()
        && pattern
            .iter()
            .all(|(key, value)| attributes.get(key) == Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    enum Kind {
        Plain,
        Fancy,
    }

    fn pattern(task_type: &str) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("task_type".into(), json!(task_type));
        attrs
    }

    #[test]
    fn test_resolves_by_discriminator() {
        let mut orm = GraphOrm::new();
        orm.map_node(Kind::Plain, pattern("Task"));
        orm.map_node(Kind::Fancy, pattern("Choice"));

        let mut g = Graph::new();
        let a = g.add_node(pattern("Choice"));
        let b = g.add_node(pattern("Other"));
        assert_eq!(orm.resolve_node(&g, a).unwrap(), Some(Kind::Fancy));
        assert_eq!(orm.resolve_node(&g, b).unwrap(), None);
        assert!(orm.resolve_node(&g, 9).is_err());
    }

    #[test]
    fn test_ambiguous_mapping() {
        let mut orm = GraphOrm::new();
        orm.map_node(Kind::Plain, pattern("Task"));
        orm.map_node(Kind::Fancy, pattern("Task"));
        let err = orm.resolve(3, &pattern("Task")).unwrap_err();
        assert!(matches!(err, TaskweaveError::AmbiguousMapping { node: 3, count: 2 }));
    }

    #[test]
    fn test_empty_pattern_never_matches() {
        let mut orm = GraphOrm::new();
        orm.map_node(Kind::Plain, Attributes::new());
        assert_eq!(orm.resolve(1, &pattern("Task")).unwrap(), None);
    }
}
