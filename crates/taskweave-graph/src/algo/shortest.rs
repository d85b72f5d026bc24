use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashSet};

use serde_json::Value;

use taskweave_core::error::{Result, TaskweaveError};
use taskweave_core::types::{Attributes, NodeId};

use crate::view::Topology;

/// Edge attribute read as the edge weight unless told otherwise.
pub const DEFAULT_WEIGHT_KEY: &str = "weight";

/// Numeric weight of an edge; absent or non-numeric weights count as 1.
pub(crate) fn edge_weight(attrs: Option<&Attributes>, key: &str) -> f64 {
    attrs
        .and_then(|a| a.get(key))
        .and_then(Value::as_f64)
        .unwrap_or(1.0)
}

/// Min-heap entry ordered by cost, then node id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Frontier {
    pub cost: f64,
    pub node: NodeId,
    pub via: NodeId,
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
            .then_with(|| other.via.cmp(&self.via))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dijkstra's shortest path from `start` to `goal`.
///
/// Returns the node sequence including both endpoints. Weights are read
/// from `weight_key` and must be non-negative. Fails with
/// [`TaskweaveError::Unreachable`] when the queue runs dry before the goal
/// is settled.
pub fn dijkstra<G>(graph: &G, start: NodeId, goal: NodeId, weight_key: &str) -> Result<Vec<NodeId>>
where
    G: Topology + ?Sized,
{
    graph.ensure_node(start)?;
    graph.ensure_node(goal)?;

    let mut settled = HashSet::new();
    let mut came_from: BTreeMap<NodeId, NodeId> = BTreeMap::new();
    let mut queue = BinaryHeap::from([Frontier {
        cost: 0.0,
        node: start,
        via: start,
    }]);

    while let Some(Frontier { cost, node, via }) = queue.pop() {
        if !settled.insert(node) {
            continue;
        }
        if node != start {
            came_from.insert(node, via);
        }
        if node == goal {
            let mut path = vec![goal];
            let mut cursor = goal;
            while let Some(&prev) = came_from.get(&cursor) {
                path.push(prev);
                cursor = prev;
            }
            path.reverse();
            return Ok(path);
        }
        for next in graph.neighbors(node) {
            if !settled.contains(&next) {
                let step = edge_weight(graph.edge_attrs(node, next), weight_key);
                queue.push(Frontier {
                    cost: cost + step,
                    node: next,
                    via: node,
                });
            }
        }
    }

    Err(TaskweaveError::Unreachable { start, goal })
}

/// Total weight along `path`. Missing edges make the path invalid.
pub fn path_cost<G>(graph: &G, path: &[NodeId], weight_key: &str) -> Result<f64>
where
    G: Topology + ?Sized,
{
    path.windows(2).try_fold(0.0, |total, pair| {
        let attrs = graph
            .edge_attrs(pair[0], pair[1])
            .ok_or(TaskweaveError::UnknownEdge(pair[0], pair[1]))?;
        Ok(total + edge_weight(Some(attrs), weight_key))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::paths::all_simple_paths;
    use crate::Graph;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use serde_json::json;

    fn weighted(n: usize, edges: &[(NodeId, NodeId, f64)]) -> Graph {
        let mut g = Graph::new();
        for _ in 0..n {
            g.add_node(Attributes::new());
        }
        for &(a, b, w) in edges {
            let mut attrs = Attributes::new();
            attrs.insert("weight".into(), json!(w));
            g.add_edge(a, b, attrs).unwrap();
        }
        g
    }

    #[test]
    fn test_prefers_cheaper_detour() {
        let g = weighted(4, &[(1, 4, 10.0), (1, 2, 1.0), (2, 3, 1.0), (3, 4, 1.0)]);
        assert_eq!(dijkstra(&g, 1, 4, DEFAULT_WEIGHT_KEY).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_missing_weight_defaults_to_one() {
        let mut g = weighted(3, &[(1, 3, 5.0)]);
        g.connect(1, 2).unwrap();
        g.connect(2, 3).unwrap();
        assert_eq!(dijkstra(&g, 1, 3, DEFAULT_WEIGHT_KEY).unwrap(), vec![1, 2, 3]);
        assert_eq!(path_cost(&g, &[1, 2, 3], DEFAULT_WEIGHT_KEY).unwrap(), 2.0);
    }

    #[test]
    fn test_start_equals_goal() {
        let g = weighted(1, &[]);
        assert_eq!(dijkstra(&g, 1, 1, DEFAULT_WEIGHT_KEY).unwrap(), vec![1]);
    }

    #[test]
    fn test_unreachable_goal_is_an_error() {
        let g = weighted(3, &[(1, 2, 1.0)]);
        let err = dijkstra(&g, 1, 3, DEFAULT_WEIGHT_KEY).unwrap_err();
        assert!(matches!(err, TaskweaveError::Unreachable { start: 1, goal: 3 }));
    }

    #[test]
    fn test_view_hides_shortcut() {
        let g = weighted(4, &[(1, 4, 10.0), (1, 2, 1.0), (2, 4, 1.0)]);
        let view = g.subgraph([1, 4]).unwrap();
        assert_eq!(dijkstra(&view, 1, 4, DEFAULT_WEIGHT_KEY).unwrap(), vec![1, 4]);
    }

    #[test]
    fn test_matches_brute_force_on_small_graphs() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let n = rng.gen_range(2..=8);
            let mut edges = Vec::new();
            for a in 1..=n as NodeId {
                for b in 1..=n as NodeId {
                    if a != b && rng.gen_bool(0.35) {
                        edges.push((a, b, rng.gen_range(1..=9) as f64));
                    }
                }
            }
            let g = weighted(n, &edges);
            let goal = n as NodeId;
            let brute = all_simple_paths(&g, 1, goal)
                .unwrap()
                .map(|p| path_cost(&g, &p, DEFAULT_WEIGHT_KEY).unwrap())
                .fold(f64::INFINITY, f64::min);

            match dijkstra(&g, 1, goal, DEFAULT_WEIGHT_KEY) {
                Ok(path) => {
                    assert_eq!(path.first(), Some(&1));
                    assert_eq!(path.last(), Some(&goal));
                    assert_eq!(path_cost(&g, &path, DEFAULT_WEIGHT_KEY).unwrap(), brute);
                }
                Err(TaskweaveError::Unreachable { .. }) => assert!(brute.is_infinite()),
                Err(e) => panic!("unexpected error {}", e),
            }
        }
    }
}
