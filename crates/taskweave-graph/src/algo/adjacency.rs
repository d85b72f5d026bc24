use std::collections::BTreeMap;

use serde_json::Value;

use taskweave_core::error::Result;
use taskweave_core::types::NodeId;

use crate::algo::shortest::edge_weight;
use crate::view::Topology;

/// Edge weight map: source id to target id to weight.
pub type WeightedAdjacency = BTreeMap<NodeId, BTreeMap<NodeId, f64>>;

#[derive(Debug, Clone)]
pub struct AdjacencyOptions {
    /// Only record edges in their own direction.
    pub directed: bool,
    /// Record every edge target → source.
    pub reversed: bool,
    /// Scale each row so its weights sum to 1.
    pub stochastic: bool,
    /// Edge attribute holding the raw weight.
    pub weight_key: String,
}

impl Default for AdjacencyOptions {
    fn default() -> Self {
        Self {
            directed: false,
            reversed: false,
            stochastic: false,
            weight_key: super::DEFAULT_WEIGHT_KEY.to_string(),
        }
    }
}

/// Build a weighted adjacency map over the visible nodes.
///
/// Each edge contributes `1 - weight / 2`, so heavier edges count for less
/// and an unweighted edge counts 0.5. Every visible node gets a row, even
/// when it has no edges.
pub fn weighted_adjacency<G>(graph: &G, options: &AdjacencyOptions) -> WeightedAdjacency
where
    G: Topology + ?Sized,
{
    let ids = graph.node_ids();
    let mut adjacency: WeightedAdjacency = ids.iter().map(|&id| (id, BTreeMap::new())).collect();

    for &source in &ids {
        for target in graph.neighbors(source) {
            let weight = 1.0 - edge_weight(graph.edge_attrs(source, target), &options.weight_key) * 0.5;
            let (a, b) = if options.reversed {
                (target, source)
            } else {
                (source, target)
            };
            adjacency.entry(a).or_default().insert(b, weight);
            if !options.directed {
                adjacency.entry(b).or_default().insert(a, weight);
            }
        }
    }

    if options.stochastic {
        for row in adjacency.values_mut() {
            let total: f64 = row.values().sum();
            if total != 0.0 {
                row.values_mut().for_each(|w| *w /= total);
            }
        }
    }

    adjacency
}

/// Degree of each requested node.
///
/// Without `weight`, the number of visible neighbors. With `weight`, the
/// sum of that node attribute over the neighbors (missing counts as 1).
pub fn degree<G>(graph: &G, nodes: &[NodeId], weight: Option<&str>) -> Result<Vec<(NodeId, f64)>>
where
    G: Topology + ?Sized,
{
    nodes
        .iter()
        .map(|&id| {
            graph.ensure_node(id)?;
            let neighbors = graph.neighbors(id);
            let value = match weight {
                None => neighbors.len() as f64,
                Some(key) => neighbors
                    .iter()
                    .map(|&n| {
                        graph
                            .full_graph()
                            .node(n)
                            .ok()
                            .and_then(|attrs| attrs.get(key))
                            .and_then(Value::as_f64)
                            .unwrap_or(1.0)
                    })
                    .sum(),
            };
            Ok((id, value))
        })
        .collect()
}
