use std::collections::{BTreeMap, BinaryHeap};

use rand::Rng;
use tracing::{debug, warn};

use taskweave_core::types::NodeId;

use crate::algo::adjacency::{weighted_adjacency, AdjacencyOptions};
use crate::algo::shortest::{edge_weight, Frontier};
use crate::view::Topology;

/// Score per visible node.
pub type CentralityScores = BTreeMap<NodeId, f64>;

/// Brandes betweenness centrality using weighted shortest paths.
///
/// Credit for a pair is split across all shortest paths between them in
/// proportion to path counts. On undirected graphs each pair is seen from
/// both ends, so scores are halved. With `normalized`, scores are divided
/// by the largest one.
pub fn betweenness_centrality<G>(graph: &G, normalized: bool, weight_key: &str) -> CentralityScores
where
    G: Topology + ?Sized,
{
    let ids = graph.node_ids();
    let mut betweenness: CentralityScores = ids.iter().map(|&id| (id, 0.0)).collect();

    for &source in &ids {
        let mut order = Vec::with_capacity(ids.len());
        let mut preds: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        let mut sigma: BTreeMap<NodeId, f64> = ids.iter().map(|&id| (id, 0.0)).collect();
        let mut dist: BTreeMap<NodeId, f64> = BTreeMap::new();
        let mut seen: BTreeMap<NodeId, f64> = BTreeMap::from([(source, 0.0)]);
        sigma.insert(source, 1.0);

        let mut queue = BinaryHeap::from([Frontier {
            cost: 0.0,
            node: source,
            via: source,
        }]);

        while let Some(Frontier { cost, node, via }) = queue.pop() {
            if dist.contains_key(&node) {
                continue;
            }
            if node != source {
                let carried = sigma[&via];
                *sigma.entry(node).or_default() += carried;
            }
            order.push(node);
            dist.insert(node, cost);

            for next in graph.neighbors(node) {
                if dist.contains_key(&next) {
                    continue;
                }
                let candidate = cost + edge_weight(graph.edge_attrs(node, next), weight_key);
                match seen.get(&next) {
                    Some(&known) if candidate == known => {
                        let carried = sigma[&node];
                        *sigma.entry(next).or_default() += carried;
                        preds.entry(next).or_default().push(node);
                    }
                    Some(&known) if candidate > known => {}
                    _ => {
                        seen.insert(next, candidate);
                        sigma.insert(next, 0.0);
                        preds.insert(next, vec![node]);
                        queue.push(Frontier {
                            cost: candidate,
                            node: next,
                            via: node,
                        });
                    }
                }
            }
        }

        let mut delta: BTreeMap<NodeId, f64> = BTreeMap::new();
        while let Some(w) = order.pop() {
            let dw = delta.get(&w).copied().unwrap_or(0.0);
            for &v in preds.get(&w).map(Vec::as_slice).unwrap_or(&[]) {
                let share = sigma[&v] / sigma[&w] * (1.0 + dw);
                *delta.entry(v).or_default() += share;
            }
            if w != source {
                *betweenness.entry(w).or_default() += dw;
            }
        }
    }

    if !graph.is_directed() {
        betweenness.values_mut().for_each(|score| *score /= 2.0);
    }

    if normalized {
        let max = betweenness.values().copied().fold(0.0, f64::max);
        if max > 0.0 {
            betweenness.values_mut().for_each(|score| *score /= max);
        }
    }

    betweenness
}

/// Tuning for [`eigenvector_centrality`].
#[derive(Debug, Clone)]
pub struct EigenvectorOptions {
    /// Scale the result so the top node scores 1.
    pub normalized: bool,
    /// Score incoming rather than outgoing connections.
    pub reversed: bool,
    /// Per-node multiplier on neighbor contributions. Missing nodes use 1.
    pub rating: BTreeMap<NodeId, f64>,
    /// Initial vector. Random when unset; missing nodes start at 0.
    pub start: Option<BTreeMap<NodeId, f64>>,
    pub iterations: usize,
    pub tolerance: f64,
}

impl Default for EigenvectorOptions {
    fn default() -> Self {
        Self {
            normalized: true,
            reversed: true,
            rating: BTreeMap::new(),
            start: None,
            iterations: 100,
            tolerance: 1e-4,
        }
    }
}

/// Eigenvector centrality by power iteration.
///
/// Each neighbor contributes a small constant on top of its weighted
/// score, which keeps isolated chains from collapsing to zero too early.
/// Convergence is reached when the summed absolute change drops below
/// `|V| * tolerance`. If the iteration budget runs out first, a warning is
/// logged and every node scores 0.
pub fn eigenvector_centrality<G>(graph: &G, options: &EigenvectorOptions) -> CentralityScores
where
    G: Topology + ?Sized,
{
    let ids = graph.node_ids();
    let weights = weighted_adjacency(
        graph,
        &AdjacencyOptions {
            directed: true,
            reversed: options.reversed,
            ..AdjacencyOptions::default()
        },
    );

    let mut x: CentralityScores = match &options.start {
        Some(start) => ids
            .iter()
            .map(|id| (*id, start.get(id).copied().unwrap_or(0.0)))
            .collect(),
        None => {
            let mut rng = rand::thread_rng();
            ids.iter().map(|&id| (id, rng.gen::<f64>())).collect()
        }
    };
    normalize_sum(&mut x);

    for iteration in 0..options.iterations {
        let previous = x;
        x = ids.iter().map(|&id| (id, 0.0)).collect();
        for (&n, score) in x.iter_mut() {
            let rating = options.rating.get(&n).copied().unwrap_or(1.0);
            for (nbr, w) in weights.get(&n).into_iter().flatten() {
                *score += 0.01 + previous.get(nbr).copied().unwrap_or(0.0) * w * rating;
            }
        }
        normalize_sum(&mut x);

        let err: f64 = x
            .iter()
            .map(|(n, v)| (v - previous.get(n).copied().unwrap_or(0.0)).abs())
            .sum();
        if err < ids.len() as f64 * options.tolerance {
            debug!(iterations = iteration + 1, "Eigenvector centrality converged");
            if options.normalized {
                let max = x.values().copied().fold(0.0, f64::max);
                if max > 0.0 {
                    x.values_mut().for_each(|v| *v /= max);
                }
            }
            return x;
        }
    }

    warn!(
        iterations = options.iterations,
        "Eigenvector centrality did not converge, scoring every node 0"
    );
    ids.into_iter().map(|id| (id, 0.0)).collect()
}

fn normalize_sum(x: &mut CentralityScores) {
    let total: f64 = x.values().sum();
    if total != 0.0 {
        x.values_mut().for_each(|v| *v /= total);
    }
}
