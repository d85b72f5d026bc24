use std::collections::{BTreeSet, VecDeque};

use tracing::debug;

use taskweave_core::error::Result;
use taskweave_core::types::NodeId;

use crate::view::Topology;

/// Default cap on the number of nodes a traversal expands.
pub const DEFAULT_MAX_DEPTH: usize = 10_000;

/// Frontier discipline for [`traverse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchOrder {
    /// Stack frontier.
    #[default]
    DepthFirst,
    /// Queue frontier.
    BreadthFirst,
}

/// Visit nodes reachable from `root`, in visit order, `root` first.
///
/// `max_depth` caps the number of expanded nodes, not the graph distance:
/// the walk stops as soon as `max_depth` nodes have been visited. A cap of
/// zero visits nothing.
pub fn traverse<G>(graph: &G, root: NodeId, order: SearchOrder, max_depth: usize) -> Result<Vec<NodeId>>
where
    G: Topology + ?Sized,
{
    graph.ensure_node(root)?;
    debug!(root, ?order, max_depth, "Graph traversal");

    let mut visited = Vec::new();
    let mut seen = BTreeSet::new();
    let mut frontier = VecDeque::from([root]);

    while visited.len() < max_depth {
        let next = match order {
            SearchOrder::DepthFirst => frontier.pop_back(),
            SearchOrder::BreadthFirst => frontier.pop_front(),
        };
        let Some(node) = next else { break };
        if !seen.insert(node) {
            continue;
        }
        visited.push(node);

        let fresh = graph.neighbors(node).into_iter().filter(|n| !seen.contains(n));
        match order {
            // Reversed so the lowest id is popped first.
            SearchOrder::DepthFirst => {
                let mut fresh: Vec<NodeId> = fresh.collect();
                fresh.reverse();
                frontier.extend(fresh);
            }
            SearchOrder::BreadthFirst => frontier.extend(fresh),
        }
    }

    Ok(visited)
}

pub fn dfs<G: Topology + ?Sized>(graph: &G, root: NodeId, max_depth: usize) -> Result<Vec<NodeId>> {
    traverse(graph, root, SearchOrder::DepthFirst, max_depth)
}

pub fn bfs<G: Topology + ?Sized>(graph: &G, root: NodeId, max_depth: usize) -> Result<Vec<NodeId>> {
    traverse(graph, root, SearchOrder::BreadthFirst, max_depth)
}

/// Whether `destination` can be reached from `root` over visible edges.
pub fn is_reachable<G: Topology + ?Sized>(graph: &G, root: NodeId, destination: NodeId) -> Result<bool> {
    graph.ensure_node(destination)?;
    Ok(dfs(graph, root, usize::MAX)?.contains(&destination))
}

/// Every node reachable from `root`, excluding `root`, in ascending id order.
pub fn descendants<G: Topology + ?Sized>(graph: &G, root: NodeId) -> Result<Vec<NodeId>> {
    let mut found: Vec<NodeId> = dfs(graph, root, usize::MAX)?
        .into_iter()
        .filter(|&n| n != root)
        .collect();
    found.sort_unstable();
    Ok(found)
}
