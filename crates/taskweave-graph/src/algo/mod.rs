//! Graph algorithms over any [`Topology`](crate::Topology).
//!
//! Everything here respects subgraph masks: a view only exposes its
//! visible nodes and the edges between them, so running an algorithm on a
//! view never reaches nodes outside it.

pub mod adjacency;
pub mod centrality;
pub mod paths;
pub mod shortest;
pub mod traversal;

pub use adjacency::{degree, weighted_adjacency, AdjacencyOptions, WeightedAdjacency};
pub use centrality::{
    betweenness_centrality, eigenvector_centrality, CentralityScores, EigenvectorOptions,
};
pub use paths::{all_simple_paths, AllSimplePaths};
pub use shortest::{dijkstra, path_cost, DEFAULT_WEIGHT_KEY};
pub use traversal::{
    bfs, descendants, dfs, is_reachable, traverse, SearchOrder, DEFAULT_MAX_DEPTH,
};
