//! Mutable attributed graph, subgraph views, and the algorithms the
//! workflow engine uses for lineage discovery and analysis.

pub mod algo;
pub mod document;
pub mod graph;
pub mod orm;
pub mod view;

pub use document::GraphDocument;
pub use graph::Graph;
pub use orm::GraphOrm;
pub use view::{GraphView, GraphViewMut, Topology};
