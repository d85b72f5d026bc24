use taskweave_core::error::Result;
use taskweave_core::types::NodeId;

use crate::view::Topology;

/// Lazy enumeration of every simple path from a start node to a goal.
///
/// Created by [`all_simple_paths`]. Backtracks over unvisited neighbors with
/// an explicit stack; each yielded path starts at the start node and ends at
/// the goal. Exhausting the iterator is the only way to see every path; a
/// fresh call starts over.
pub struct AllSimplePaths<'a, G: ?Sized> {
    graph: &'a G,
    goal: NodeId,
    stack: Vec<Vec<NodeId>>,
}

impl<G: Topology + ?Sized> Iterator for AllSimplePaths<'_, G> {
    type Item = Vec<NodeId>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(path) = self.stack.pop() {
            let Some(&vertex) = path.last() else { continue };
            if vertex == self.goal && path.len() > 1 {
                return Some(path);
            }
            if vertex == self.goal {
                // A path may not revisit its start.
                continue;
            }
            for next in self.graph.neighbors(vertex).into_iter().rev() {
                if !path.contains(&next) {
                    let mut extended = path.clone();
                    extended.push(next);
                    self.stack.push(extended);
                }
            }
        }
        None
    }
}

/// All simple paths from `start` to `goal` over visible edges.
pub fn all_simple_paths<G>(graph: &G, start: NodeId, goal: NodeId) -> Result<AllSimplePaths<'_, G>>
where
    G: Topology + ?Sized,
{
    graph.ensure_node(start)?;
    graph.ensure_node(goal)?;
    Ok(AllSimplePaths {
        graph,
        goal,
        stack: vec![vec![start]],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Graph;
    use taskweave_core::types::Attributes;

    fn graph(n: usize, edges: &[(NodeId, NodeId)]) -> Graph {
        let mut g = Graph::new();
        for _ in 0..n {
            g.add_node(Attributes::new());
        }
        for &(a, b) in edges {
            g.connect(a, b).unwrap();
        }
        g
    }

    #[test]
    fn test_diamond_has_two_paths() {
        let g = graph(4, &[(1, 2), (1, 3), (2, 4), (3, 4)]);
        let paths: Vec<_> = all_simple_paths(&g, 1, 4).unwrap().collect();
        assert_eq!(paths, vec![vec![1, 2, 4], vec![1, 3, 4]]);
    }

    #[test]
    fn test_cycle_does_not_loop() {
        let g = graph(3, &[(1, 2), (2, 1), (2, 3), (3, 2)]);
        let paths: Vec<_> = all_simple_paths(&g, 1, 3).unwrap().collect();
        assert_eq!(paths, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_no_path() {
        let g = graph(3, &[(1, 2)]);
        assert_eq!(all_simple_paths(&g, 1, 3).unwrap().count(), 0);
        assert_eq!(all_simple_paths(&g, 1, 1).unwrap().count(), 0);
    }

    #[test]
    fn test_lazy_first_path() {
        let g = graph(5, &[(1, 2), (2, 5), (1, 3), (3, 4), (4, 5)]);
        let mut paths = all_simple_paths(&g, 1, 5).unwrap();
        assert_eq!(paths.next(), Some(vec![1, 2, 5]));
        assert_eq!(paths.next(), Some(vec![1, 3, 4, 5]));
        assert_eq!(paths.next(), None);
    }
}
