//! Graph traversal orders.
//!
//! Depth-first search doubles as the DFS spanning tree of the specification:
//! nodes that do not appear in [`dfs_order`] are unreachable from the chosen
//! root and can be discarded by the caller.

use crate::utils::graph::{DirectedGraph, NodeId};

/// Returns the nodes reachable from `root` in depth-first order.
///
/// Successors are visited in edge-insertion order, so the result is
/// deterministic for a given construction sequence. Unreachable nodes are
/// absent from the result, which is how the function model discards dead
/// blocks when a lifter reports multiple entry candidates.
#[must_use]
pub fn dfs_order<N>(graph: &DirectedGraph<N>, root: NodeId) -> Vec<NodeId> {
    let mut visited = vec![false; graph.node_count()];
    let mut order = Vec::with_capacity(graph.node_count());
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if node.index() >= visited.len() || visited[node.index()] {
            continue;
        }
        visited[node.index()] = true;
        order.push(node);

        // Push in reverse so the first successor is visited first
        let succs: Vec<NodeId> = graph.successors(node).collect();
        for succ in succs.into_iter().rev() {
            if !visited[succ.index()] {
                stack.push(succ);
            }
        }
    }

    order
}

/// Returns the reachable nodes in postorder (children before parents).
#[must_use]
pub fn postorder<N>(graph: &DirectedGraph<N>, root: NodeId) -> Vec<NodeId> {
    let mut visited = vec![false; graph.node_count()];
    let mut order = Vec::with_capacity(graph.node_count());
    // (node, next successor index to expand)
    let mut stack: Vec<(NodeId, usize)> = Vec::new();

    if root.index() < visited.len() {
        visited[root.index()] = true;
        stack.push((root, 0));
    }

    while let Some((node, succ_idx)) = stack.pop() {
        let succs: Vec<NodeId> = graph.successors(node).collect();
        if succ_idx < succs.len() {
            stack.push((node, succ_idx + 1));
            let succ = succs[succ_idx];
            if !visited[succ.index()] {
                visited[succ.index()] = true;
                stack.push((succ, 0));
            }
        } else {
            order.push(node);
        }
    }

    order
}

/// Returns the reachable nodes in reverse postorder.
///
/// For acyclic regions this visits every node before its successors, which is
/// the natural order for forward analyses.
#[must_use]
pub fn reverse_postorder<N>(graph: &DirectedGraph<N>, root: NodeId) -> Vec<NodeId> {
    let mut order = postorder(graph, root);
    order.reverse();
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> DirectedGraph<()> {
        let mut g = DirectedGraph::new();
        for _ in 0..4 {
            g.add_node(());
        }
        g.add_edge(NodeId::new(0), NodeId::new(1)).unwrap();
        g.add_edge(NodeId::new(0), NodeId::new(2)).unwrap();
        g.add_edge(NodeId::new(1), NodeId::new(3)).unwrap();
        g.add_edge(NodeId::new(2), NodeId::new(3)).unwrap();
        g
    }

    #[test]
    fn test_dfs_visits_all_reachable() {
        let g = diamond();
        let order = dfs_order(&g, NodeId::new(0));
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], NodeId::new(0));
    }

    #[test]
    fn test_dfs_skips_unreachable() {
        let mut g = diamond();
        g.add_node(()); // node 4, no incoming edges
        let order = dfs_order(&g, NodeId::new(0));
        assert_eq!(order.len(), 4);
        assert!(!order.contains(&NodeId::new(4)));
    }

    #[test]
    fn test_postorder_children_first() {
        let g = diamond();
        let po = postorder(&g, NodeId::new(0));
        assert_eq!(po.len(), 4);
        // Root is last in postorder
        assert_eq!(po[3], NodeId::new(0));
        // The join node comes before both branch nodes
        let pos =
            |n: usize| po.iter().position(|&x| x == NodeId::new(n)).unwrap();
        assert!(pos(3) < pos(1));
        assert!(pos(3) < pos(2));
    }

    #[test]
    fn test_reverse_postorder_root_first() {
        let g = diamond();
        let rpo = reverse_postorder(&g, NodeId::new(0));
        assert_eq!(rpo[0], NodeId::new(0));
        assert_eq!(rpo[3], NodeId::new(3));
    }

    #[test]
    fn test_postorder_with_cycle_terminates() {
        // 0 -> 1 -> 2 -> 1 (back edge), 2 -> 3
        let mut g = DirectedGraph::new();
        for _ in 0..4 {
            g.add_node(());
        }
        g.add_edge(NodeId::new(0), NodeId::new(1)).unwrap();
        g.add_edge(NodeId::new(1), NodeId::new(2)).unwrap();
        g.add_edge(NodeId::new(2), NodeId::new(1)).unwrap();
        g.add_edge(NodeId::new(2), NodeId::new(3)).unwrap();

        let po = postorder(&g, NodeId::new(0));
        assert_eq!(po.len(), 4);
        assert_eq!(po.last(), Some(&NodeId::new(0)));
    }
}
