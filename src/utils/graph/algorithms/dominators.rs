//! Dominator tree computation using the Lengauer-Tarjan algorithm.
//!
//! The dominator tree drives two of the central constructions of the mid-end:
//! phi placement (via dominance frontiers) and SSA renaming (via a pre-order
//! walk of the tree).
//!
//! # Theory
//!
//! A node `d` **dominates** a node `n` if every path from the entry node to `n`
//! must pass through `d`. The **immediate dominator** of `n` (idom(n)) is the
//! unique node that strictly dominates `n` but does not strictly dominate any
//! other dominator of `n`. Making each node's immediate dominator its parent
//! yields the dominator tree, rooted at the entry node.
//!
//! The **dominance frontier** of `n` is the set of nodes where `n`'s dominance
//! ends: nodes `y` such that `n` dominates a predecessor of `y` but does not
//! strictly dominate `y` itself. These are exactly the merge points where a
//! definition inside `n`'s region may meet other definitions, i.e. where phi
//! nodes belong.
//!
//! # Algorithm
//!
//! This implementation uses the Lengauer-Tarjan algorithm with simple path
//! compression, O(V α(V)) in practice. Frontiers use the standard
//! predecessor-runner formulation from Cytron et al.

use rustc_hash::FxHashSet;

use crate::utils::graph::{DirectedGraph, NodeId};

/// Result of dominator tree computation.
///
/// Each reachable node (except the entry) has exactly one immediate dominator.
/// Unreachable nodes are not part of the tree; queries involving them return
/// `false` / `None`.
///
/// # Examples
///
/// ```rust
/// use pseudoscope::utils::graph::{algorithms::compute_dominators, DirectedGraph, NodeId};
///
/// // entry -> a -> b
/// let mut graph: DirectedGraph<&str> = DirectedGraph::new();
/// let entry = graph.add_node("entry");
/// let a = graph.add_node("a");
/// let b = graph.add_node("b");
/// graph.add_edge(entry, a).unwrap();
/// graph.add_edge(a, b).unwrap();
///
/// let tree = compute_dominators(&graph, entry);
/// assert!(tree.dominates(entry, b));
/// assert_eq!(tree.immediate_dominator(b), Some(a));
/// ```
#[derive(Debug, Clone)]
pub struct DominatorTree {
    /// The entry (root) node of the dominator tree
    entry: NodeId,
    /// Immediate dominator for each node; the entry maps to itself and
    /// unreachable nodes map to themselves (and are reported unreachable)
    idom: Vec<NodeId>,
    /// Whether each node was reached by the DFS numbering pass
    reachable: Vec<bool>,
}

impl DominatorTree {
    /// Returns the root of the dominator tree, which always equals the
    /// function entry it was computed from.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.entry
    }

    /// Returns `true` if the node was reachable from the entry.
    #[must_use]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        self.reachable.get(node.index()).copied().unwrap_or(false)
    }

    /// Returns the immediate dominator of a node.
    ///
    /// Returns `None` for the entry node and for unreachable nodes.
    #[must_use]
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        if node == self.entry || !self.is_reachable(node) {
            None
        } else {
            Some(self.idom[node.index()])
        }
    }

    /// Checks if node `a` dominates node `b`.
    ///
    /// A node dominates itself. Returns `false` when either node is
    /// unreachable.
    #[must_use]
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        if a == b {
            return true;
        }

        let mut current = b;
        while current != self.entry {
            let idom = self.idom[current.index()];
            if idom == a {
                return true;
            }
            if idom == current {
                return false;
            }
            current = idom;
        }

        // Only the entry dominates the entry
        a == self.entry
    }

    /// Checks if node `a` strictly dominates node `b` (dominates and `a != b`).
    #[must_use]
    pub fn strictly_dominates(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Returns the children of a node in the dominator tree, i.e. the nodes
    /// immediately dominated by it, in ascending node order.
    #[must_use]
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        for i in 0..self.idom.len() {
            let n = NodeId::new(i);
            if n != self.entry && self.reachable[i] && self.idom[i] == node {
                result.push(n);
            }
        }
        result
    }
}

/// Computes the dominator tree of `graph` rooted at `entry` using the
/// Lengauer-Tarjan algorithm.
///
/// # Algorithm Overview
///
/// 1. **DFS numbering**: assign DFS numbers and record the DFS tree
/// 2. **Semidominators**: computed in reverse DFS order via the
///    Semidominator Theorem
/// 3. **Implicit idoms**: bucket processing with link-eval path compression
/// 4. **Explicit idoms**: a final forward sweep resolves deferred entries
#[must_use]
pub fn compute_dominators<N>(graph: &DirectedGraph<N>, entry: NodeId) -> DominatorTree {
    let node_count = graph.node_count();
    if node_count == 0 {
        return DominatorTree {
            entry,
            idom: Vec::new(),
            reachable: Vec::new(),
        };
    }

    let mut lt = LengauerTarjan::new(node_count);
    lt.compute(graph, entry);

    let reachable = lt.dfnum.iter().map(|&d| d != 0).collect();
    DominatorTree {
        entry,
        idom: lt.idom,
        reachable,
    }
}

/// Computes the dominance frontier of every node.
///
/// Returned as one set per node, indexed by node id. Uses the standard
/// two-predecessor runner formulation: for each join node `y`, walk each
/// predecessor's dominator chain up to (but excluding) idom(y), adding `y` to
/// the frontier of every node passed.
#[must_use]
pub fn compute_dominance_frontiers<N>(
    graph: &DirectedGraph<N>,
    tree: &DominatorTree,
) -> Vec<FxHashSet<NodeId>> {
    let mut frontiers: Vec<FxHashSet<NodeId>> = vec![FxHashSet::default(); graph.node_count()];

    for node in graph.node_ids() {
        if !tree.is_reachable(node) {
            continue;
        }
        let preds: Vec<NodeId> = graph
            .predecessors(node)
            .filter(|&p| tree.is_reachable(p))
            .collect();
        if preds.len() < 2 {
            continue;
        }
        let Some(idom) = tree.immediate_dominator(node) else {
            continue;
        };

        for pred in preds {
            let mut runner = pred;
            while runner != idom {
                frontiers[runner.index()].insert(node);
                match tree.immediate_dominator(runner) {
                    Some(next) => runner = next,
                    None => break,
                }
            }
        }
    }

    frontiers
}

/// Internal state for the Lengauer-Tarjan algorithm.
struct LengauerTarjan {
    /// DFS number for each node (0 = not visited)
    dfnum: Vec<usize>,
    /// Node with each DFS number (inverse of dfnum)
    vertex: Vec<NodeId>,
    /// Parent in the DFS tree
    parent: Vec<NodeId>,
    /// Semidominator candidates
    semi: Vec<NodeId>,
    /// Immediate dominator (final result)
    idom: Vec<NodeId>,
    /// Ancestor in the link-eval forest
    ancestor: Vec<Option<NodeId>>,
    /// Best node on the path to the ancestor (path compression)
    best: Vec<NodeId>,
    /// Nodes whose semidominator is this node
    bucket: Vec<Vec<NodeId>>,
    /// Current DFS counter
    dfs_counter: usize,
}

impl LengauerTarjan {
    fn new(n: usize) -> Self {
        Self {
            dfnum: vec![0; n],
            vertex: vec![NodeId::new(0); n],
            parent: vec![NodeId::new(0); n],
            semi: (0..n).map(NodeId::new).collect(),
            idom: (0..n).map(NodeId::new).collect(),
            ancestor: vec![None; n],
            best: (0..n).map(NodeId::new).collect(),
            bucket: vec![Vec::new(); n],
            dfs_counter: 0,
        }
    }

    fn compute<N>(&mut self, graph: &DirectedGraph<N>, entry: NodeId) {
        // Phase 1: DFS numbering
        self.dfs(graph, entry);

        // Phases 2 + 3: semidominators and implicit idoms, in reverse DFS order
        for i in (1..self.dfs_counter).rev() {
            let w = self.vertex[i];
            let parent_w = self.parent[w.index()];

            // semi(w) = min over predecessors v of: dfnum(v) if v comes before w,
            // else semi(eval(v))
            let preds: Vec<NodeId> = graph.predecessors(w).collect();
            for v in preds {
                if self.dfnum[v.index()] == 0 {
                    // Unreachable predecessor
                    continue;
                }
                let u = self.eval(v);
                if self.dfnum[self.semi[u.index()].index()]
                    < self.dfnum[self.semi[w.index()].index()]
                {
                    self.semi[w.index()] = self.semi[u.index()];
                }
            }

            let semi_w = self.semi[w.index()];
            self.bucket[semi_w.index()].push(w);
            self.ancestor[w.index()] = Some(parent_w);

            // Process the bucket of w's DFS parent
            let bucket = std::mem::take(&mut self.bucket[parent_w.index()]);
            for v in bucket {
                let u = self.eval(v);
                if self.semi[u.index()] == self.semi[v.index()] {
                    self.idom[v.index()] = parent_w;
                } else {
                    // Deferred; resolved in phase 4
                    self.idom[v.index()] = u;
                }
            }
        }

        // Phase 4: resolve deferred idoms in forward DFS order
        for i in 1..self.dfs_counter {
            let w = self.vertex[i];
            if self.idom[w.index()] != self.semi[w.index()] {
                self.idom[w.index()] = self.idom[self.idom[w.index()].index()];
            }
        }

        self.idom[entry.index()] = entry;
    }

    /// Iterative DFS assigning numbers and recording the DFS tree.
    fn dfs<N>(&mut self, graph: &DirectedGraph<N>, start: NodeId) {
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            let idx = node.index();
            if self.dfnum[idx] != 0 {
                continue;
            }

            self.dfs_counter += 1;
            self.dfnum[idx] = self.dfs_counter;
            self.vertex[self.dfs_counter - 1] = node;

            let succs: Vec<NodeId> = graph.successors(node).collect();
            for succ in succs.into_iter().rev() {
                if self.dfnum[succ.index()] == 0 {
                    self.parent[succ.index()] = node;
                    stack.push(succ);
                }
            }
        }
    }

    /// Returns the node with minimal semidominator on the forest path from `v`
    /// towards the root, compressing the path along the way.
    fn eval(&mut self, v: NodeId) -> NodeId {
        if self.ancestor[v.index()].is_none() {
            return v;
        }
        self.compress(v);
        self.best[v.index()]
    }

    /// Iterative path compression for the link-eval forest.
    fn compress(&mut self, v: NodeId) {
        // Collect the path from v up to the forest root
        let mut path = vec![v];
        let mut current = v;
        while let Some(anc) = self.ancestor[current.index()] {
            if self.ancestor[anc.index()].is_none() {
                break;
            }
            path.push(anc);
            current = anc;
        }

        // Walk back down, folding in the best ancestor values
        for &node in path.iter().rev() {
            let Some(anc) = self.ancestor[node.index()] else {
                continue;
            };
            if self.ancestor[anc.index()].is_some() {
                let anc_best = self.best[anc.index()];
                if self.dfnum[self.semi[anc_best.index()].index()]
                    < self.dfnum[self.semi[self.best[node.index()].index()].index()]
                {
                    self.best[node.index()] = anc_best;
                }
                self.ancestor[node.index()] = self.ancestor[anc.index()];
            }
        }
    }
}
