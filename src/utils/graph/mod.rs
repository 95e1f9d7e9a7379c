//! Generic directed-graph infrastructure.
//!
//! This module provides a small, index-based directed graph used as the
//! backbone of the per-function control flow graph. Nodes are identified by
//! [`NodeId`], a plain index newtype, and edges are stored as per-node
//! adjacency lists in both directions so that successor and predecessor
//! queries are O(degree).
//!
//! Predecessor *order* is significant for the SSA builder: the j-th operand of
//! a phi node corresponds to the j-th predecessor of its block, so the order
//! in which edges are added is preserved.

pub mod algorithms;

use std::fmt;

use crate::{Error::GraphError, Result};

/// Unique identifier for a node in a [`DirectedGraph`].
///
/// This is a lightweight handle - a plain index into the node table. It is
/// unique within a single graph but not globally.
///
/// # Examples
///
/// ```rust
/// use pseudoscope::utils::graph::NodeId;
///
/// let id = NodeId::new(3);
/// assert_eq!(id.index(), 3);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Creates a new node identifier from an index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A directed graph with ordered adjacency lists.
///
/// Each node carries a payload of type `N`. Edges carry no payload - the
/// control-flow semantics of an edge (taken / fall-through / switch case) live
/// on the basic block itself, which records its successors by role.
///
/// # Examples
///
/// ```rust
/// use pseudoscope::utils::graph::DirectedGraph;
///
/// let mut graph: DirectedGraph<&str> = DirectedGraph::new();
/// let a = graph.add_node("a");
/// let b = graph.add_node("b");
/// graph.add_edge(a, b).unwrap();
///
/// assert_eq!(graph.successors(a).count(), 1);
/// assert_eq!(graph.predecessors(b).next(), Some(a));
/// ```
#[derive(Debug, Clone)]
pub struct DirectedGraph<N> {
    nodes: Vec<N>,
    succs: Vec<Vec<NodeId>>,
    preds: Vec<Vec<NodeId>>,
}

impl<N> Default for DirectedGraph<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> DirectedGraph<N> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            succs: Vec::new(),
            preds: Vec::new(),
        }
    }

    /// Creates an empty graph with pre-allocated capacity for `nodes` nodes.
    #[must_use]
    pub fn with_capacity(nodes: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(nodes),
            succs: Vec::with_capacity(nodes),
            preds: Vec::with_capacity(nodes),
        }
    }

    /// Adds a node with the given payload and returns its identifier.
    pub fn add_node(&mut self, payload: N) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(payload);
        self.succs.push(Vec::new());
        self.preds.push(Vec::new());
        id
    }

    /// Adds a directed edge from `from` to `to`.
    ///
    /// Edge insertion order is preserved in both adjacency lists; the SSA
    /// builder relies on stable predecessor order for phi operands.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] if either endpoint is out of range.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        if from.index() >= self.nodes.len() || to.index() >= self.nodes.len() {
            return Err(GraphError(format!(
                "Edge {from} -> {to} references a node outside the graph ({} nodes)",
                self.nodes.len()
            )));
        }
        self.succs[from.index()].push(to);
        self.preds[to.index()].push(from);
        Ok(())
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns a reference to the payload of a node, or `None` if the
    /// identifier is out of range.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&N> {
        self.nodes.get(id.index())
    }

    /// Returns an iterator over all node identifiers.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId::new)
    }

    /// Returns the successors of a node in edge-insertion order.
    pub fn successors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.succs
            .get(id.index())
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .copied()
    }

    /// Returns the predecessors of a node in edge-insertion order.
    pub fn predecessors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.preds
            .get(id.index())
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .copied()
    }

    /// Returns the position of `pred` within the predecessor list of `node`.
    ///
    /// This is the phi-operand slot that values flowing along the edge
    /// `pred -> node` occupy.
    #[must_use]
    pub fn predecessor_index(&self, node: NodeId, pred: NodeId) -> Option<usize> {
        self.preds
            .get(node.index())?
            .iter()
            .position(|&p| p == pred)
    }
}
