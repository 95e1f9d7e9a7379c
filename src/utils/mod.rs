//! Shared infrastructure used across the analysis pipeline.
//!
//! Currently this contains the generic directed-graph structure and the graph
//! algorithms (traversals, dominators, dominance frontiers) that the control
//! flow graph and the SSA builder are layered on.

pub mod graph;
