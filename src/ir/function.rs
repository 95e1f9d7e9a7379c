//! The per-function unit of the mid-end.
//!
//! A [`Function`] owns everything the pipeline touches for one function: the
//! basic blocks, the expression arena, the declared arguments and locals, and
//! the synthetic `uninit` container holding placeholder definitions for
//! locations that are read before any write (stack pointer, argument
//! registers, and the like).
//!
//! The [`Cfg`] view is built on demand from the blocks' successor addresses
//! and provides dominator and dominance-frontier queries, both computed
//! lazily and cached.

use std::sync::OnceLock;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    ir::{BasicBlock, Container, ExprArena, ExprId, Statement},
    utils::graph::{
        algorithms::{
            compute_dominance_frontiers, compute_dominators, dfs_order, DominatorTree,
        },
        DirectedGraph, NodeId,
    },
    Error::GraphError,
    Result,
};

/// Physical location a declared argument or local is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Passed or stored in a named register.
    Register(String),
    /// Stored at `base + offset` on the stack frame.
    Stack {
        /// Frame base register name.
        base: String,
        /// Byte offset relative to the base.
        offset: i64,
    },
}

/// A declared argument or local variable of a function.
#[derive(Debug, Clone)]
pub struct Variable {
    /// Source-level name.
    pub name: String,
    /// Bit width.
    pub size: u32,
    /// Physical binding, when the host reported one.
    pub location: Option<Location>,
}

/// Where a statement lives: inside a basic block, or in the synthetic
/// `uninit` container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Place {
    /// Index into the function's block list.
    Block(usize),
    /// The synthetic uninitialized-definitions container.
    Uninit,
}

/// Position of a statement within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StmtSlot {
    /// The container the statement lives in.
    pub place: Place,
    /// The statement index within that container.
    pub index: usize,
}

/// A function under decompilation.
#[derive(Debug)]
pub struct Function {
    pub(crate) addr: u64,
    pub(crate) name: String,
    pub(crate) return_type: String,
    pub(crate) args: Vec<Variable>,
    pub(crate) locals: Vec<Variable>,
    pub(crate) blocks: Vec<BasicBlock>,
    pub(crate) arena: ExprArena,
    pub(crate) uninit: Container,
}

impl Function {
    /// Creates an empty function.
    #[must_use]
    pub fn new(addr: u64, name: &str) -> Self {
        Self {
            addr,
            name: name.to_string(),
            return_type: String::new(),
            args: Vec::new(),
            locals: Vec::new(),
            blocks: Vec::new(),
            arena: ExprArena::new(),
            uninit: Container::new(addr),
        }
    }

    /// Returns the entry address.
    #[must_use]
    pub const fn addr(&self) -> u64 {
        self.addr
    }

    /// Returns the function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the return-type hint reported by the host.
    #[must_use]
    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    /// Sets the return-type hint.
    pub fn set_return_type(&mut self, ty: &str) {
        self.return_type = ty.to_string();
    }

    /// Returns the declared arguments.
    #[must_use]
    pub fn args(&self) -> &[Variable] {
        &self.args
    }

    /// Returns the declared local variables.
    #[must_use]
    pub fn locals(&self) -> &[Variable] {
        &self.locals
    }

    /// Declares an argument.
    pub fn add_arg(&mut self, var: Variable) {
        self.args.push(var);
    }

    /// Declares a local variable.
    pub fn add_local(&mut self, var: Variable) {
        self.locals.push(var);
    }

    /// Returns the expression arena.
    #[must_use]
    pub fn arena(&self) -> &ExprArena {
        &self.arena
    }

    /// Returns the expression arena mutably.
    pub fn arena_mut(&mut self) -> &mut ExprArena {
        &mut self.arena
    }

    /// Returns the synthetic container of uninitialized definitions.
    #[must_use]
    pub fn uninit(&self) -> &Container {
        &self.uninit
    }

    /// Returns the basic blocks in layout order.
    #[must_use]
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// Returns the basic blocks mutably.
    pub fn blocks_mut(&mut self) -> &mut Vec<BasicBlock> {
        &mut self.blocks
    }

    /// Appends a block and returns its index.
    pub fn add_block(&mut self, block: BasicBlock) -> usize {
        self.blocks.push(block);
        self.blocks.len() - 1
    }

    /// Returns the block at `index`.
    #[must_use]
    pub fn block(&self, index: usize) -> Option<&BasicBlock> {
        self.blocks.get(index)
    }

    /// Returns the block at `index` mutably.
    pub fn block_mut(&mut self, index: usize) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(index)
    }

    /// Returns the index of the block at the given address.
    #[must_use]
    pub fn block_index_at(&self, addr: u64) -> Option<usize> {
        self.blocks.iter().position(|b| b.addr() == addr)
    }

    /// Returns the entry block index: the block the host flagged as entry,
    /// or the first block.
    #[must_use]
    pub fn entry_index(&self) -> Option<usize> {
        self.blocks
            .iter()
            .position(BasicBlock::is_entry)
            .or(if self.blocks.is_empty() { None } else { Some(0) })
    }

    /// Returns the exit block indices: blocks the host flagged as exits,
    /// plus blocks without successors.
    #[must_use]
    pub fn exit_indices(&self) -> Vec<usize> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_exit() || b.has_no_successors())
            .map(|(i, _)| i)
            .collect()
    }

    /// Builds the control flow graph view over the current blocks.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] if the function has no blocks.
    pub fn cfg(&self) -> Result<Cfg> {
        Cfg::build(self)
    }

    /// Discards blocks unreachable from the entry.
    ///
    /// The DFS spanning order decides reachability; this is how dead entry
    /// candidates reported by the host are dropped. Statements of discarded
    /// blocks are deleted from the arena.
    pub fn retain_reachable(&mut self) -> Result<()> {
        let cfg = self.cfg()?;
        let reachable: FxHashSet<usize> = dfs_order(&cfg.graph, cfg.entry)
            .into_iter()
            .map(NodeId::index)
            .collect();

        if reachable.len() == self.blocks.len() {
            return Ok(());
        }

        let mut kept = Vec::with_capacity(reachable.len());
        for (index, block) in std::mem::take(&mut self.blocks).into_iter().enumerate() {
            if reachable.contains(&index) {
                kept.push(block);
            } else {
                log::debug!(
                    "{}: dropping unreachable block at 0x{:x}",
                    self.name,
                    block.addr()
                );
                for stmt in block.container().stmts() {
                    for &root in stmt.exprs() {
                        self.arena.pluck(root, true);
                    }
                }
            }
        }
        self.blocks = kept;
        Ok(())
    }

    /// Finds the statement holding `root` as a top-level expression.
    #[must_use]
    pub fn find_stmt(&self, root: ExprId) -> Option<StmtSlot> {
        for (index, stmt) in self.uninit.stmts().iter().enumerate() {
            if stmt.exprs().contains(&root) {
                return Some(StmtSlot {
                    place: Place::Uninit,
                    index,
                });
            }
        }
        for (block_idx, block) in self.blocks.iter().enumerate() {
            for (index, stmt) in block.container().stmts().iter().enumerate() {
                if stmt.exprs().contains(&root) {
                    return Some(StmtSlot {
                        place: Place::Block(block_idx),
                        index,
                    });
                }
            }
        }
        None
    }

    /// Returns the statement at `slot` mutably.
    pub fn stmt_mut(&mut self, slot: StmtSlot) -> Option<&mut Statement> {
        match slot.place {
            Place::Uninit => self.uninit.stmts_mut().get_mut(slot.index),
            Place::Block(b) => self
                .blocks
                .get_mut(b)?
                .container_mut()
                .stmts_mut()
                .get_mut(slot.index),
        }
    }

    /// Removes and returns the statement at `slot`.
    pub fn remove_stmt(&mut self, slot: StmtSlot) -> Option<Statement> {
        match slot.place {
            Place::Uninit => self.uninit.remove(slot.index),
            Place::Block(b) => self.blocks.get_mut(b)?.container_mut().remove(slot.index),
        }
    }

    /// Inserts a statement at `slot`.
    pub fn insert_stmt(&mut self, slot: StmtSlot, stmt: Statement) {
        match slot.place {
            Place::Uninit => self.uninit.insert(slot.index, stmt),
            Place::Block(b) => {
                if let Some(block) = self.blocks.get_mut(b) {
                    block.container_mut().insert(slot.index, stmt);
                }
            }
        }
    }

    /// Erases every SSA subscript, producing the form handed to the printer.
    ///
    /// Phi nodes survive; only the `idx` fields are nulled.
    pub fn transform_out(&mut self) {
        let ids: Vec<ExprId> = self.arena.live_ids().collect();
        for id in ids {
            self.arena.set_idx(id, None);
        }
    }

    /// Renders the function body as pseudo-source text (debug
    /// representation; the real printer is a separate back-end).
    #[must_use]
    pub fn render(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(out, "{} {}()", self.return_type, self.name);
        for block in &self.blocks {
            let _ = writeln!(out, "b_0x{:x}:", block.addr());
            for stmt in block.container().stmts() {
                let _ = writeln!(out, "    {}", stmt.render(&self.arena));
            }
        }
        out
    }
}

/// Control flow graph view of a [`Function`].
///
/// Nodes are block indices; edges follow each block's successor addresses in
/// `jump`, `fail`, `cases` order. Dominators and dominance frontiers are
/// computed lazily on first access and cached.
#[derive(Debug)]
pub struct Cfg {
    graph: DirectedGraph<usize>,
    entry: NodeId,
    exits: Vec<NodeId>,
    dominators: OnceLock<DominatorTree>,
    frontiers: OnceLock<Vec<FxHashSet<NodeId>>>,
}

impl Cfg {
    /// Builds the CFG for a function.
    ///
    /// Successor addresses that do not resolve to a block of the function
    /// (tail calls, jumps out of the lifted region) are skipped with a debug
    /// log line.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] if the function has no blocks.
    pub fn build(func: &Function) -> Result<Self> {
        if func.blocks.is_empty() {
            return Err(GraphError(format!(
                "function {} has no basic blocks",
                func.name
            )));
        }

        let mut graph = DirectedGraph::with_capacity(func.blocks.len());
        let mut by_addr: FxHashMap<u64, NodeId> = FxHashMap::default();
        for (index, block) in func.blocks.iter().enumerate() {
            let id = graph.add_node(index);
            by_addr.insert(block.addr(), id);
        }

        for (index, block) in func.blocks.iter().enumerate() {
            let from = NodeId::new(index);
            for succ_addr in block.successor_addrs() {
                match by_addr.get(&succ_addr) {
                    Some(&to) => graph.add_edge(from, to)?,
                    None => log::debug!(
                        "{}: successor 0x{succ_addr:x} of block 0x{:x} leaves the function",
                        func.name,
                        block.addr()
                    ),
                }
            }
        }

        let entry = func
            .entry_index()
            .map(NodeId::new)
            .ok_or_else(|| GraphError(format!("function {} has no entry block", func.name)))?;
        let exits = func.exit_indices().into_iter().map(NodeId::new).collect();

        Ok(Self {
            graph,
            entry,
            exits,
            dominators: OnceLock::new(),
            frontiers: OnceLock::new(),
        })
    }

    /// Returns the entry node.
    #[must_use]
    pub const fn entry(&self) -> NodeId {
        self.entry
    }

    /// Returns the exit nodes.
    #[must_use]
    pub fn exits(&self) -> &[NodeId] {
        &self.exits
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the successors of a block in edge order.
    pub fn successors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.successors(id)
    }

    /// Returns the predecessors of a block in edge order.
    pub fn predecessors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.predecessors(id)
    }

    /// Returns the phi-operand slot of the edge `pred -> node`.
    #[must_use]
    pub fn predecessor_index(&self, node: NodeId, pred: NodeId) -> Option<usize> {
        self.graph.predecessor_index(node, pred)
    }

    /// Returns the dominator tree (computed lazily, rooted at the entry).
    #[must_use]
    pub fn dominators(&self) -> &DominatorTree {
        self.dominators
            .get_or_init(|| compute_dominators(&self.graph, self.entry))
    }

    /// Returns the dominance frontier of every block, indexed by node id
    /// (computed lazily; used for phi placement).
    #[must_use]
    pub fn dominance_frontiers(&self) -> &[FxHashSet<NodeId>] {
        self.frontiers
            .get_or_init(|| compute_dominance_frontiers(&self.graph, self.dominators()))
    }

    /// Returns the underlying graph.
    #[must_use]
    pub fn graph(&self) -> &DirectedGraph<usize> {
        &self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a diamond CFG: 0x0 -> {0x10, 0x20} -> 0x30.
    fn diamond() -> Function {
        let mut f = Function::new(0, "diamond");
        let mut b0 = BasicBlock::new(0x0);
        b0.set_jump(Some(0x10));
        b0.set_fail(Some(0x20));
        let mut b1 = BasicBlock::new(0x10);
        b1.set_jump(Some(0x30));
        let mut b2 = BasicBlock::new(0x20);
        b2.set_jump(Some(0x30));
        let mut b3 = BasicBlock::new(0x30);
        b3.set_exit(true);
        f.add_block(b0);
        f.add_block(b1);
        f.add_block(b2);
        f.add_block(b3);
        f
    }

    #[test]
    fn test_cfg_shape() {
        let f = diamond();
        let cfg = f.cfg().unwrap();

        assert_eq!(cfg.block_count(), 4);
        assert_eq!(cfg.entry(), NodeId::new(0));
        assert_eq!(cfg.exits(), &[NodeId::new(3)]);

        let succs: Vec<_> = cfg.successors(NodeId::new(0)).collect();
        assert_eq!(succs, vec![NodeId::new(1), NodeId::new(2)]);

        let preds: Vec<_> = cfg.predecessors(NodeId::new(3)).collect();
        assert_eq!(preds, vec![NodeId::new(1), NodeId::new(2)]);
    }

    #[test]
    fn test_cfg_dominators_cached() {
        let f = diamond();
        let cfg = f.cfg().unwrap();
        let tree = cfg.dominators();

        assert_eq!(tree.root(), cfg.entry());
        assert_eq!(tree.immediate_dominator(NodeId::new(3)), Some(NodeId::new(0)));
        let frontiers = cfg.dominance_frontiers();
        assert!(frontiers[1].contains(&NodeId::new(3)));
    }

    #[test]
    fn test_retain_reachable_drops_orphans() {
        let mut f = diamond();
        // Orphan block never jumped to
        f.add_block(BasicBlock::new(0x100));
        assert_eq!(f.blocks().len(), 5);

        f.retain_reachable().unwrap();
        assert_eq!(f.blocks().len(), 4);
        assert!(f.block_index_at(0x100).is_none());
    }

    #[test]
    fn test_external_successor_is_skipped() {
        let mut f = Function::new(0, "tail");
        let mut b = BasicBlock::new(0x0);
        b.set_jump(Some(0xdead_0000)); // outside the function
        f.add_block(b);

        let cfg = f.cfg().unwrap();
        assert_eq!(cfg.successors(NodeId::new(0)).count(), 0);
    }

    #[test]
    fn test_find_and_remove_stmt() {
        let mut f = Function::new(0, "stmts");
        let b = BasicBlock::new(0x0);
        f.add_block(b);

        let dst = f.arena_mut().reg("eax", 32);
        let one = f.arena_mut().val(1, 32);
        let assign = f.arena_mut().assign(dst, one);
        f.block_mut(0)
            .unwrap()
            .container_mut()
            .push(Statement::expr(0, assign));

        let slot = f.find_stmt(assign).unwrap();
        assert_eq!(slot.place, Place::Block(0));
        assert_eq!(slot.index, 0);

        let removed = f.remove_stmt(slot).unwrap();
        assert_eq!(removed.root(), Some(assign));
        assert!(f.find_stmt(assign).is_none());
    }

    #[test]
    fn test_transform_out_erases_subscripts() {
        let mut f = Function::new(0, "out");
        let r = f.arena_mut().reg("eax", 32);
        f.arena_mut().set_idx(r, Some(4));

        f.transform_out();
        assert_eq!(f.arena().get(r).unwrap().idx(), None);
    }
}
