//! SSA construction (Cytron et al.).
//!
//! Two-phase, selector-driven construction:
//!
//! 1. **Phi insertion.** For every location of the wave's [`NameClass`] the
//!    defining blocks are collected; phi assignments are then placed at the
//!    iterated dominance frontier of those blocks, one argument per
//!    predecessor, with the defined variable marked weak.
//! 2. **Renaming.** A pre-order walk of the dominator tree assigns
//!    subscripts: uses read the top of the per-name stack, definitions
//!    allocate the next subscript and push it, and on block exit the pushed
//!    subscripts are popped again. Phi arguments are patched from the
//!    predecessor side and never visited as ordinary operands.
//!
//! A use with an empty stack is an implicit initialization (typical for the
//! stack pointer and argument registers): a weak `name_0 = 0` definition is
//! synthesized in the function's `uninit` container and the use is linked to
//! it. This is recovery, not failure.
//!
//! # References
//!
//! - Cytron et al., "Efficiently Computing Static Single Assignment Form and
//!   the Control Dependence Graph", ACM TOPLAS 1991

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    ir::{
        verify, CloneKeep, Cfg, ExprArena, ExprFlags, ExprId, ExprKind, Function, Statement,
    },
    ssa::{NameClass, SsaContext},
    utils::graph::{algorithms::DominatorTree, NodeId},
    Result,
};

/// Matching locations of one statement, split into uses and definitions.
///
/// Both lists are ordered innermost-first, so nested locations (a
/// dereference whose address contains another dereference) are renamed
/// before the enclosing one and SSA keys see fully renamed inner addresses.
fn collect_matching(
    arena: &ExprArena,
    class: NameClass,
    root: ExprId,
) -> (Vec<ExprId>, Vec<ExprId>) {
    let mut uses = Vec::new();
    let mut defs = Vec::new();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        // Phi arguments are renamed from the predecessor side, never here
        if !matches!(arena.kind(node), Some(ExprKind::Phi)) {
            for &op in arena.operands(node).iter().rev() {
                stack.push(op);
            }
        }
        if class.matches(arena, node) {
            if arena.has_flags(node, ExprFlags::IS_DEF) {
                defs.push(node);
            } else {
                uses.push(node);
            }
        }
    }

    // Pre-order lists ancestors first; reverse so inner locations come first
    uses.reverse();
    defs.reverse();
    (uses, defs)
}

/// One SSA construction wave over a function.
pub struct SsaBuilder<'a> {
    func: &'a mut Function,
    ctx: &'a mut SsaContext,
    class: NameClass,
    cfg: Cfg,
}

impl<'a> SsaBuilder<'a> {
    /// Runs one construction wave (phi insertion + renaming) for the given
    /// name class.
    ///
    /// # Errors
    ///
    /// Returns an error if the function has no control flow graph.
    pub fn run(func: &'a mut Function, ctx: &'a mut SsaContext, class: NameClass) -> Result<()> {
        let cfg = func.cfg()?;
        let mut builder = Self {
            func,
            ctx,
            class,
            cfg,
        };

        builder.place_phis();
        builder.ctx.clear_stacks();
        builder.rename();

        verify::check_logged(builder.func, "ssa renaming");
        let class = builder.class;
        let arity = verify::check_phi_arity(builder.func, &builder.cfg, |arena, lhs| {
            class.matches(arena, lhs)
        });
        if let Err(e) = arity.and_then(|()| verify::check_ssa(builder.func)) {
            debug_assert!(false, "SSA invariant violated: {e}");
            log::warn!("{}: SSA invariant violated: {e}", builder.func.name());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Phase A: phi insertion
    // ------------------------------------------------------------------

    /// Collects, per base name, the blocks containing a definition of that
    /// name plus a representative expression to clone phi operands from.
    ///
    /// When a block defines the same location several times only the last
    /// definition is kept as representative.
    fn collect_defs(&self) -> (Vec<String>, FxHashMap<String, (FxHashSet<usize>, ExprId)>) {
        let mut order: Vec<String> = Vec::new();
        let mut sites: FxHashMap<String, (FxHashSet<usize>, ExprId)> = FxHashMap::default();

        for (block_idx, block) in self.func.blocks().iter().enumerate() {
            for stmt in block.container().stmts() {
                for &root in stmt.exprs() {
                    let (_, defs) = collect_matching(&self.func.arena, self.class, root);
                    for def in defs {
                        let Some(name) = self.func.arena.base_name(def) else {
                            continue;
                        };
                        match sites.get_mut(&name) {
                            Some((blocks, repr)) => {
                                blocks.insert(block_idx);
                                *repr = def;
                            }
                            None => {
                                order.push(name.clone());
                                let mut blocks = FxHashSet::default();
                                blocks.insert(block_idx);
                                sites.insert(name, (blocks, def));
                            }
                        }
                    }
                }
            }
        }

        (order, sites)
    }

    fn place_phis(&mut self) {
        let frontiers: Vec<FxHashSet<NodeId>> = self.cfg.dominance_frontiers().to_vec();
        let (order, mut sites) = self.collect_defs();

        for name in order {
            let Some((mut defined, repr)) = sites.remove(&name) else {
                continue;
            };
            let mut worklist: Vec<usize> = defined.iter().copied().collect();
            worklist.sort_unstable();
            let mut has_phi: FxHashSet<usize> = FxHashSet::default();

            while let Some(block_idx) = worklist.pop() {
                let Some(frontier) = frontiers.get(block_idx) else {
                    continue;
                };
                let mut frontier: Vec<usize> = frontier.iter().map(|n| n.index()).collect();
                frontier.sort_unstable();

                for y in frontier {
                    if !has_phi.insert(y) {
                        continue;
                    }
                    self.insert_phi(y, repr);
                    if defined.insert(y) {
                        worklist.push(y);
                    }
                }
            }
        }
    }

    /// Inserts `loc = Phi(loc, loc, ...)` at the top of block `block_idx`,
    /// one argument per predecessor, the defined variable marked weak.
    fn insert_phi(&mut self, block_idx: usize, repr: ExprId) {
        let preds = self.cfg.predecessors(NodeId::new(block_idx)).count();

        let func = &mut *self.func;
        let arena = &mut func.arena;

        let args: Vec<ExprId> = (0..preds)
            .map(|_| arena.clone_expr(repr, CloneKeep::links()))
            .collect();
        let size = arena.size_of(repr);
        let phi = arena.phi(&args, size);
        let lhs = arena.clone_expr(repr, CloneKeep::links());
        let assign = arena.assign(lhs, phi);
        arena.set_flags(lhs, ExprFlags::WEAK, true);

        if let Some(block) = func.blocks.get_mut(block_idx) {
            let addr = block.addr();
            block
                .container_mut()
                .insert_phi(arena, Statement::expr(addr, assign));
        }
    }

    // ------------------------------------------------------------------
    // Phase B: renaming
    // ------------------------------------------------------------------

    fn rename(&mut self) {
        let domtree = self.cfg.dominators().clone();
        self.rename_block(self.cfg.entry().index(), &domtree);
    }

    fn rename_block(&mut self, block_idx: usize, domtree: &DominatorTree) {
        let mut pushed: Vec<String> = Vec::new();

        // Step 1: statements in order; per statement uses first, then defs.
        let stmt_roots: Vec<Vec<ExprId>> = self
            .func
            .blocks()
            .get(block_idx)
            .map(|b| {
                b.container()
                    .stmts()
                    .iter()
                    .map(|s| s.exprs().to_vec())
                    .collect()
            })
            .unwrap_or_default();

        for roots in stmt_roots {
            for root in roots {
                let (uses, defs) = collect_matching(&self.func.arena, self.class, root);
                for u in uses {
                    self.rename_use(u);
                }
                for d in defs {
                    if let Some(name) = self.rename_def(d) {
                        pushed.push(name);
                    }
                }
            }
        }

        // Step 2: patch the matching phi arguments of every successor with
        // the value reaching along this edge.
        let node = NodeId::new(block_idx);
        let succs: Vec<NodeId> = self.cfg.successors(node).collect();
        for succ in succs {
            let Some(j) = self.cfg.predecessor_index(succ, node) else {
                continue;
            };
            let phi_args: Vec<ExprId> = self
                .func
                .blocks()
                .get(succ.index())
                .map(|b| {
                    b.container()
                        .stmts()
                        .iter()
                        .take_while(|s| s.is_phi_assign(&self.func.arena))
                        .filter_map(|s| {
                            let root = s.root()?;
                            let ops = self.func.arena.operands(root);
                            let lhs = *ops.first()?;
                            let phi = *ops.get(1)?;
                            if self.class.matches(&self.func.arena, lhs) {
                                self.func.arena.operands(phi).get(j).copied()
                            } else {
                                None
                            }
                        })
                        .collect()
                })
                .unwrap_or_default();

            for arg in phi_args {
                self.rename_use(arg);
            }
        }

        // Step 3: dominated children.
        for child in domtree.children(node) {
            self.rename_block(child.index(), domtree);
        }

        // Step 4: leave scope.
        for name in pushed.iter().rev() {
            self.ctx.pop_idx(name);
        }
    }

    /// Renames a use: assigns the reaching subscript and links the def-use
    /// chain. A use with no reaching definition triggers implicit
    /// initialization.
    fn rename_use(&mut self, node: ExprId) {
        let Some(name) = self.func.arena.base_name(node) else {
            return;
        };

        let idx = match self.ctx.top_idx(&name) {
            Some(idx) => idx,
            None => {
                self.synthesize_uninit(&name, node);
                0
            }
        };

        self.func.arena.set_idx(node, Some(idx));
        if let Some(def) = self.ctx.def(&SsaContext::key(&name, idx)) {
            self.func.arena.add_use(def, node);
        }
    }

    /// Renames a definition: allocates the next subscript and registers the
    /// node in the context.
    fn rename_def(&mut self, node: ExprId) -> Option<String> {
        let name = self.func.arena.base_name(node)?;
        let idx = self.ctx.new_idx(&name);
        self.func.arena.set_idx(node, Some(idx));
        self.ctx.insert_def(SsaContext::key(&name, idx), node);
        Some(name)
    }

    /// Creates the weak `name_0 = 0` definition in the `uninit` container for
    /// a location read before any write.
    fn synthesize_uninit(&mut self, name: &str, node: ExprId) {
        let func = &mut *self.func;
        let arena = &mut func.arena;

        let lhs = arena.clone_expr(node, CloneKeep::links());
        let size = arena.size_of(node);
        let zero = arena.val(0, size);
        let assign = arena.assign(lhs, zero);
        arena.set_idx(lhs, Some(0));
        arena.set_flags(lhs, ExprFlags::WEAK, true);

        func.uninit.push(Statement::expr(func.addr, assign));
        self.ctx.push_idx(name, 0);
        self.ctx.insert_def(SsaContext::key(name, 0), lhs);

        log::debug!("{}: implicit initialization of {name}", func.name);
    }
}
