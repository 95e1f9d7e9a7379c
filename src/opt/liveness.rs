//! Live ranges and preserved-location analysis.
//!
//! Two related analyses over the SSA form:
//!
//! - **Live ranges**: per block, each definition created there paired with
//!   the earliest statement in the same container that reads it (or `None`
//!   when no read is local). Weak uses can be ignored so that synthetic phi
//!   plumbing does not keep a location alive.
//! - **Preserved locations**: a storage location is preserved when the value
//!   reaching every function exit traces back, through a chain of plain copy
//!   assignments, to the original `idx = 0` definition of the same name -
//!   the classic callee-saved save/restore pattern. Both ends of the chain
//!   are marked weak/prune (stores additionally safe) so the pruning passes
//!   eliminate them.
//!
//! The backward walk over the CFG is memoized per block; a cycle contributes
//! nothing new to the union, which keeps the walk linear.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    ir::{Expr, ExprFlags, ExprId, ExprKind, Function},
    opt::def_site,
    ssa::{PreservedPair, SsaContext},
    utils::graph::NodeId,
    Result,
};

/// A definition created in a block, with the statement index of its earliest
/// killing use in the same container (`None` when it survives the block).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveRange {
    /// The definition expression.
    pub def: ExprId,
    /// Statement index of the earliest local use, if any.
    pub killed_at: Option<usize>,
}

/// Computes the live ranges of the definitions created in one block.
///
/// With `ignore_weak` set, uses that read weak definitions' phi plumbing
/// (uses sitting inside a phi) do not count as kills.
#[must_use]
pub fn block_ranges(func: &Function, block_idx: usize, ignore_weak: bool) -> Vec<LiveRange> {
    let Some(block) = func.block(block_idx) else {
        return Vec::new();
    };
    let arena = func.arena();

    // Map every statement root to its index for locating uses
    let mut stmt_of_root: FxHashMap<ExprId, usize> = FxHashMap::default();
    for (idx, stmt) in block.container().stmts().iter().enumerate() {
        for &root in stmt.exprs() {
            stmt_of_root.insert(root, idx);
        }
    }

    let mut ranges = Vec::new();
    for (idx, stmt) in block.container().stmts().iter().enumerate() {
        for &root in stmt.exprs() {
            for node in arena.subtree(root) {
                if !arena.has_flags(node, ExprFlags::IS_DEF) {
                    continue;
                }
                let uses = arena.get(node).map_or(&[][..], Expr::uses);
                let mut killed_at: Option<usize> = None;
                for &user in uses {
                    if ignore_weak && use_is_phi_argument(func, user) {
                        continue;
                    }
                    if let Some(&use_stmt) = root_of(func, user).and_then(|r| stmt_of_root.get(&r))
                    {
                        if use_stmt > idx {
                            killed_at = Some(killed_at.map_or(use_stmt, |k| k.min(use_stmt)));
                        }
                    }
                }
                ranges.push(LiveRange {
                    def: node,
                    killed_at,
                });
            }
        }
    }
    ranges
}

/// Walks up to the statement root holding `id`.
fn root_of(func: &Function, id: ExprId) -> Option<ExprId> {
    let mut current = id;
    while let Some(parent) = func.arena().parent_of(current) {
        current = parent;
    }
    if func.arena().is_live(current) {
        Some(current)
    } else {
        None
    }
}

fn use_is_phi_argument(func: &Function, user: ExprId) -> bool {
    func.arena()
        .parent_of(user)
        .is_some_and(|p| matches!(func.arena().kind(p), Some(ExprKind::Phi)))
}

/// Finds the last definition of `name` in a block, scanning backwards.
fn last_def_in_block(func: &Function, block_idx: usize, name: &str) -> Option<ExprId> {
    let block = func.block(block_idx)?;
    for stmt in block.container().stmts().iter().rev() {
        for &root in stmt.exprs() {
            let mut found = None;
            for node in func.arena().subtree(root) {
                if func.arena().has_flags(node, ExprFlags::IS_DEF)
                    && func.arena().base_name(node).as_deref() == Some(name)
                {
                    found = Some(node);
                }
            }
            if found.is_some() {
                return found;
            }
        }
    }
    None
}

/// Returns the definitions of `name` reaching the entry of `block` (one per
/// acyclic path), walking the CFG backwards with memoization.
fn reaching_defs(
    func: &Function,
    cfg: &crate::ir::Cfg,
    name: &str,
    initial: ExprId,
    block: NodeId,
    memo: &mut FxHashMap<usize, FxHashSet<ExprId>>,
) -> FxHashSet<ExprId> {
    if let Some(cached) = memo.get(&block.index()) {
        return cached.clone();
    }
    // In-progress marker: a cycle contributes nothing new
    memo.insert(block.index(), FxHashSet::default());

    let mut result = FxHashSet::default();
    let preds: Vec<NodeId> = cfg.predecessors(block).collect();
    if preds.is_empty() {
        result.insert(initial);
    }
    for pred in preds {
        if let Some(def) = last_def_in_block(func, pred.index(), name) {
            result.insert(def);
        } else {
            result.extend(reaching_defs(func, cfg, name, initial, pred, memo));
        }
    }

    memo.insert(block.index(), result.clone());
    result
}

/// Follows a chain of plain copy assignments from `from` back towards
/// `initial`. Returns the intermediate definitions, or `None` when the chain
/// breaks (a computed value, a call, a missing link).
fn trace_copy_chain(func: &Function, initial: ExprId, from: ExprId) -> Option<Vec<ExprId>> {
    let mut chain = Vec::new();
    let mut current = from;

    for _ in 0..64 {
        if current == initial {
            return Some(chain);
        }
        chain.push(current);
        let (_, val) = def_site(func, current)?;
        if !func.arena().kind(val).is_some_and(ExprKind::is_location) {
            return None;
        }
        current = func.arena().get(val).and_then(Expr::def)?;
    }
    None
}

/// Detects preserved locations and marks their save/restore chains for
/// elimination.
///
/// For every register with an `idx = 0` entry definition, the definition
/// reaching each exit is computed; when every exit is reached by the entry
/// value itself or by a copy chain leading back to it, the location is
/// preserved. The chain's definitions are marked `WEAK | PRUNE` (stores also
/// `SAFE`) and the pair is recorded in the context.
///
/// Returns `true` when at least one preserved location was found.
///
/// # Errors
///
/// Returns an error when the function has no control flow graph.
pub fn mark_preserved_locations(func: &mut Function, ctx: &mut SsaContext) -> Result<bool> {
    let cfg = func.cfg()?;
    let mut changed = false;

    for key in ctx.def_keys() {
        let Some(base) = key.strip_suffix("_0") else {
            continue;
        };
        let Some(initial) = ctx.def(&key) else { continue };
        if !matches!(func.arena().kind(initial), Some(ExprKind::Reg(_))) {
            continue;
        }
        let name = base.to_string();

        let mut chains: Vec<ExprId> = Vec::new();
        let mut restored: Option<ExprId> = None;
        let mut preserved = true;

        for &exit in cfg.exits() {
            // The value reaching the end of the exit block
            let reach: FxHashSet<ExprId> = match last_def_in_block(func, exit.index(), &name) {
                Some(def) => std::iter::once(def).collect(),
                None => {
                    let mut memo = FxHashMap::default();
                    reaching_defs(func, &cfg, &name, initial, exit, &mut memo)
                }
            };

            let mut it = reach.iter();
            let (Some(&def), None) = (it.next(), it.next()) else {
                preserved = false;
                break;
            };
            if def == initial {
                continue;
            }
            match trace_copy_chain(func, initial, def) {
                Some(chain) => {
                    restored.get_or_insert(def);
                    chains.extend(chain);
                }
                None => {
                    preserved = false;
                    break;
                }
            }
        }

        let Some(restored) = restored else { continue };
        if !preserved {
            continue;
        }

        for &member in chains.iter().chain(std::iter::once(&initial)) {
            func.arena_mut()
                .set_flags(member, ExprFlags::WEAK | ExprFlags::PRUNE, true);
            if matches!(func.arena().kind(member), Some(ExprKind::Deref)) {
                func.arena_mut().set_flags(member, ExprFlags::SAFE, true);
            }
        }
        log::debug!("{}: {name} is preserved across the function", func.name());
        ctx.add_preserved(PreservedPair {
            name,
            initial,
            restored,
        });
        changed = true;
    }

    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BasicBlock, BinaryOp, Statement};
    use crate::ssa::{NameClass, SsaBuilder};

    /// Prologue/epilogue function: save rbx to the stack, clobber it,
    /// restore it, return.
    fn save_restore_function() -> Function {
        let mut f = Function::new(0, "preserved");
        let mut b = BasicBlock::new(0);
        b.set_exit(true);
        f.add_block(b);

        // *(sp - 8) = rbx
        let sp1 = f.arena_mut().reg("sp", 64);
        let eight1 = f.arena_mut().val(8, 64);
        let addr1 = f.arena_mut().binary(BinaryOp::Sub, sp1, eight1, 64);
        let store = f.arena_mut().deref(addr1, 64);
        let rbx_in = f.arena_mut().reg("rbx", 64);
        let save = f.arena_mut().assign(store, rbx_in);
        f.block_mut(0)
            .unwrap()
            .container_mut()
            .push(Statement::expr(0x0, save));

        // rbx = 1 (clobber)
        let clobber_dst = f.arena_mut().reg("rbx", 64);
        let one = f.arena_mut().val(1, 64);
        let clobber = f.arena_mut().assign(clobber_dst, one);
        f.block_mut(0)
            .unwrap()
            .container_mut()
            .push(Statement::expr(0x4, clobber));

        // rbx = *(sp - 8) (restore)
        let sp2 = f.arena_mut().reg("sp", 64);
        let eight2 = f.arena_mut().val(8, 64);
        let addr2 = f.arena_mut().binary(BinaryOp::Sub, sp2, eight2, 64);
        let load = f.arena_mut().deref(addr2, 64);
        let rbx_out = f.arena_mut().reg("rbx", 64);
        let restore = f.arena_mut().assign(rbx_out, load);
        f.block_mut(0)
            .unwrap()
            .container_mut()
            .push(Statement::expr(0x8, restore));

        f.block_mut(0)
            .unwrap()
            .container_mut()
            .push(Statement::ret(0xc, None));

        f
    }

    fn build_full_ssa(f: &mut Function) -> SsaContext {
        let mut ctx = SsaContext::new();
        SsaBuilder::run(f, &mut ctx, NameClass::Registers).unwrap();
        SsaBuilder::run(f, &mut ctx, NameClass::Variables).unwrap();
        SsaBuilder::run(f, &mut ctx, NameClass::Derefs).unwrap();
        ctx
    }

    #[test]
    fn test_save_restore_pair_is_detected() {
        let mut f = save_restore_function();
        let mut ctx = build_full_ssa(&mut f);

        let changed = mark_preserved_locations(&mut f, &mut ctx).unwrap();
        assert!(changed);

        let preserved = ctx.preserved();
        assert_eq!(preserved.len(), 1);
        assert_eq!(preserved[0].name, "rbx");

        // Both ends of the chain are marked for elimination
        assert!(f
            .arena()
            .has_flags(preserved[0].initial, ExprFlags::PRUNE));
        assert!(f
            .arena()
            .has_flags(preserved[0].restored, ExprFlags::PRUNE));
    }

    #[test]
    fn test_clobbered_register_is_not_preserved() {
        let mut f = Function::new(0, "clobbered");
        let mut b = BasicBlock::new(0);
        b.set_exit(true);
        f.add_block(b);

        // rbx = 1; return
        let dst = f.arena_mut().reg("rbx", 64);
        let one = f.arena_mut().val(1, 64);
        let assign = f.arena_mut().assign(dst, one);
        f.block_mut(0)
            .unwrap()
            .container_mut()
            .push(Statement::expr(0, assign));
        f.block_mut(0)
            .unwrap()
            .container_mut()
            .push(Statement::ret(4, None));

        // Force an initial definition by reading rbx first
        let probe = f.arena_mut().reg("rbx", 64);
        f.block_mut(0)
            .unwrap()
            .container_mut()
            .insert(0, Statement::ret(0, Some(probe)));

        let mut ctx = build_full_ssa(&mut f);
        let changed = mark_preserved_locations(&mut f, &mut ctx).unwrap();
        assert!(!changed);
        assert!(ctx.preserved().is_empty());
    }

    #[test]
    fn test_block_ranges_find_local_kill() {
        let mut f = Function::new(0, "ranges");
        let mut b = BasicBlock::new(0);
        b.set_exit(true);
        f.add_block(b);

        // eax_1 = 2; ebx_1 = eax_1
        let d1 = f.arena_mut().reg("eax", 32);
        let two = f.arena_mut().val(2, 32);
        let a1 = f.arena_mut().assign(d1, two);
        f.arena_mut().set_idx(d1, Some(1));
        f.block_mut(0)
            .unwrap()
            .container_mut()
            .push(Statement::expr(0, a1));

        let u = f.arena_mut().reg("eax", 32);
        f.arena_mut().set_idx(u, Some(1));
        f.arena_mut().add_use(d1, u);
        let d2 = f.arena_mut().reg("ebx", 32);
        let a2 = f.arena_mut().assign(d2, u);
        f.block_mut(0)
            .unwrap()
            .container_mut()
            .push(Statement::expr(4, a2));

        let ranges = block_ranges(&f, 0, false);
        let r1 = ranges.iter().find(|r| r.def == d1).unwrap();
        assert_eq!(r1.killed_at, Some(1));
        let r2 = ranges.iter().find(|r| r.def == d2).unwrap();
        assert_eq!(r2.killed_at, None);
    }
}
