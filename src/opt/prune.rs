//! Selector-driven dead-assignment elimination.
//!
//! Each pruner instance walks the definition table with one selector and
//! deletes the assignments that match. Calls are never lost: a dead register
//! holding a call result has the call extracted into a standalone statement
//! before the assignment goes away, so side effects survive.

use rustc_hash::FxHashSet;

use crate::{
    config::Config,
    ir::{Expr, ExprFlags, ExprId, ExprKind, Function, Statement},
    opt::{def_site, delete_assign, is_inside, Pass},
    ssa::SsaContext,
};

/// The built-in pruning selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneKind {
    /// Unused register definitions whose value is a call: the call is
    /// extracted as an expression statement and the assignment dropped.
    DeadResults,
    /// Unused register definitions (not variables); a call-valued definition
    /// is only pruned when explicitly marked `PRUNE`.
    DeadRegisters,
    /// Unused memory stores, when provably removable: phi-valued, the
    /// no-alias configuration is on, or the location is marked `SAFE`.
    /// Unless marked safe, the store address must not read a variable that
    /// is live elsewhere.
    DeadDerefs,
    /// Phi definitions that only feed themselves or a closed cycle of other
    /// phis (detected with a visited-set walk over phi uses).
    CircularPhis,
}

/// The pruning pass. See [`PruneKind`] for the selector semantics.
#[derive(Debug)]
pub struct Pruner {
    kind: PruneKind,
}

impl Pruner {
    /// Creates a pruner with the given selector.
    #[must_use]
    pub fn new(kind: PruneKind) -> Self {
        Self { kind }
    }
}

impl Pass for Pruner {
    fn name(&self) -> &'static str {
        match self.kind {
            PruneKind::DeadResults => "prune-dead-results",
            PruneKind::DeadRegisters => "prune-dead-registers",
            PruneKind::DeadDerefs => "prune-dead-derefs",
            PruneKind::CircularPhis => "prune-circular-phis",
        }
    }

    fn run(&mut self, func: &mut Function, ctx: &mut SsaContext, config: &Config) -> bool {
        let mut changed = false;

        for key in ctx.def_keys() {
            let Some(def) = ctx.def(&key) else { continue };
            if !func.arena().is_live(def) {
                ctx.remove_def(&key);
                continue;
            }
            let Some((assign, val)) = def_site(func, def) else {
                continue;
            };

            changed |= match self.kind {
                PruneKind::DeadResults => prune_dead_result(func, ctx, &key, def, assign, val),
                PruneKind::DeadRegisters => {
                    prune_dead_register(func, ctx, &key, def, assign, val)
                }
                PruneKind::DeadDerefs => {
                    prune_dead_deref(func, ctx, config, &key, def, assign, val)
                }
                PruneKind::CircularPhis => prune_circular(func, ctx, &key, def, assign, val),
            };
        }

        changed
    }
}

fn is_unused(func: &Function, def: ExprId) -> bool {
    func.arena().get(def).is_some_and(|e| e.uses().is_empty())
}

/// `reg = call(...)` with no readers: keep the call, drop the assignment.
fn prune_dead_result(
    func: &mut Function,
    ctx: &mut SsaContext,
    key: &str,
    def: ExprId,
    assign: ExprId,
    val: ExprId,
) -> bool {
    if !is_unused(func, def)
        || !matches!(func.arena().kind(def), Some(ExprKind::Reg(_)))
        || !func.arena().kind(val).is_some_and(ExprKind::is_call)
    {
        return false;
    }

    let Some(slot) = func.find_stmt(assign) else {
        return false;
    };
    let Some(stmt) = func.remove_stmt(slot) else {
        return false;
    };

    func.arena_mut().pluck(val, false);
    func.arena_mut().pluck(assign, true);
    func.insert_stmt(slot, Statement::expr(stmt.addr(), val));
    ctx.remove_def(key);
    true
}

fn prune_dead_register(
    func: &mut Function,
    ctx: &mut SsaContext,
    key: &str,
    def: ExprId,
    assign: ExprId,
    val: ExprId,
) -> bool {
    if !is_unused(func, def) || !matches!(func.arena().kind(def), Some(ExprKind::Reg(_))) {
        return false;
    }
    let call_valued = func.arena().kind(val).is_some_and(ExprKind::is_call);
    if call_valued && !func.arena().has_flags(def, ExprFlags::PRUNE) {
        return false;
    }
    delete_assign(func, ctx, key, assign);
    true
}

fn prune_dead_deref(
    func: &mut Function,
    ctx: &mut SsaContext,
    config: &Config,
    key: &str,
    def: ExprId,
    assign: ExprId,
    val: ExprId,
) -> bool {
    if !is_unused(func, def) || !matches!(func.arena().kind(def), Some(ExprKind::Deref)) {
        return false;
    }

    let safe = func.arena().has_flags(def, ExprFlags::SAFE);
    let phi_valued = matches!(func.arena().kind(val), Some(ExprKind::Phi));
    if !(phi_valued || config.noalias || safe) {
        return false;
    }
    if !safe && addr_reads_live_variable(func, def, assign) {
        return false;
    }

    delete_assign(func, ctx, key, assign);
    true
}

/// Returns `true` if the store address reads a definition that is also read
/// outside this assignment (the variable is live, so removing the store
/// could change an aliasing read).
fn addr_reads_live_variable(func: &Function, deref: ExprId, assign: ExprId) -> bool {
    let Some(&addr) = func.arena().operands(deref).first() else {
        return false;
    };
    for node in func.arena().subtree(addr) {
        let Some(d) = func.arena().get(node).and_then(Expr::def) else {
            continue;
        };
        let outside = func
            .arena()
            .get(d)
            .is_some_and(|e| e.uses().iter().any(|&u| !is_inside(func, u, assign)));
        if outside {
            return true;
        }
    }
    false
}

/// Collects the closed group of phi definitions reachable from `start`
/// through phi-argument uses. Returns `None` as soon as any use escapes to a
/// non-phi reader.
fn circular_group(func: &Function, start: ExprId) -> Option<FxHashSet<ExprId>> {
    let mut visited: FxHashSet<ExprId> = FxHashSet::default();
    visited.insert(start);
    let mut stack = vec![start];

    while let Some(d) = stack.pop() {
        let uses = func.arena().get(d)?.uses().to_vec();
        for user in uses {
            let phi = func.arena().parent_of(user)?;
            if !matches!(func.arena().kind(phi), Some(ExprKind::Phi)) {
                return None;
            }
            let assign = func.arena().parent_of(phi)?;
            if !matches!(func.arena().kind(assign), Some(ExprKind::Assign)) {
                return None;
            }
            let member = *func.arena().operands(assign).first()?;
            if visited.insert(member) {
                stack.push(member);
            }
        }
    }

    Some(visited)
}

fn prune_circular(
    func: &mut Function,
    ctx: &mut SsaContext,
    key: &str,
    def: ExprId,
    assign: ExprId,
    val: ExprId,
) -> bool {
    if !matches!(func.arena().kind(val), Some(ExprKind::Phi)) {
        return false;
    }
    let Some(group) = circular_group(func, def) else {
        return false;
    };

    // Delete the whole cycle; stale context entries for the other members
    // are swept by the liveness guard on the next iteration.
    for member in group {
        if member == def {
            delete_assign(func, ctx, key, assign);
        } else if let Some(member_assign) = func.arena().parent_of(member) {
            if let Some(slot) = func.find_stmt(member_assign) {
                func.remove_stmt(slot);
            }
            func.arena_mut().pluck(member_assign, true);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BasicBlock;

    fn function_with_block() -> (Function, SsaContext) {
        let mut f = Function::new(0, "prune");
        let mut b = BasicBlock::new(0);
        b.set_exit(true);
        f.add_block(b);
        (f, SsaContext::new())
    }

    fn push_stmt(f: &mut Function, root: ExprId) {
        f.block_mut(0)
            .unwrap()
            .container_mut()
            .push(Statement::expr(0, root));
    }

    #[test]
    fn test_dead_register_is_pruned() {
        let (mut f, mut ctx) = function_with_block();
        let dst = f.arena_mut().reg("eax", 32);
        let one = f.arena_mut().val(1, 32);
        let assign = f.arena_mut().assign(dst, one);
        f.arena_mut().set_idx(dst, Some(1));
        ctx.insert_def(SsaContext::key("eax", 1), dst);
        push_stmt(&mut f, assign);

        let config = Config::default();
        assert!(Pruner::new(PruneKind::DeadRegisters).run(&mut f, &mut ctx, &config));
        assert!(f.block(0).unwrap().container().is_empty());
        assert!(ctx.def("eax_1").is_none());
    }

    #[test]
    fn test_call_result_is_extracted_not_lost() {
        let (mut f, mut ctx) = function_with_block();
        let callee = f.arena_mut().var("f", 64);
        let call = f.arena_mut().call(callee, &[], 32);
        let dst = f.arena_mut().reg("eax", 32);
        let assign = f.arena_mut().assign(dst, call);
        f.arena_mut().set_idx(dst, Some(1));
        ctx.insert_def(SsaContext::key("eax", 1), dst);
        push_stmt(&mut f, assign);

        let config = Config::default();

        // Plain dead-register pruning refuses the call-valued assignment
        assert!(!Pruner::new(PruneKind::DeadRegisters).run(&mut f, &mut ctx, &config));

        // Dead-results pruning extracts the call
        assert!(Pruner::new(PruneKind::DeadResults).run(&mut f, &mut ctx, &config));
        let stmts = f.block(0).unwrap().container().stmts();
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].root(), Some(call));
        assert_eq!(f.arena().render(call), "f()");
        assert!(!f.arena().is_live(assign));
    }

    #[test]
    fn test_dead_deref_requires_noalias_or_safe() {
        let (mut f, mut ctx) = function_with_block();
        let sp = f.arena_mut().reg("sp", 64);
        f.arena_mut().set_idx(sp, Some(0));
        let eight = f.arena_mut().val(8, 64);
        let addr = f.arena_mut().binary(crate::ir::BinaryOp::Sub, sp, eight, 64);
        let store = f.arena_mut().deref(addr, 64);
        let value = f.arena_mut().reg("rbx", 64);
        f.arena_mut().set_idx(value, Some(0));
        let assign = f.arena_mut().assign(store, value);
        f.arena_mut().set_idx(store, Some(1));
        ctx.insert_def("*((sp_0 - 8))_1".to_string(), store);
        push_stmt(&mut f, assign);

        let mut config = Config::default();
        config.noalias = false;
        assert!(!Pruner::new(PruneKind::DeadDerefs).run(&mut f, &mut ctx, &config));

        config.noalias = true;
        assert!(Pruner::new(PruneKind::DeadDerefs).run(&mut f, &mut ctx, &config));
        assert!(f.block(0).unwrap().container().is_empty());
    }

    #[test]
    fn test_safe_flag_allows_deref_prune() {
        let (mut f, mut ctx) = function_with_block();
        let sp = f.arena_mut().reg("sp", 64);
        f.arena_mut().set_idx(sp, Some(0));
        let store = f.arena_mut().deref(sp, 64);
        let zero = f.arena_mut().val(0, 64);
        let assign = f.arena_mut().assign(store, zero);
        f.arena_mut().set_idx(store, Some(1));
        f.arena_mut().set_flags(store, ExprFlags::SAFE, true);
        ctx.insert_def("*(sp_0)_1".to_string(), store);
        push_stmt(&mut f, assign);

        let config = Config::default();
        assert!(Pruner::new(PruneKind::DeadDerefs).run(&mut f, &mut ctx, &config));
        assert!(f.block(0).unwrap().container().is_empty());
    }

    #[test]
    fn test_fully_circular_phi_pair_is_removed() {
        let (mut f, mut ctx) = function_with_block();

        // x_1 = Phi(x_2); x_2 = Phi(x_1): a closed cycle with no escape
        let arg_a = f.arena_mut().reg("x", 32);
        f.arena_mut().set_idx(arg_a, Some(2));
        let phi_a = f.arena_mut().phi(&[arg_a], 32);
        let x1 = f.arena_mut().reg("x", 32);
        let assign_a = f.arena_mut().assign(x1, phi_a);
        f.arena_mut().set_idx(x1, Some(1));

        let arg_b = f.arena_mut().reg("x", 32);
        f.arena_mut().set_idx(arg_b, Some(1));
        let phi_b = f.arena_mut().phi(&[arg_b], 32);
        let x2 = f.arena_mut().reg("x", 32);
        let assign_b = f.arena_mut().assign(x2, phi_b);
        f.arena_mut().set_idx(x2, Some(2));

        f.arena_mut().add_use(x1, arg_b);
        f.arena_mut().add_use(x2, arg_a);

        ctx.insert_def(SsaContext::key("x", 1), x1);
        ctx.insert_def(SsaContext::key("x", 2), x2);
        push_stmt(&mut f, assign_a);
        push_stmt(&mut f, assign_b);

        let config = Config::default();
        assert!(Pruner::new(PruneKind::CircularPhis).run(&mut f, &mut ctx, &config));
        assert!(f.block(0).unwrap().container().is_empty());
        assert!(!f.arena().is_live(assign_a));
        assert!(!f.arena().is_live(assign_b));
    }

    #[test]
    fn test_phi_with_escaping_use_survives() {
        let (mut f, mut ctx) = function_with_block();

        // x_1 = Phi(x_0); return x_1
        let arg = f.arena_mut().reg("x", 32);
        f.arena_mut().set_idx(arg, Some(0));
        let phi = f.arena_mut().phi(&[arg], 32);
        let x1 = f.arena_mut().reg("x", 32);
        let assign = f.arena_mut().assign(x1, phi);
        f.arena_mut().set_idx(x1, Some(1));
        ctx.insert_def(SsaContext::key("x", 1), x1);
        push_stmt(&mut f, assign);

        let ret_use = f.arena_mut().reg("x", 32);
        f.arena_mut().set_idx(ret_use, Some(1));
        f.arena_mut().add_use(x1, ret_use);
        f.block_mut(0)
            .unwrap()
            .container_mut()
            .push(Statement::ret(4, Some(ret_use)));

        let config = Config::default();
        assert!(!Pruner::new(PruneKind::CircularPhis).run(&mut f, &mut ctx, &config));
        assert!(f.arena().is_live(assign));
    }
}
