//! Phi relaxation.
//!
//! Runs after each renaming wave as a single fixpoint over the context's
//! definition table:
//!
//! - `x = Phi(y)` (single argument) collapses to the copy `x = y`
//! - `x = Phi(a, x)` / `x = Phi(x, a)` drops the self-referential argument
//!   and then collapses to `x = a`
//! - a phi whose only use is an argument of another phi folds its arguments
//!   into that phi (preserving uniqueness) and its own assignment is deleted
//!
//! After relaxation a phi's argument list no longer necessarily matches the
//! predecessor count of its block; the strict arity invariant holds between
//! renaming and relaxation, and the printer consumes the relaxed form.

use crate::{
    ir::{CloneKeep, Expr, ExprFlags, ExprId, ExprKind, Function},
    ssa::SsaContext,
};

const MAX_RELAX_ROUNDS: usize = 32;

/// Relaxes the phis of a function to fixpoint. Returns `true` if anything
/// changed.
pub fn relax_phis(func: &mut Function, ctx: &mut SsaContext) -> bool {
    let mut changed_any = false;

    for round in 0..MAX_RELAX_ROUNDS {
        let mut changed = false;

        for key in ctx.def_keys() {
            let Some(def) = ctx.def(&key) else { continue };
            if !func.arena().is_live(def) {
                ctx.remove_def(&key);
                continue;
            }
            let Some(assign) = func.arena().parent_of(def) else {
                continue;
            };
            let Some(&rhs) = func.arena().operands(assign).get(1) else {
                continue;
            };
            if !matches!(func.arena().kind(rhs), Some(ExprKind::Phi)) {
                continue;
            }

            changed |= drop_self_args(func, def, rhs);
            changed |= collapse_single(func, rhs);
            changed |= fold_chained(func, ctx, &key, def, assign, rhs);
        }

        if !changed {
            break;
        }
        changed_any = true;
        if round + 1 == MAX_RELAX_ROUNDS {
            log::warn!("{}: phi relaxation hit its round cap", func.name());
        }
    }

    changed_any
}

/// Drops arguments of `phi` that read `def` itself (`x = Phi(a, x)`).
fn drop_self_args(func: &mut Function, def: ExprId, phi: ExprId) -> bool {
    let mut changed = false;
    for arg in func.arena().operands(phi).to_vec() {
        if func.arena().get(arg).and_then(Expr::def) == Some(def) {
            func.arena_mut().pluck(arg, true);
            changed = true;
        }
    }
    // A phi reduced to nothing is circular by construction; leave a marker
    // for the pruner.
    if changed && func.arena().operands(phi).is_empty() {
        func.arena_mut()
            .set_flags(def, ExprFlags::WEAK | ExprFlags::PRUNE, true);
    }
    changed
}

/// Collapses `x = Phi(y)` to `x = y`.
fn collapse_single(func: &mut Function, phi: ExprId) -> bool {
    if func.arena().operands(phi).len() != 1 {
        return false;
    }
    let Some(arg) = func.arena_mut().take_operand(phi, 0) else {
        return false;
    };
    func.arena_mut().replace(phi, arg);
    true
}

/// Folds the arguments of a single-use phi into the phi using it.
///
/// `x = Phi(a, b)` whose only reader is an argument of `y = Phi(x, c)`
/// becomes `y = Phi(c, a, b)`; `x`'s assignment is deleted. Arguments already
/// present in the outer phi (same name and subscript) are not duplicated.
fn fold_chained(
    func: &mut Function,
    ctx: &mut SsaContext,
    key: &str,
    def: ExprId,
    assign: ExprId,
    phi: ExprId,
) -> bool {
    // The collapse step may already have rewritten this phi into a copy
    if !matches!(func.arena().kind(phi), Some(ExprKind::Phi)) {
        return false;
    }
    let uses = func
        .arena()
        .get(def)
        .map(|e| e.uses().to_vec())
        .unwrap_or_default();
    let [only_use] = uses.as_slice() else {
        return false;
    };
    let only_use = *only_use;

    let Some(outer_phi) = func.arena().parent_of(only_use) else {
        return false;
    };
    if outer_phi == phi || !matches!(func.arena().kind(outer_phi), Some(ExprKind::Phi)) {
        return false;
    }

    for arg in func.arena().operands(phi).to_vec() {
        let duplicate = func
            .arena()
            .operands(outer_phi)
            .iter()
            .any(|&existing| {
                existing != only_use && func.arena().structurally_equal(existing, arg)
            });
        if !duplicate {
            let clone = func.arena_mut().clone_expr(arg, CloneKeep::links());
            func.arena_mut().push_operand(outer_phi, clone);
        }
    }

    func.arena_mut().pluck(only_use, true);
    if let Some(slot) = func.find_stmt(assign) {
        func.remove_stmt(slot);
    }
    func.arena_mut().pluck(assign, true);
    ctx.remove_def(key);
    true
}
