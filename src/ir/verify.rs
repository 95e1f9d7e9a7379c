//! IR invariant checks.
//!
//! These verify the structural rules the passes must preserve: link symmetry
//! between parents and operands, def-use chain consistency, assignment shape,
//! and the SSA properties (phi arity, unique name+subscript per definition).
//!
//! The pipeline runs [`check`] after every pass in debug builds. Per the
//! error policy, a violation asserts in debug builds and is logged in release
//! builds; the pipeline then continues with the IR as-is.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    ir::{Cfg, Container, ExprArena, ExprId, ExprKind, Function},
    utils::graph::NodeId,
    Result,
};

/// Checks the structural invariants of a function's IR.
///
/// Verified properties:
///
/// - every operand's parent pointer matches the expression holding it, and
///   each child appears exactly once in its parent's operand list
/// - for every use `u` with a definition link, `u.def.uses` contains `u`
///   exactly once, and vice versa for every entry in a definition's users
///   list
/// - every `Assign` destination is an assignable location flagged as a
///   definition
/// - phi assignments are grouped at the top of their containers
///
/// # Errors
///
/// Returns [`crate::Error::MalformedIr`] describing the first violation.
pub fn check(func: &Function) -> Result<()> {
    let arena = func.arena();

    for id in arena.live_ids() {
        check_links(arena, id)?;
        check_assign_shape(arena, id)?;
    }

    check_phi_grouping(arena, func.uninit())?;
    for block in func.blocks() {
        check_phi_grouping(arena, block.container())?;
    }

    Ok(())
}

/// Checks the phi arity invariant: each phi for which `is_current` returns
/// `true` must have exactly one argument per predecessor of its block.
///
/// The exact-arity property holds between renaming and relaxation, so the
/// SSA builder applies this to the phis of the wave it just renamed; the
/// relaxed phis of earlier waves are exempt (relaxation removes
/// self-arguments and folds chains, changing argument counts).
///
/// # Errors
///
/// Returns [`crate::Error::MalformedIr`] describing the first violation.
pub fn check_phi_arity(
    func: &Function,
    cfg: &Cfg,
    is_current: impl Fn(&ExprArena, ExprId) -> bool,
) -> Result<()> {
    let arena = func.arena();

    for (block_idx, block) in func.blocks().iter().enumerate() {
        let preds = cfg.predecessors(NodeId::new(block_idx)).count();
        for stmt in block.container().stmts() {
            if !stmt.is_phi_assign(arena) {
                break;
            }
            let Some(root) = stmt.root() else { continue };
            let ops = arena.operands(root);
            let (Some(&lhs), Some(&phi)) = (ops.first(), ops.get(1)) else {
                continue;
            };
            if !is_current(arena, lhs) {
                continue;
            }
            let args = arena.operands(phi).len();
            if args != preds {
                return Err(malformed_ir!(
                    "phi in block 0x{:x} has {args} arguments for {preds} predecessors",
                    block.addr()
                ));
            }
        }
    }

    Ok(())
}

/// Checks the SSA naming invariant: no two definitions share both base name
/// and subscript.
///
/// # Errors
///
/// Returns [`crate::Error::MalformedIr`] describing the first violation.
pub fn check_ssa(func: &Function) -> Result<()> {
    let arena = func.arena();

    let mut seen: FxHashMap<String, ExprId> = FxHashMap::default();
    for id in arena.live_ids() {
        let Some(e) = arena.get(id) else { continue };
        if !e.is_def() || e.idx().is_none() {
            continue;
        }
        let Some(key) = arena.ssa_key(id) else {
            continue;
        };
        if let Some(&other) = seen.get(&key) {
            return Err(malformed_ir!(
                "definitions {other} and {id} share the SSA name {key}"
            ));
        }
        seen.insert(key, id);
    }

    Ok(())
}

fn check_links(arena: &ExprArena, id: ExprId) -> Result<()> {
    for &op in arena.operands(id) {
        let Some(child) = arena.get(op) else {
            return Err(malformed_ir!("expression {id} holds dead operand {op}"));
        };
        if child.parent() != Some(id) {
            return Err(malformed_ir!(
                "operand {op} of {id} has parent {:?}",
                child.parent()
            ));
        }
    }

    let e = arena
        .get(id)
        .ok_or_else(|| malformed_ir!("dead slot {id} reached the link check"))?;

    if let Some(parent) = e.parent() {
        let count = arena.operands(parent).iter().filter(|&&o| o == id).count();
        if count != 1 {
            return Err(malformed_ir!(
                "expression {id} appears {count} times in the operands of {parent}"
            ));
        }
    }

    if let Some(def) = e.def() {
        let Some(d) = arena.get(def) else {
            return Err(malformed_ir!("use {id} points at dead definition {def}"));
        };
        let count = d.uses().iter().filter(|&&u| u == id).count();
        if count != 1 {
            return Err(malformed_ir!(
                "definition {def} lists use {id} {count} times"
            ));
        }
    }

    let mut unique: FxHashSet<ExprId> = FxHashSet::default();
    for &user in e.uses() {
        if !unique.insert(user) {
            return Err(malformed_ir!("definition {id} lists a duplicate use {user}"));
        }
        let Some(u) = arena.get(user) else {
            return Err(malformed_ir!("definition {id} lists dead use {user}"));
        };
        if u.def() != Some(id) {
            return Err(malformed_ir!(
                "use {user} of definition {id} links back to {:?}",
                u.def()
            ));
        }
    }

    Ok(())
}

fn check_assign_shape(arena: &ExprArena, id: ExprId) -> Result<()> {
    if !matches!(arena.kind(id), Some(ExprKind::Assign)) {
        return Ok(());
    }
    let Some(&dst) = arena.operands(id).first() else {
        return Err(malformed_ir!("assignment {id} has no destination"));
    };
    let Some(d) = arena.get(dst) else {
        return Err(malformed_ir!("assignment {id} has a dead destination"));
    };
    if !d.kind().is_location() {
        return Err(malformed_ir!(
            "assignment {id} destination is {:?}, not a location",
            d.kind()
        ));
    }
    if !d.is_def() {
        return Err(malformed_ir!(
            "assignment {id} destination {dst} is not flagged as a definition"
        ));
    }
    Ok(())
}

fn check_phi_grouping(arena: &ExprArena, container: &Container) -> Result<()> {
    let mut past_phis = false;
    for stmt in container.stmts() {
        if stmt.is_phi_assign(arena) {
            if past_phis {
                return Err(malformed_ir!(
                    "phi assignment at 0x{:x} is not grouped at the top of its block",
                    stmt.addr()
                ));
            }
        } else {
            past_phis = true;
        }
    }
    Ok(())
}

/// Runs [`check`] and logs (rather than propagates) any violation.
///
/// Debug builds additionally assert, per the malformed-IR policy.
pub fn check_logged(func: &Function, stage: &str) {
    if let Err(e) = check(func) {
        debug_assert!(false, "IR invariant violated after {stage}: {e}");
        log::warn!("{}: IR invariant violated after {stage}: {e}", func.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BasicBlock, Statement};

    fn single_block_function() -> Function {
        let mut f = Function::new(0, "t");
        f.add_block(BasicBlock::new(0));
        f
    }

    #[test]
    fn test_clean_function_passes() {
        let mut f = single_block_function();
        let dst = f.arena_mut().reg("eax", 32);
        let one = f.arena_mut().val(1, 32);
        let assign = f.arena_mut().assign(dst, one);
        f.block_mut(0)
            .unwrap()
            .container_mut()
            .push(Statement::expr(0, assign));

        assert!(check(&f).is_ok());
    }

    #[test]
    fn test_detects_unbalanced_def_use() {
        let mut f = single_block_function();
        let dst = f.arena_mut().reg("eax", 32);
        let one = f.arena_mut().val(1, 32);
        let assign = f.arena_mut().assign(dst, one);
        f.block_mut(0)
            .unwrap()
            .container_mut()
            .push(Statement::expr(0, assign));

        // A use pointing at a def that does not list it back
        let user = f.arena_mut().reg("eax", 32);
        let two = f.arena_mut().val(2, 32);
        let add = f.arena_mut().binary(crate::ir::BinaryOp::Add, user, two, 32);
        let dst2 = f.arena_mut().reg("ebx", 32);
        let assign2 = f.arena_mut().assign(dst2, add);
        f.block_mut(0)
            .unwrap()
            .container_mut()
            .push(Statement::expr(4, assign2));

        f.arena_mut().add_use(dst, user);
        // Corrupt: remove from the def side only
        if let Some(d) = f.arena_mut().get_mut(dst) {
            d.uses.clear();
        }

        assert!(check(&f).is_err());
    }

    #[test]
    fn test_detects_ungrouped_phi() {
        let mut f = single_block_function();

        let dst = f.arena_mut().reg("x", 32);
        let one = f.arena_mut().val(1, 32);
        let plain = f.arena_mut().assign(dst, one);

        let arg = f.arena_mut().reg("x", 32);
        let phi = f.arena_mut().phi(&[arg], 32);
        let pdst = f.arena_mut().reg("x", 32);
        let passign = f.arena_mut().assign(pdst, phi);

        let container = f.block_mut(0).unwrap().container_mut();
        container.push(Statement::expr(0, plain));
        container.push(Statement::expr(4, passign));

        assert!(check(&f).is_err());
    }

    #[test]
    fn test_ssa_duplicate_subscript_detected() {
        let mut f = single_block_function();
        let d1 = f.arena_mut().reg("eax", 32);
        let v1 = f.arena_mut().val(1, 32);
        let a1 = f.arena_mut().assign(d1, v1);
        let d2 = f.arena_mut().reg("eax", 32);
        let v2 = f.arena_mut().val(2, 32);
        let a2 = f.arena_mut().assign(d2, v2);
        f.arena_mut().set_idx(d1, Some(1));
        f.arena_mut().set_idx(d2, Some(1));
        let container = f.block_mut(0).unwrap().container_mut();
        container.push(Statement::expr(0, a1));
        container.push(Statement::expr(4, a2));

        assert!(check_ssa(&f).is_err());
    }
}
