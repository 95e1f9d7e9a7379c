//! Selector-driven copy propagation.
//!
//! For every entry of the definition table whose selector matches, the
//! assigned value is substituted into each use (as a deep copy with intact
//! SSA links); once every use is rewritten the original assignment is
//! deleted and the table entry dropped.

use crate::{
    config::Config,
    ir::{CloneKeep, ExprId, ExprKind, Function},
    opt::{def_site, delete_assign, is_inside, Pass},
    ssa::SsaContext,
};

/// The built-in propagation selectors.
#[derive(Debug, Clone)]
pub enum PropagateKind {
    /// Conservative copy propagation: single-use definitions with a real
    /// subscript (`idx != 0`) and a non-phi value.
    SafeDefs,
    /// Location-register propagation: definitions of the named registers
    /// (stack pointer, flags) regardless of use count, so that later
    /// renaming waves see canonicalized addresses.
    Locations(Vec<String>),
}

/// The propagation pass. See [`PropagateKind`] for the selector semantics.
pub struct Propagator {
    kind: PropagateKind,
}

impl Propagator {
    /// Creates a propagator with the given selector.
    #[must_use]
    pub fn new(kind: PropagateKind) -> Self {
        Self { kind }
    }

    fn selected(&self, func: &Function, def: ExprId, val: ExprId) -> bool {
        let arena = func.arena();
        let Some(d) = arena.get(def) else {
            return false;
        };

        match &self.kind {
            PropagateKind::SafeDefs => {
                d.idx() != Some(0)
                    && !matches!(arena.kind(val), Some(ExprKind::Phi))
                    && d.uses().len() == 1
            }
            PropagateKind::Locations(names) => {
                let is_named = match arena.kind(def) {
                    Some(ExprKind::Reg(name)) => names.iter().any(|n| n == name),
                    _ => false,
                };
                // The synthetic entry value (idx 0) is symbolic, never a
                // constant to substitute
                is_named
                    && d.idx() != Some(0)
                    && !matches!(
                        arena.kind(val),
                        Some(ExprKind::Phi | ExprKind::Call | ExprKind::Intrinsic(_))
                    )
            }
        }
    }
}

impl Pass for Propagator {
    fn name(&self) -> &'static str {
        match self.kind {
            PropagateKind::SafeDefs => "propagate-safe-defs",
            PropagateKind::Locations(_) => "propagate-locations",
        }
    }

    fn run(&mut self, func: &mut Function, ctx: &mut SsaContext, _config: &Config) -> bool {
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
            if !self.selected(func, def, val) {
                continue;
            }

            let uses = func
                .arena()
                .get(def)
                .map(|e| e.uses().to_vec())
                .unwrap_or_default();
            if uses.is_empty() {
                continue;
            }

            let mut all_replaced = true;
            for user in uses {
                // A reader inside the assigned value itself would make the
                // substitution self-referential; leave such chains alone.
                if is_inside(func, user, assign) {
                    all_replaced = false;
                    continue;
                }
                // A use may be a statement root (e.g. the value of a
                // return); the statement must be re-pointed at the copy.
                let root_slot = if func.arena().parent_of(user).is_none() {
                    func.find_stmt(user)
                } else {
                    None
                };
                let copy = func.arena_mut().clone_expr(val, CloneKeep::links());
                func.arena_mut().replace(user, copy);
                if let Some(slot) = root_slot {
                    if let Some(stmt) = func.stmt_mut(slot) {
                        for root in stmt.exprs_mut() {
                            if *root == user {
                                *root = copy;
                            }
                        }
                    }
                }
                changed = true;
            }

            if all_replaced && func.arena().get(def).is_some_and(|e| e.uses().is_empty()) {
                delete_assign(func, ctx, &key, assign);
            }
        }

        changed
    }
}

impl std::fmt::Debug for Propagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Propagator").field("kind", &self.kind).finish()
    }
}
