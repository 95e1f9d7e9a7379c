//! The optimizer driver and its passes.
//!
//! The optimizer accepts a list of passes and a context, and runs each pass
//! to its own fixpoint before moving to the next; the whole list is then
//! repeated until a full round changes nothing. Every fixpoint is bounded by
//! the configured iteration cap - a pass that fails to settle is logged and
//! abandoned with the IR left in its current (valid) state, per the
//! error-handling policy: no errors cross a pass boundary.
//!
//! Passes:
//!
//! - [`propagate::Propagator`] - selector-driven copy propagation over the
//!   definition table
//! - [`prune::Pruner`] - selector-driven deletion of dead assignments
//! - [`SimplifyPass`] - algebraic reduction of every statement (the glue
//!   that folds what propagation exposes)
//! - [`liveness`] - live ranges and preserved-location marking (an analysis,
//!   invoked once by the pipeline rather than iterated)

pub mod liveness;
pub mod propagate;
pub mod prune;

use crate::{
    config::Config,
    ir::{verify, ExprId, ExprKind, Function},
    simplify::Simplifier,
    ssa::SsaContext,
    Error, Result,
};

pub use propagate::{PropagateKind, Propagator};
pub use prune::{PruneKind, Pruner};

/// A transformation pass over a function in SSA form.
///
/// Passes return a changed/unchanged flag and never fail: recoverable
/// trouble is logged and skipped inside the pass.
pub trait Pass {
    /// Short machine-readable pass name (used in logs).
    fn name(&self) -> &'static str;

    /// Runs the pass once. Returns `true` if the IR changed.
    fn run(&mut self, func: &mut Function, ctx: &mut SsaContext, config: &Config) -> bool;
}

/// Runs a pass list to global fixpoint.
///
/// # Examples
///
/// ```rust,ignore
/// let mut opt = Optimizer::new(&config);
/// opt.add_pass(Box::new(Propagator::new(PropagateKind::SafeDefs)));
/// opt.add_pass(Box::new(Pruner::new(PruneKind::DeadRegisters)));
/// opt.run(&mut func, &mut ctx)?;
/// ```
pub struct Optimizer<'a> {
    config: &'a Config,
    passes: Vec<Box<dyn Pass>>,
}

impl<'a> Optimizer<'a> {
    /// Creates an optimizer with an empty pass list.
    #[must_use]
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            passes: Vec::new(),
        }
    }

    /// Appends a pass to the list.
    pub fn add_pass(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// Runs every pass to fixpoint, repeating the whole list until a round
    /// changes nothing (or the iteration cap strikes).
    ///
    /// # Errors
    ///
    /// Currently infallible in practice; the `Result` mirrors the driver
    /// contract so callers treat the optimizer like the other stages.
    pub fn run(&mut self, func: &mut Function, ctx: &mut SsaContext) -> Result<()> {
        let cap = self.config.max_pass_iterations.max(1);

        for _round in 0..cap {
            let mut round_changed = false;

            for pass in &mut self.passes {
                for iteration in 0..cap {
                    if !pass.run(func, ctx, self.config) {
                        break;
                    }
                    round_changed = true;
                    verify::check_logged(func, pass.name());

                    if iteration + 1 == cap {
                        let diverged = Error::FixpointDiverged {
                            pass: pass.name().to_string(),
                            iterations: cap,
                        };
                        log::warn!("{}: {diverged}", func.name());
                    }
                }
            }

            if !round_changed {
                return Ok(());
            }
        }

        log::warn!(
            "{}: optimizer round cap of {cap} reached without global fixpoint",
            func.name()
        );
        Ok(())
    }
}

/// Algebraic reduction of every statement, as an optimizer pass.
///
/// Propagation substitutes definitions into their uses; this pass folds the
/// resulting constant subtrees so that the next propagation round sees
/// simpler values.
pub struct SimplifyPass;

impl Pass for SimplifyPass {
    fn name(&self) -> &'static str {
        "simplify"
    }

    fn run(&mut self, func: &mut Function, _ctx: &mut SsaContext, config: &Config) -> bool {
        let mut changed = false;
        for block_idx in 0..func.blocks().len() {
            let stmt_count = func
                .block(block_idx)
                .map_or(0, |b| b.container().len());
            for stmt_idx in 0..stmt_count {
                let Some(mut stmt) = func
                    .block_mut(block_idx)
                    .and_then(|b| b.container_mut().remove(stmt_idx))
                else {
                    continue;
                };
                changed |= Simplifier::new(func.arena_mut(), config.converge)
                    .reduce_stmt(&mut stmt);
                if let Some(block) = func.block_mut(block_idx) {
                    block.container_mut().insert(stmt_idx, stmt);
                }
            }
        }
        changed
    }
}

/// Resolves a definition to its assignment root and assigned value.
///
/// Returns `None` when the definition is no longer the destination of a live
/// assignment.
pub(crate) fn def_site(func: &Function, def: ExprId) -> Option<(ExprId, ExprId)> {
    let assign = func.arena().parent_of(def)?;
    if !matches!(func.arena().kind(assign), Some(ExprKind::Assign)) {
        return None;
    }
    if func.arena().operands(assign).first() != Some(&def) {
        return None;
    }
    let val = *func.arena().operands(assign).get(1)?;
    Some((assign, val))
}

/// Returns `true` if `node` lies inside the subtree rooted at `root`.
pub(crate) fn is_inside(func: &Function, node: ExprId, root: ExprId) -> bool {
    let mut current = Some(node);
    while let Some(id) = current {
        if id == root {
            return true;
        }
        current = func.arena().parent_of(id);
    }
    false
}

/// Deletes the assignment of a definition: removes its statement, releases
/// the expression tree, and drops the context entry.
pub(crate) fn delete_assign(func: &mut Function, ctx: &mut SsaContext, key: &str, assign: ExprId) {
    if let Some(slot) = func.find_stmt(assign) {
        func.remove_stmt(slot);
    }
    func.arena_mut().pluck(assign, true);
    ctx.remove_def(key);
}
