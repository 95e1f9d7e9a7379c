//! Algebraic simplification of expression trees.
//!
//! The simplifier canonicalizes expressions by repeatedly applying rewrite
//! rules bottom-up until none fires. It is used in two places: once after SSA
//! construction to canonicalize addresses and conditions, and inside the
//! optimizer loop to fold the constants that copy propagation exposes.
//!
//! # Engine
//!
//! [`Simplifier::reduce_expr`] performs a post-order walk: every operand is
//! reduced to its own fixpoint first, then the rules for the current node's
//! arity are tried in a fixed order until one fires, and the process repeats
//! on the replacement. Termination is guaranteed because every firing rule
//! strictly shrinks a well-founded measure - it removes a node, replaces a
//! subtree with a constant, or moves a constant towards the root through a
//! finite associative chain.
//!
//! Definitions (nodes flagged `IS_DEF`) are never rewritten themselves, only
//! their operand subtrees; rewriting a definition would orphan its readers.
//!
//! # Rule categories
//!
//! See [`rules`] for the full catalogue: arithmetic and bitwise identities,
//! sign correction, ref/deref cancellation, sign-safe constant folding,
//! reassociation, equality algebra, boolean negation (including deMorgan),
//! converged relational algebra over the 3-bit [`relational`] rank lattice,
//! and ternary folding.

pub mod relational;
mod rules;

use crate::ir::{CloneKeep, ExprArena, ExprId, Statement};

/// Bottom-up expression rewriter.
///
/// Borrows the function's arena for the duration of a reduction. The
/// `converge` switch (config `cflow.converge`) enables the converged-
/// condition rules that merge comparisons of the same operands.
///
/// # Examples
///
/// ```rust
/// use pseudoscope::ir::{BinaryOp, ExprArena};
/// use pseudoscope::simplify::Simplifier;
///
/// let mut arena = ExprArena::new();
/// let x = arena.reg("eax", 32);
/// let zero = arena.val(0, 32);
/// let add = arena.binary(BinaryOp::Add, x, zero, 32);
///
/// let reduced = Simplifier::new(&mut arena, true).reduce_expr(add);
/// assert_eq!(reduced, x);
/// ```
pub struct Simplifier<'a> {
    pub(crate) arena: &'a mut ExprArena,
    pub(crate) converge: bool,
}

impl<'a> Simplifier<'a> {
    /// Creates a simplifier over `arena`.
    pub fn new(arena: &'a mut ExprArena, converge: bool) -> Self {
        Self { arena, converge }
    }

    /// Reduces every top-level expression of a statement in place.
    ///
    /// Returns `true` if anything changed.
    pub fn reduce_stmt(&mut self, stmt: &mut Statement) -> bool {
        let mut changed = false;
        for root in stmt.exprs_mut() {
            let reduced = Self::reduce_rooted(self.arena, self.converge, *root);
            if reduced != *root {
                *root = reduced;
                changed = true;
            }
        }
        changed
    }

    /// Reduces the subtree rooted at `id` to its fixpoint and returns the id
    /// of the (possibly new) root.
    ///
    /// When the root itself is rewritten and it has a parent, the parent's
    /// operand slot is updated in place; for statement roots the caller must
    /// store the returned id (which [`reduce_stmt`](Self::reduce_stmt) does).
    pub fn reduce_expr(&mut self, id: ExprId) -> ExprId {
        Self::reduce_rooted(self.arena, self.converge, id)
    }

    fn reduce_rooted(arena: &mut ExprArena, converge: bool, id: ExprId) -> ExprId {
        let mut engine = Simplifier { arena, converge };
        engine.reduce_rec(id)
    }

    fn reduce_rec(&mut self, id: ExprId) -> ExprId {
        // Reduce every operand to its own fixpoint first. Child replacement
        // rewrites the operand slot of `id` in place, so iterate by position.
        let mut i = 0;
        loop {
            let ops = self.arena.operands(id);
            let Some(&op) = ops.get(i) else { break };
            self.reduce_rec(op);
            i += 1;
        }

        // Then rewrite the node itself until no rule fires.
        let mut current = id;
        loop {
            if self.arena.has_flags(current, crate::ir::ExprFlags::IS_DEF) {
                break;
            }
            let Some(replacement) = self.try_rules(current) else {
                break;
            };
            self.arena.replace(current, replacement);
            current = replacement;

            // A rule may have built fresh interior nodes (e.g. reassociation
            // producing a constant pair); give their operands one more pass.
            let mut j = 0;
            loop {
                let ops = self.arena.operands(current);
                let Some(&op) = ops.get(j) else { break };
                self.reduce_rec(op);
                j += 1;
            }
        }
        current
    }

    /// Hoists the `index`-th operand of `id` out of the tree for reuse as a
    /// replacement.
    pub(crate) fn hoist(&mut self, id: ExprId, index: usize) -> Option<ExprId> {
        self.arena.take_operand(id, index)
    }

    /// Builds a detached copy of an operand, preserving SSA links, for rules
    /// that reuse a subexpression in a new shape.
    pub(crate) fn copy(&mut self, id: ExprId) -> ExprId {
        self.arena.clone_expr(id, CloneKeep::links())
    }
}
