//! Statements: the units a basic block body is made of.
//!
//! A statement holds the address it was lifted from and an ordered list of
//! top-level expressions (typically one). Control-transferring statements
//! (`Return`, `Goto`, `Branch`) are distinguished by [`StmtKind`]; their
//! successor addresses live on the owning [`BasicBlock`](crate::ir::BasicBlock),
//! not in the statement.

use crate::ir::{ExprArena, ExprId, ExprKind};

/// The kind of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmtKind {
    /// Plain expression statement (an assignment or a bare call).
    Expr,
    /// Return from the function, optionally with a value expression.
    Return,
    /// Unconditional transfer; the target is the block's `jump` successor.
    Goto,
    /// Conditional transfer; holds the condition expression. Taken and
    /// fall-through targets are the block's `jump` and `fail` successors.
    Branch,
}

/// A single statement: an address plus its top-level expressions.
#[derive(Debug, Clone)]
pub struct Statement {
    addr: u64,
    kind: StmtKind,
    exprs: Vec<ExprId>,
}

impl Statement {
    /// Creates a plain expression statement.
    #[must_use]
    pub fn expr(addr: u64, root: ExprId) -> Self {
        Self {
            addr,
            kind: StmtKind::Expr,
            exprs: vec![root],
        }
    }

    /// Creates a return statement with an optional value.
    #[must_use]
    pub fn ret(addr: u64, value: Option<ExprId>) -> Self {
        Self {
            addr,
            kind: StmtKind::Return,
            exprs: value.into_iter().collect(),
        }
    }

    /// Creates an unconditional-transfer statement.
    #[must_use]
    pub fn goto(addr: u64) -> Self {
        Self {
            addr,
            kind: StmtKind::Goto,
            exprs: Vec::new(),
        }
    }

    /// Creates a conditional-transfer statement around `condition`.
    #[must_use]
    pub fn branch(addr: u64, condition: ExprId) -> Self {
        Self {
            addr,
            kind: StmtKind::Branch,
            exprs: vec![condition],
        }
    }

    /// Returns the address this statement was lifted from.
    #[must_use]
    pub const fn addr(&self) -> u64 {
        self.addr
    }

    /// Returns the statement kind.
    #[must_use]
    pub const fn kind(&self) -> StmtKind {
        self.kind
    }

    /// Returns the top-level expressions, in order.
    #[must_use]
    pub fn exprs(&self) -> &[ExprId] {
        &self.exprs
    }

    /// Returns the top-level expressions mutably (for root replacement).
    pub fn exprs_mut(&mut self) -> &mut Vec<ExprId> {
        &mut self.exprs
    }

    /// Returns the first top-level expression, if any.
    #[must_use]
    pub fn root(&self) -> Option<ExprId> {
        self.exprs.first().copied()
    }

    /// Returns `true` if this statement assigns a phi: `loc = Phi(...)`.
    #[must_use]
    pub fn is_phi_assign(&self, arena: &ExprArena) -> bool {
        let Some(root) = self.root() else {
            return false;
        };
        if !matches!(arena.kind(root), Some(ExprKind::Assign)) {
            return false;
        }
        arena
            .operands(root)
            .get(1)
            .is_some_and(|&rhs| matches!(arena.kind(rhs), Some(ExprKind::Phi)))
    }

    /// Renders the statement as pseudo-source text (debug representation).
    #[must_use]
    pub fn render(&self, arena: &ExprArena) -> String {
        match self.kind {
            StmtKind::Expr => self
                .root()
                .map_or_else(String::new, |root| arena.render(root)),
            StmtKind::Return => match self.root() {
                Some(value) => format!("return {}", arena.render(value)),
                None => "return".to_string(),
            },
            StmtKind::Goto => "goto".to_string(),
            StmtKind::Branch => self.root().map_or_else(
                || "if (?)".to_string(),
                |cond| format!("if {}", arena.render(cond)),
            ),
        }
    }
}
