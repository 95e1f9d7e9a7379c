//! Intermediate representation of a lifted function.
//!
//! This module defines the expression/statement model that the whole mid-end
//! operates on, re-architected from a pointer-heavy object graph into an
//! arena with stable indices:
//!
//! - [`expr`] - the expression node: a closed tagged sum plus per-node
//!   attributes (bit width, SSA subscript, def-use links, flags)
//! - [`arena`] - [`ExprArena`], the per-function expression store that owns
//!   every node and maintains the three bidirectional links (parent pointer,
//!   definition's users list, user's definition pointer)
//! - [`stmt`] - statements: plain expression statements, `Return`, `Goto`,
//!   and `Branch`
//! - [`container`] - the ordered statement list forming a basic block body
//! - [`block`] - basic blocks with `jump` / `fail` / `cases` successors
//! - [`function`] - the per-function unit: blocks, the expression arena, the
//!   synthetic `uninit` container, and the control flow graph view
//! - [`verify`] - debug-build invariant checks run between passes
//!
//! # Ownership model
//!
//! Expressions form a tree through `parent`/operand links, with cross-edges
//! (`def`, `uses`) forming a separate DAG. All of it lives in the arena:
//! removing an expression tombstones its slot, and memory is reclaimed when
//! the [`Function`](function::Function) is dropped. No reference counting, no
//! owning pointers between nodes.

pub mod arena;
pub mod block;
pub mod container;
pub mod expr;
pub mod function;
pub mod stmt;
pub mod verify;

pub use arena::{CloneKeep, ExprArena, ExprId};
pub use block::BasicBlock;
pub use container::Container;
pub use expr::{BinaryOp, CmpOp, Expr, ExprFlags, ExprKind, UnaryOp};
pub use function::{Cfg, Function, Location, Variable};
pub use stmt::{Statement, StmtKind};
