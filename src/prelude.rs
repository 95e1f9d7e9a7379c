//! # pseudoscope Prelude
//!
//! Convenient re-exports of the most commonly used types for building,
//! transforming, and inspecting decompiler IR. Import this module to get
//! quick access to the essentials:
//!
//! ```rust
//! use pseudoscope::prelude::*;
//!
//! let mut func = Function::new(0x1000, "f");
//! func.add_block(BasicBlock::new(0x1000));
//! let pipeline = Pipeline::new(Config::default());
//! # let _ = pipeline;
//! ```

/// The main error type for all pseudoscope operations
pub use crate::Error;

/// The result type used throughout pseudoscope
pub use crate::Result;

/// Decompiler configuration
pub use crate::config::{Config, OutputOptions};

/// The per-function pipeline driver
pub use crate::{Pipeline, PipelineOutput};

/// IR model: expressions, statements, blocks, functions
pub use crate::ir::{
    BasicBlock, BinaryOp, CloneKeep, CmpOp, Container, Expr, ExprArena, ExprFlags, ExprId,
    ExprKind, Function, Statement, StmtKind, UnaryOp,
};

/// Front-end contract types
pub use crate::frontend::{
    ArchProfile, ArgDescriptor, ArgKind, BlockDescriptor, CallConv, FunctionDescriptor,
    InsnDescriptor, LocationRef,
};

/// Algebraic simplification
pub use crate::simplify::Simplifier;

/// SSA construction
pub use crate::ssa::{NameClass, SsaBuilder, SsaContext};

/// Optimizer passes
pub use crate::opt::{Optimizer, PropagateKind, Propagator, PruneKind, Pruner, SimplifyPass};

/// Control-flow recovery
pub use crate::cflow::Scope;
