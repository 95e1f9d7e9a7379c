// Copyright 2024-2026 the pseudoscope contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]

//! # pseudoscope
//!
//! The mid-end of a binary decompiler: it consumes the control-flow graph
//! and per-block lifted statements of a single function, produced by an
//! external analysis host and an architecture-specific lifter, and turns
//! them into a simplified, typed-ish intermediate representation in Static
//! Single Assignment form - def-use chains built, algebra canonicalized,
//! dead code and phi plumbing pruned, control flow structured - ready for a
//! pseudo-source printer.
//!
//! # Architecture
//!
//! The crate is organized as a pipeline of passes over a per-function IR:
//!
//! - **IR model**: expression tree, statements, containers, basic blocks,
//!   and the per-function expression arena
//! - **Graph primitives**: directed graph, DFS spanning order, dominator
//!   tree, dominance frontiers
//! - **Simplifier**: algebraic rewrite rules over expression trees
//! - **SSA builder**: phi insertion at dominance frontiers, dominator-tree
//!   renaming, def-use chain construction
//! - **Optimizer**: selector-driven propagation and pruning passes run to
//!   fixpoint
//! - **Control-flow recovery**: fall-throughs, loops, and if/else structure
//!   over the CFG
//!
//! # Key Components
//!
//! - [`Pipeline`] - the per-function driver tying the stages together
//! - [`ir::Function`] / [`ir::ExprArena`] - the IR a lifter builds and the
//!   pipeline transforms
//! - [`frontend`] - the host/lifter input contract and architecture profiles
//! - [`simplify::Simplifier`] - bottom-up expression canonicalization
//! - [`ssa::SsaBuilder`] - SSA construction (Cytron et al.)
//! - [`opt::Optimizer`] - the pass driver with its propagation/pruning family
//! - [`cflow`] - control-flow structure recovery for the printer
//! - [`Error`] and [`Result`] - crate-wide error handling
//!
//! # Usage
//!
//! ```rust
//! use pseudoscope::{
//!     frontend::ArchProfile,
//!     ir::{BasicBlock, Function, Statement},
//!     Config, Pipeline,
//! };
//!
//! // Normally the lifter builds this from host-supplied disassembly.
//! let mut func = Function::new(0x1000, "answer");
//! let mut block = BasicBlock::new(0x1000);
//! block.set_exit(true);
//! func.add_block(block);
//!
//! let forty = func.arena_mut().val(40, 32);
//! let two = func.arena_mut().val(2, 32);
//! let sum = func
//!     .arena_mut()
//!     .binary(pseudoscope::ir::BinaryOp::Add, forty, two, 32);
//! func.block_mut(0)
//!     .unwrap()
//!     .container_mut()
//!     .push(Statement::ret(0x1000, Some(sum)));
//!
//! let pipeline = Pipeline::new(Config::default());
//! let arch = ArchProfile::lookup("x64")?;
//! pipeline.run(&mut func, arch)?;
//!
//! assert_eq!(func.block(0).unwrap().container().stmts()[0].render(func.arena()), "return 42");
//! # Ok::<(), pseudoscope::Error>(())
//! ```
//!
//! # Scope
//!
//! Instruction decoding, the host command bridge, the pseudo-source printer,
//! and CLI dispatch are external collaborators; only their interface
//! contracts appear here (see [`frontend`] and [`config`]). The core
//! performs no type inference beyond bit-width tracking and no
//! interprocedural analysis.
//!
//! # Concurrency
//!
//! The core is single-threaded and purely CPU-bound. Each function is
//! processed in isolation; within a function the IR graph is mutated in
//! place, with every structural edit maintaining the parent/def/uses links
//! atomically before returning.

#[macro_use]
pub(crate) mod error;

/// Decompiler configuration surface.
pub mod config;
/// Control-flow structure recovery.
pub mod cflow;
/// Host and lifter input contract.
pub mod frontend;
/// The per-function intermediate representation.
pub mod ir;
/// The optimizer driver and pass family.
pub mod opt;
/// The per-function pipeline driver.
mod pipeline;
/// Convenient re-exports of the most commonly used types.
pub mod prelude;
/// Algebraic simplification.
pub mod simplify;
/// SSA construction.
pub mod ssa;
/// Graph infrastructure.
pub mod utils;

/// `pseudoscope` Result type.
///
/// A type alias for `std::result::Result<T, Error>` where the error type is
/// always [`crate::Error`], used consistently throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// `pseudoscope` Error type.
///
/// The main error type for all operations in this crate, covering IR-model
/// violations, missing architecture/calling-convention handlers, graph
/// construction problems, and diverged fixpoints.
pub use error::Error;

pub use config::Config;
pub use pipeline::{Pipeline, PipelineOutput};
