//! The per-function decompilation pipeline.
//!
//! Glues the stages together in their fixed order:
//!
//! 1. discard unreachable blocks (DFS spanning order)
//! 2. SSA wave over registers, phi relaxation
//! 3. propagation of the architecture's location registers (stack pointer,
//!    flags) so later waves see canonical addresses
//! 4. SSA waves over variables and dereferences, phi relaxation after each
//! 5. preserved-location analysis (marks callee-saved save/restore chains)
//! 6. the optimizer round: safe-def propagation, algebraic simplification,
//!    and the pruning family, each to fixpoint, repeated until stable
//! 7. `transform_out` (SSA subscripts erased; phis survive)
//! 8. control-flow recovery (fall-throughs, loops, conditionals)
//!
//! Each function is processed in isolation; nothing is shared across
//! functions. A stage that gives up (cap hit, malformed statement) logs one
//! line and the pipeline continues with the IR as it stands.

use crate::{
    cflow::{self, Scope},
    config::Config,
    frontend::ArchProfile,
    ir::Function,
    opt::{
        liveness, Optimizer, PropagateKind, Propagator, PruneKind, Pruner, SimplifyPass,
    },
    ssa::{relax_phis, NameClass, SsaBuilder, SsaContext},
    Result,
};

/// The decompiler mid-end, configured once and run per function.
///
/// # Examples
///
/// ```rust,ignore
/// let pipeline = Pipeline::new(Config::default());
/// let arch = ArchProfile::lookup("x64")?;
/// let result = pipeline.run(&mut func, arch)?;
/// for scope in &result.scopes {
///     println!("{scope:?}");
/// }
/// ```
pub struct Pipeline {
    config: Config,
}

/// What the pipeline hands to the back-end printer, besides the transformed
/// function itself: the recovered control-flow scopes and the SSA context
/// (def table and preserved locations) for diagnostics.
#[derive(Debug)]
pub struct PipelineOutput {
    /// Recovered control-flow scopes over block indices.
    pub scopes: Vec<Scope>,
    /// Final SSA bookkeeping (preserved pairs, surviving definitions).
    pub ctx: SsaContext,
}

impl Pipeline {
    /// Creates a pipeline with the given configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the full mid-end over one function.
    ///
    /// On return the function is in printer form: simplified, pruned,
    /// subscript-free, with phi nodes surviving at the joins.
    ///
    /// # Errors
    ///
    /// Returns an error only for structural problems (no blocks, no entry);
    /// optimizer trouble is logged and absorbed per the pass contract.
    pub fn run(&self, func: &mut Function, arch: &ArchProfile) -> Result<PipelineOutput> {
        func.retain_reachable()?;

        let mut ctx = SsaContext::new();

        // Wave 1: registers
        SsaBuilder::run(func, &mut ctx, NameClass::Registers)?;
        relax_phis(func, &mut ctx);

        // Canonicalize known locations before the memory wave
        let mut canonicalize = Optimizer::new(&self.config);
        canonicalize.add_pass(Box::new(Propagator::new(PropagateKind::Locations(
            arch.location_registers(),
        ))));
        canonicalize.add_pass(Box::new(SimplifyPass));
        canonicalize.run(func, &mut ctx)?;

        // Waves 2 and 3: variables, then memory
        SsaBuilder::run(func, &mut ctx, NameClass::Variables)?;
        relax_phis(func, &mut ctx);
        SsaBuilder::run(func, &mut ctx, NameClass::Derefs)?;
        relax_phis(func, &mut ctx);

        // Callee-saved save/restore chains become prunable
        liveness::mark_preserved_locations(func, &mut ctx)?;

        // Main optimization round
        let mut optimizer = Optimizer::new(&self.config);
        optimizer.add_pass(Box::new(Propagator::new(PropagateKind::SafeDefs)));
        optimizer.add_pass(Box::new(SimplifyPass));
        optimizer.add_pass(Box::new(Pruner::new(PruneKind::DeadResults)));
        optimizer.add_pass(Box::new(Pruner::new(PruneKind::DeadRegisters)));
        optimizer.add_pass(Box::new(Pruner::new(PruneKind::DeadDerefs)));
        optimizer.add_pass(Box::new(Pruner::new(PruneKind::CircularPhis)));
        optimizer.run(func, &mut ctx)?;

        // Printer form: subscripts erased, phis kept
        func.transform_out();

        let scopes = cflow::recover(func, &self.config)?;
        Ok(PipelineOutput { scopes, ctx })
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
