//! Decompiler configuration.
//!
//! The configuration surface mirrors what the host registers for the
//! decompiler command: the two switches the core consumes (`opt.noalias`,
//! `cflow.converge`), the iteration cap that bounds every fixpoint, and the
//! output options that are forwarded untouched to the back-end printer.

/// Options consumed by the core pipeline plus the pass-through printer
/// options.
#[derive(Debug, Clone)]
pub struct Config {
    /// `opt.noalias`: assume memory dereferences do not alias, allowing
    /// dead-store elimination to remove unused stores.
    pub noalias: bool,
    /// `cflow.converge`: collapse related conditions via the relational rank
    /// lattice.
    pub converge: bool,
    /// Iteration cap for every fixpoint pass. A pass that still reports
    /// changes when the cap strikes is logged and abandoned.
    pub max_pass_iterations: usize,
    /// Printer options (`out.*`), not interpreted by the core.
    pub out: OutputOptions,
}

/// Pass-through options for the pseudo-source printer.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// `out.offsets`: prefix each line with its address.
    pub offsets: bool,
    /// `out.guides`: scope guideline style (0 none, 1 solid, 2 dashed).
    pub guides: u8,
    /// `out.newline`: newline before an opening brace.
    pub newline: bool,
    /// `out.tabsize`: indent width.
    pub tabsize: u8,
    /// `out.theme`: syntax highlighting palette name.
    pub theme: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            noalias: false,
            converge: true,
            max_pass_iterations: 64,
            out: OutputOptions::default(),
        }
    }
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            offsets: true,
            guides: 1,
            newline: true,
            tabsize: 4,
            theme: "dark+".to_string(),
        }
    }
}
