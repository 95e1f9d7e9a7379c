use thiserror::Error;

macro_rules! malformed_ir {
    // Single string version
    ($msg:expr) => {
        crate::Error::MalformedIr {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::MalformedIr {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers the failure modes of the decompiler mid-end: IR-model invariant
/// violations, missing architecture or calling-convention handlers, graph construction
/// problems, and fixpoint passes that fail to converge.
///
/// Note that errors never cross a pass boundary: every optimizer pass returns normally
/// with a changed/unchanged flag, and recoverable conditions (such as a use without a
/// reaching definition) are repaired in place rather than reported. The variants here
/// surface only from the pipeline driver and the front-end contract.
///
/// # Examples
///
/// ```rust
/// use pseudoscope::{frontend::ArchProfile, Error};
///
/// match ArchProfile::lookup("m88k") {
///     Ok(profile) => println!("lifting for {}", profile.name),
///     Err(Error::UnknownArch(name)) => eprintln!("no lifter for {name}"),
///     Err(e) => eprintln!("error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// An IR-model invariant was violated.
    ///
    /// This indicates that an expression tree, statement, or def-use link does not
    /// satisfy the structural rules of the IR (for example, an assignment whose
    /// left-hand side is not an assignable location). In debug builds the invariant
    /// checks assert; in release builds the offending statement is logged and skipped.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the violation was detected
    /// * `line` - Source line where the violation was detected
    #[error("Malformed IR - {file}:{line}: {message}")]
    MalformedIr {
        /// The message to be printed for the malformed-IR error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The front-end has no lifter for the requested architecture.
    ///
    /// Surfaced to the caller with the architecture name; no decompilation
    /// is emitted for the function.
    #[error("No architecture module available for '{0}'")]
    UnknownArch(String),

    /// No calling-convention handler matches a call site.
    ///
    /// Fails the current function, not the whole run.
    #[error("No calling convention handler for '{0}'")]
    UnknownCallConv(String),

    /// Control-flow graph construction or traversal error.
    ///
    /// This can occur when a block references a successor address that does not
    /// exist, or when a function has no entry block.
    #[error("{0}")]
    GraphError(String),

    /// A fixpoint pass exceeded its iteration cap.
    ///
    /// The driver breaks out, logs the pass name, and leaves the IR in its
    /// current (valid but not fully optimized) state. The pipeline reports this
    /// variant only when asked to treat divergence as fatal.
    #[error("Pass '{pass}' did not converge after {iterations} iterations")]
    FixpointDiverged {
        /// Name of the pass that failed to converge
        pass: String,
        /// Number of iterations that were executed before giving up
        iterations: usize,
    },
}
