//! Compilation errors.
//!
//! The teacher crate derives its `CodegenError` with `failure_derive` rather
//! than hand-writing `std::error::Error` impls; this crate's much smaller
//! error set follows the same pattern.

use failure_derive::Fail;

/// Everything that can make a compilation fail after the front-end has
/// handed over a valid fragment list.
#[derive(Fail, Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    /// The register allocator's select phase could not find a color for a
    /// node that was pushed onto the spill worklist, even after an
    /// actual-spill rewrite and restart. Indicates the procedure needs more
    /// than the configured maximum number of allocator restarts (spec §4.7's
    /// "Non-goals" bound this rather than guaranteeing termination).
    #[fail(display = "register allocation did not converge for procedure {}", proc_name)]
    ImpossibleSpill { proc_name: String },

    /// Coalescing produced a move whose source and destination ended up in
    /// the same connected component without ever being merged — a bug in the
    /// union-find bookkeeping, not a property of the input program.
    #[fail(display = "cycle detected while coalescing moves in procedure {}", proc_name)]
    CycleInCoalesce { proc_name: String },

    /// The liveness dataflow's live-in/live-out fixed point did not stabilize
    /// within the configured iteration bound (`Flags::max_liveness_iterations`).
    #[fail(
        display = "liveness analysis for procedure {} did not converge within {} iterations",
        proc_name, iterations
    )]
    NonConvergentLiveness { proc_name: String, iterations: usize },

    /// A temporary was read or written by an instruction but has no frame
    /// slot recorded for it, and the allocator spilled it. Indicates a bug in
    /// the spill-rewrite pass, not an invalid input program.
    #[fail(display = "no frame slot recorded for spilled temporary in procedure {}", proc_name)]
    MissingFrameSlot { proc_name: String },

    /// A canonical-form or trace-scheduling shape invariant (spec §7) was
    /// violated. Only raised when `Flags::verify_each_pass` is set; surfaces
    /// an internal bug rather than anything about the input program.
    #[fail(display = "shape invariant violated in procedure {}: {}", proc_name, detail)]
    VerifierFailure { proc_name: String, detail: String },
}

/// A convenient alias for a result whose error is a [`CodegenError`].
pub type CodegenResult<T> = Result<T, CodegenError>;
