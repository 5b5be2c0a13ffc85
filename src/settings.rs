//! Compile-time tunables (spec §4.5/§4.7 bounds, §7 verification toggle).
//!
//! Grounded on the teacher's `settings::Flags` pattern: a plain struct of
//! named knobs with a `Default` impl, instead of a process-wide global, so
//! two compilations in the same process (e.g. the test suite) never share
//! mutable configuration.

/// The priority heuristic the register allocator uses to pick which
/// potential-spill node to actually spill when more than one is a candidate
/// (spec §4.7's "Open Question: spill priority").
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SpillHeuristic {
    /// Spill the node with the highest degree in the interference graph
    /// (fewest future neighbors blocked). Cheap and the textbook default.
    MaxDegree,
    /// Spill the node with the highest `degree / uses` ratio, deprioritizing
    /// temporaries that are cheap to keep in registers because they're
    /// rarely referenced, at the cost of one extra counting pass.
    DegreeOverUses,
}

/// Tunables threaded through a single compilation.
#[derive(Clone, Debug)]
pub struct Flags {
    /// Run the shape-invariant checks from spec §7 after canonicalization,
    /// after trace scheduling, and after register allocation, failing fast
    /// with [`crate::result::CodegenError::VerifierFailure`] instead of
    /// emitting unverified assembly. Off by default; the test suite turns it
    /// on explicitly (`testing_hooks` feature).
    pub verify_each_pass: bool,
    /// Upper bound on iterations of the liveness dataflow's fixed-point loop
    /// before giving up and reporting
    /// [`crate::result::CodegenError::NonConvergentLiveness`].
    pub max_liveness_iterations: usize,
    /// Upper bound on register-allocator spill/restart rounds before giving
    /// up and reporting [`crate::result::CodegenError::ImpossibleSpill`].
    pub max_allocator_rounds: usize,
    /// Which node to pick when more than one is a potential-spill candidate.
    pub spill_heuristic: SpillHeuristic,
}

impl Default for Flags {
    fn default() -> Self {
        Flags {
            verify_each_pass: false,
            max_liveness_iterations: 1000,
            max_allocator_rounds: 32,
            spill_heuristic: SpillHeuristic::MaxDegree,
        }
    }
}

impl Flags {
    /// The flags the test suite runs under: verification on, small bounds so
    /// a genuine non-convergence bug fails fast instead of spinning.
    pub fn testing() -> Self {
        Flags {
            verify_each_pass: true,
            max_liveness_iterations: 100,
            max_allocator_rounds: 8,
            ..Flags::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flags_have_verification_off() {
        let f = Flags::default();
        assert!(!f.verify_each_pass);
        assert_eq!(f.spill_heuristic, SpillHeuristic::MaxDegree);
    }

    #[test]
    fn testing_flags_turn_verification_on() {
        let f = Flags::testing();
        assert!(f.verify_each_pass);
        assert!(f.max_allocator_rounds < Flags::default().max_allocator_rounds);
    }
}
