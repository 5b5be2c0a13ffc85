//! The fixed target ISA: a small stack-and-frame-pointer machine with 8
//! general-purpose registers.
//!
//! Cranelift's own `isa::registers` models a *family* of ISAs through
//! meta-generated `RegBank`/`RegClassData` tables (see DESIGN.md). This crate
//! targets exactly one machine, so the register file is a flat, hand-written
//! table instead: simpler, and there is nothing it would buy us to generalize.

use std::fmt;

/// A concrete machine register.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct MachineReg(pub u8);

/// Number of allocatable machine registers (spec §6's `K`). Two registers in
/// the file below (`FP`, `SP`) are reserved and not allocatable, so `K` is
/// smaller than `REGISTER_NAMES.len()`.
pub const K: usize = 6;

/// All registers in the file, in a fixed order; index 0..K are allocatable
/// general-purpose registers, the remainder are reserved.
pub const REGISTER_NAMES: &[&str] = &["r0", "r1", "r2", "r3", "r4", "r5", "fp", "sp"];

/// The frame-pointer register.
pub const FP: MachineReg = MachineReg(6);
/// The stack-pointer register.
pub const SP: MachineReg = MachineReg(7);
/// The return-value register.
pub const RV: MachineReg = MachineReg(0);

/// Registers used to pass the first `ARG_REGS.len()` outgoing arguments.
/// Further arguments are passed on the stack (spec §4.4's "outgoing-args
/// area").
pub const ARG_REGS: &[MachineReg] = &[MachineReg(0), MachineReg(1)];

/// Registers a callee may clobber without saving/restoring (spec §6).
pub const CALLER_SAVED: &[MachineReg] = &[MachineReg(0), MachineReg(1), MachineReg(2)];

/// Registers a callee must preserve across a call (spec §6).
pub const CALLEE_SAVED: &[MachineReg] = &[MachineReg(3), MachineReg(4), MachineReg(5)];

/// Word size in bytes.
pub const WORD_SIZE: i64 = 8;

/// Stack grows toward lower addresses.
pub const STACK_GROWS_DOWN: bool = true;

/// Required stack alignment, in bytes, at a `Call` instruction.
pub const STACK_ALIGNMENT: i64 = 16;

/// All registers that must be considered "allocatable" by the register
/// allocator: every caller-saved and callee-saved register, nothing else.
pub fn allocatable() -> Vec<MachineReg> {
    CALLER_SAVED.iter().chain(CALLEE_SAVED.iter()).copied().collect()
}

impl MachineReg {
    /// This register's assembly name, e.g. `%r0`.
    pub fn name(self) -> &'static str {
        REGISTER_NAMES[self.0 as usize]
    }
}

impl fmt::Display for MachineReg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "%{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn k_matches_allocatable_count() {
        assert_eq!(allocatable().len(), K);
    }

    #[test]
    fn fp_sp_are_not_allocatable() {
        assert!(!allocatable().contains(&FP));
        assert!(!allocatable().contains(&SP));
    }

    #[test]
    fn arg_regs_are_caller_saved() {
        for r in ARG_REGS {
            assert!(CALLER_SAVED.contains(r));
        }
    }
}
