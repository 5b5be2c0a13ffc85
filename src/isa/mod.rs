//! Target-ISA abstraction.
//!
//! Cranelift's `TargetIsa` spans a family of machines selected at runtime
//! from a `target_lexicon::Triple`. This crate has exactly one ISA, so
//! `TargetIsa` is kept as a trait (matching the teacher's seam — selection
//! code and the instruction selector are written against the trait, not the
//! concrete type) but there is only one implementation, [`TigerIsa`].

pub mod call_conv;
pub mod registers;
pub mod select;

use self::call_conv::CallConv;
use self::registers::MachineReg;

/// Everything the rest of the pipeline needs to know about the target
/// machine (spec §6's "ISA assumptions the implementation must declare").
pub trait TargetIsa {
    /// Number of allocatable machine registers.
    fn num_allocatable_regs(&self) -> usize;
    /// All allocatable machine registers.
    fn allocatable_regs(&self) -> Vec<MachineReg>;
    /// Registers the callee may clobber without saving/restoring.
    fn caller_saved(&self) -> &'static [MachineReg];
    /// Registers the callee must preserve across a call.
    fn callee_saved(&self) -> &'static [MachineReg];
    /// Registers used to pass the first N outgoing arguments.
    fn arg_regs(&self) -> &'static [MachineReg];
    /// The frame-pointer register.
    fn frame_pointer(&self) -> MachineReg;
    /// The stack-pointer register.
    fn stack_pointer(&self) -> MachineReg;
    /// The return-value register.
    fn return_value(&self) -> MachineReg;
    /// Machine word size, in bytes.
    fn word_size(&self) -> i64;
    /// The calling convention this ISA uses.
    fn call_conv(&self) -> CallConv;
}

/// The one concrete ISA this crate targets.
#[derive(Copy, Clone, Default)]
pub struct TigerIsa;

impl TargetIsa for TigerIsa {
    fn num_allocatable_regs(&self) -> usize {
        registers::K
    }

    fn allocatable_regs(&self) -> Vec<MachineReg> {
        registers::allocatable()
    }

    fn caller_saved(&self) -> &'static [MachineReg] {
        registers::CALLER_SAVED
    }

    fn callee_saved(&self) -> &'static [MachineReg] {
        registers::CALLEE_SAVED
    }

    fn arg_regs(&self) -> &'static [MachineReg] {
        registers::ARG_REGS
    }

    fn frame_pointer(&self) -> MachineReg {
        registers::FP
    }

    fn stack_pointer(&self) -> MachineReg {
        registers::SP
    }

    fn return_value(&self) -> MachineReg {
        registers::RV
    }

    fn word_size(&self) -> i64 {
        registers::WORD_SIZE
    }

    fn call_conv(&self) -> CallConv {
        CallConv
    }
}
