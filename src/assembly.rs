//! Abstract-temporary assembly instructions (spec §3.5).
//!
//! The `defs`/`src`/jump-target lists are small (almost always 0-3 entries),
//! which is exactly the case `smallvec` exists for — a declared-but-idle
//! teacher dependency, now doing real work.

use crate::entities::{Label, Temp};
use crate::isa::registers::MachineReg;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;

/// A small vector of temporaries; most instructions define or use at most a
/// couple.
pub type TempVec = SmallVec<[Temp; 2]>;

/// An abstract-temporary assembly instruction.
#[derive(Clone, Debug)]
pub enum Instruction {
    /// A general operation. `jump_targets = None` means fall-through;
    /// `Some(labels)` means this instruction may transfer control to any of
    /// `labels` (a `Call`'s `jump_targets` is always `None` — it falls
    /// through — while a conditional branch's is `Some(&[t, f])`).
    Oper {
        template: String,
        dst: TempVec,
        src: TempVec,
        jump_targets: Option<Vec<Label>>,
    },
    /// A register-to-register (or register-to-memory) move. Kept distinct
    /// from `Oper` so the interference builder and the post-allocation
    /// cleanup pass can recognize moves without parsing templates.
    Move { template: String, dst: Temp, src: Temp },
    /// A code label, marking a jump target.
    Label { template: String, label: Label },
}

impl Instruction {
    /// Temporaries this instruction defines (writes).
    pub fn defs(&self) -> TempVec {
        match self {
            Instruction::Oper { dst, .. } => dst.clone(),
            Instruction::Move { dst, .. } => {
                let mut v = TempVec::new();
                v.push(*dst);
                v
            }
            Instruction::Label { .. } => TempVec::new(),
        }
    }

    /// Temporaries this instruction uses (reads).
    pub fn uses(&self) -> TempVec {
        match self {
            Instruction::Oper { src, .. } => src.clone(),
            Instruction::Move { src, .. } => {
                let mut v = TempVec::new();
                v.push(*src);
                v
            }
            Instruction::Label { .. } => TempVec::new(),
        }
    }

    /// Is this a `Move`?
    pub fn is_move(&self) -> bool {
        matches!(self, Instruction::Move { .. })
    }

    /// Labels this instruction may jump to, if it is a jump/branch.
    pub fn jump_targets(&self) -> Option<&[Label]> {
        match self {
            Instruction::Oper { jump_targets, .. } => jump_targets.as_deref(),
            _ => None,
        }
    }

    /// If this instruction is a `Label`, the label it marks.
    pub fn as_label(&self) -> Option<Label> {
        match self {
            Instruction::Label { label, .. } => Some(*label),
            _ => None,
        }
    }
}

/// The process-wide (well, per-compilation) mapping from temporaries to
/// concrete machine registers, populated by allocation and consulted by the
/// emitter.
#[derive(Clone, Default, Debug)]
pub struct TempMap {
    map: HashMap<Temp, MachineReg>,
}

impl TempMap {
    /// An empty map.
    pub fn new() -> Self {
        Self { map: HashMap::new() }
    }

    /// Record that `t` was assigned `reg`.
    pub fn insert(&mut self, t: Temp, reg: MachineReg) {
        self.map.insert(t, reg);
    }

    /// The register `t` was assigned, if any.
    pub fn get(&self, t: Temp) -> Option<MachineReg> {
        self.map.get(&t).copied()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Instruction::Oper { template, .. } => write!(f, "{}", template),
            Instruction::Move { template, .. } => write!(f, "{}", template),
            Instruction::Label { template, .. } => write!(f, "{}", template),
        }
    }
}
