//! Per-procedure stack-frame model and calling-convention embodiment.
//!
//! Grounded on spec §3.6/§3.7/§4.8 and on `original_source/compile.py`'s
//! `sink(assembly_body)` / `assembly_procedure(fragment.frame, ...)` /
//! `fragment.frame` call shape.

use crate::assembly::{Instruction, TempMap};
use crate::context::Context;
use crate::entities::{Label, Temp};
use crate::ir::expr::{BinOp, Expr};
use crate::ir::stmt::Stmt;
use crate::isa::registers::MachineReg;
use crate::isa::TargetIsa;
use smallvec::smallvec;

/// Where a formal parameter or local variable lives.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Access {
    /// Held in a register for its whole lifetime (subject to the same
    /// register allocation as any other temporary — it may still be
    /// spilled).
    InReg(Temp),
    /// Held at a fixed frame-pointer-relative byte offset.
    InFrame(i64),
}

/// Per-procedure stack-frame object.
#[derive(Debug)]
pub struct Frame {
    /// The procedure's entry label.
    pub name: Label,
    /// One access per formal parameter, in declaration order.
    pub formals: Vec<Access>,
    /// Byte offset (relative to the frame pointer) of the next local slot.
    next_local_offset: i64,
    /// Byte offset of the next incoming-argument frame slot.
    next_incoming_offset: i64,
    /// Fresh temps that hold the callee-saved machine registers for the
    /// duration of this procedure's body.
    callee_save_temps: Vec<(MachineReg, Temp)>,
    /// Frame slots allocated to hold spilled temporaries.
    pub spills: Vec<Access>,
}

/// A unit of back-end input: either a procedure body with its frame, or a
/// string literal (spec §3.7).
pub enum Fragment {
    /// A procedure body plus its frame descriptor.
    Proc { body: Stmt, frame: Frame },
    /// A string literal, to be emitted in the data section. `data` is raw
    /// bytes; escape interpretation is the front-end's responsibility
    /// (spec §6).
    Str { label: Label, data: Vec<u8> },
}

impl Frame {
    /// Construct a frame for a procedure with the given formal-parameter
    /// escape flags, returning the frame plus the view-shift prologue: IR
    /// statements that move incoming-argument registers into their formal
    /// accesses and save the callee-saved machine registers into fresh
    /// temps (spec §4.8).
    pub fn new(
        ctx: &mut Context,
        isa: &dyn TargetIsa,
        name: Label,
        formal_escapes: &[bool],
    ) -> (Frame, Stmt) {
        let mut frame = Frame {
            name,
            formals: Vec::new(),
            next_local_offset: -isa.word_size(),
            next_incoming_offset: 2 * isa.word_size(),
            callee_save_temps: Vec::new(),
            spills: Vec::new(),
        };

        let mut prologue = Vec::new();
        let arg_regs = isa.arg_regs();
        for (i, &escapes) in formal_escapes.iter().enumerate() {
            let access = if escapes {
                frame.alloc_frame_slot_for_incoming()
            } else {
                Access::InReg(ctx.new_temp())
            };
            if let (Some(&reg), false) = (arg_regs.get(i), escapes) {
                let reg_temp = ctx.machine_temp(reg);
                if let Access::InReg(t) = access {
                    prologue.push(Stmt::move_(Expr::Temp(t), Expr::Temp(reg_temp)));
                }
            } else if let Some(&reg) = arg_regs.get(i) {
                // Escaping formal passed in a register: store straight to its
                // frame slot.
                let reg_temp = ctx.machine_temp(reg);
                prologue.push(Stmt::move_(
                    frame.exp(access, Expr::Temp(ctx.machine_temp(isa.frame_pointer()))),
                    Expr::Temp(reg_temp),
                ));
            }
            // Formals beyond `arg_regs.len()` already arrived in their
            // incoming frame slot; nothing to shift.
            frame.formals.push(access);
        }

        for &reg in isa.callee_saved() {
            let save = ctx.new_temp();
            let reg_temp = ctx.machine_temp(reg);
            prologue.push(Stmt::move_(Expr::Temp(save), Expr::Temp(reg_temp)));
            frame.callee_save_temps.push((reg, save));
        }

        (frame, Stmt::seq_all(prologue))
    }

    fn alloc_frame_slot_for_incoming(&mut self) -> Access {
        let off = self.next_incoming_offset;
        self.next_incoming_offset += 8;
        Access::InFrame(off)
    }

    /// Allocate a local variable.
    pub fn alloc_local(&mut self, ctx: &mut Context, escapes: bool) -> Access {
        if escapes {
            let off = self.next_local_offset;
            self.next_local_offset -= 8;
            Access::InFrame(off)
        } else {
            Access::InReg(ctx.new_temp())
        }
    }

    /// Allocate a frame slot to hold a spilled temporary (consumed by the
    /// register allocator's actual-spill rewrite, spec §4.7).
    pub fn alloc_spill_slot(&mut self, ctx: &mut Context) -> Access {
        let off = self.next_local_offset;
        self.next_local_offset -= 8;
        let access = Access::InFrame(off);
        self.spills.push(access);
        let _ = ctx;
        access
    }

    /// The address expression for an access, given an expression that
    /// evaluates to the frame pointer.
    pub fn exp(&self, access: Access, fp: Expr) -> Expr {
        match access {
            Access::InReg(t) => Expr::Temp(t),
            Access::InFrame(offset) => Expr::mem(Expr::binop(BinOp::Add, fp, Expr::Const(offset))),
        }
    }

    /// IR statements that restore the callee-saved machine registers from
    /// the temps `view_shift_prologue` saved them into. Appended to the end
    /// of the procedure body, before canonicalization, so they are
    /// register-allocated like any other code (spec §4.8).
    pub fn epilogue_restores(&self, ctx: &Context) -> Stmt {
        let _ = ctx;
        let moves = self
            .callee_save_temps
            .iter()
            .map(|&(reg, saved)| {
                Stmt::move_(Expr::Temp(machine_temp_ref(reg, ctx)), Expr::Temp(saved))
            })
            .collect();
        Stmt::seq_all(moves)
    }

    /// Total size, in bytes, of this frame's locals and spill slots.
    pub fn frame_size(&self) -> i64 {
        -self.next_local_offset - 8
    }

    /// Sink (spec §4.8 pass 1): append a synthetic zero-template `Oper`
    /// whose `uses` lists every register that must be kept live through the
    /// whole procedure body (return value, stack/frame pointer, and the
    /// temps holding the callee-saved registers), so the allocator never
    /// recycles them mid-body.
    pub fn sink(&self, ctx: &mut Context, isa: &dyn TargetIsa, instrs: &mut Vec<Instruction>) {
        let mut uses = smallvec![
            ctx.machine_temp(isa.return_value()),
            ctx.machine_temp(isa.stack_pointer()),
            ctx.machine_temp(isa.frame_pointer()),
        ];
        for &(_, saved) in &self.callee_save_temps {
            uses.push(saved);
        }
        instrs.push(Instruction::Oper {
            template: String::new(),
            dst: smallvec![],
            src: uses,
            jump_targets: None,
        });
    }

    /// Assembly procedure (spec §4.8 pass 2): wrap the register-allocated,
    /// cleaned-up instruction body with a textual prologue (label, frame
    /// adjustment) and epilogue (frame restore, return).
    pub fn assembly_procedure(
        &self,
        isa: &dyn TargetIsa,
        temp_map: &TempMap,
        body: &[Instruction],
        ctx: &Context,
    ) -> String {
        let name = ctx
            .label_name(self.name)
            .map(str::to_string)
            .unwrap_or_else(|| self.name.to_string());
        let mut out = String::new();
        out.push_str(&format!("{}:\n", name));
        let size = self.frame_size();
        if size > 0 {
            out.push_str(&format!("\tsub {}, {}, ${}\n", isa.stack_pointer(), isa.stack_pointer(), size));
        }
        for instr in body {
            out.push_str(&crate::emit::emit_instruction(instr, temp_map));
        }
        if size > 0 {
            out.push_str(&format!("\tadd {}, {}, ${}\n", isa.stack_pointer(), isa.stack_pointer(), size));
        }
        out.push_str("\tret\n");
        out
    }
}

/// Look up (without minting) the precolored temp for a machine register.
/// Only ever called for registers that `Frame::new` already registered via
/// `ctx.machine_temp`, so the entry always exists.
fn machine_temp_ref(reg: MachineReg, ctx: &Context) -> Temp {
    ctx.machine_temp_ref(reg)
        .expect("machine register temp must be pre-registered by Frame::new")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::TigerIsa;

    #[test]
    fn non_escaping_formals_get_register_access() {
        let mut ctx = Context::new();
        let isa = TigerIsa::default();
        let name = ctx.named_label("f");
        let (frame, _prologue) = Frame::new(&mut ctx, &isa, name, &[false, false]);
        assert!(matches!(frame.formals[0], Access::InReg(_)));
        assert!(matches!(frame.formals[1], Access::InReg(_)));
    }

    #[test]
    fn escaping_formal_gets_frame_access() {
        let mut ctx = Context::new();
        let isa = TigerIsa::default();
        let name = ctx.named_label("f");
        let (frame, _prologue) = Frame::new(&mut ctx, &isa, name, &[true]);
        assert!(matches!(frame.formals[0], Access::InFrame(_)));
    }

    #[test]
    fn locals_grow_frame_size() {
        let mut ctx = Context::new();
        let isa = TigerIsa::default();
        let name = ctx.named_label("f");
        let (mut frame, _prologue) = Frame::new(&mut ctx, &isa, name, &[]);
        assert_eq!(frame.frame_size(), 0);
        frame.alloc_local(&mut ctx, true);
        assert_eq!(frame.frame_size(), 8);
        frame.alloc_local(&mut ctx, true);
        assert_eq!(frame.frame_size(), 16);
    }

    #[test]
    fn spill_slots_are_tracked() {
        let mut ctx = Context::new();
        let isa = TigerIsa::default();
        let name = ctx.named_label("f");
        let (mut frame, _prologue) = Frame::new(&mut ctx, &isa, name, &[]);
        frame.alloc_spill_slot(&mut ctx);
        assert_eq!(frame.spills.len(), 1);
    }
}
