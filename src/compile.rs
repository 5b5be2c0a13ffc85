//! Top-level driver: string every back-end pass together, per fragment.
//!
//! Grounded on `original_source/compile.py`'s `main()`, whose phase order
//! this function reproduces exactly: canonize → (blocks/trace schedule,
//! folded into instruction selection's input here) → codegen → sink →
//! register-allocate → filter redundant moves (handled inside
//! [`crate::regalloc::allocate::allocate`]) → assemble. Mirrors the
//! teacher's `regalloc::context::Context::run` in running one stage per
//! line with a `log::debug!` breadcrumb after each.

use crate::blocks::into_blocks;
use crate::canon::{canonicalize, is_fully_canonical};
use crate::context::Context;
use crate::emit::{self, CompiledFragment, CompiledProc};
use crate::ir::frame::Fragment;
use crate::ir::stmt::Stmt;
use crate::isa::{select, TargetIsa};
use crate::regalloc::allocate;
use crate::result::{CodegenError, CodegenResult};
use crate::settings::Flags;
use crate::trace::{every_cjump_falls_through, schedule_traces};

/// Run every fragment through canonicalization, instruction selection,
/// register allocation, and emission, returning one assembled output file.
pub fn compile(ctx: &mut Context, isa: &dyn TargetIsa, flags: &Flags, fragments: Vec<Fragment>) -> CodegenResult<String> {
    let mut compiled = Vec::with_capacity(fragments.len());

    for fragment in fragments {
        match fragment {
            Fragment::Str { label, data } => {
                compiled.push(CompiledFragment::Str { label, data });
            }
            Fragment::Proc { body, mut frame } => {
                let proc_name = ctx.label_name(frame.name).map(str::to_string).unwrap_or_else(|| frame.name.to_string());

                // Symmetric with `Frame::new`'s view-shift prologue: restore
                // the callee-saved machine registers from the temps the
                // prologue stashed them in before register allocation ever
                // sees the body (spec §4.8).
                let epilogue = frame.epilogue_restores(ctx);
                let body = Stmt::seq(body, epilogue);

                let canonical = canonicalize(ctx, body);
                log::debug!("compile: {} canonicalized into {} statements", proc_name, canonical.len());
                if flags.verify_each_pass && !is_fully_canonical(&canonical) {
                    return Err(CodegenError::VerifierFailure {
                        proc_name,
                        detail: "an ESeq survived canonicalization".to_string(),
                    });
                }

                let blocks = into_blocks(ctx, canonical);
                let scheduled = schedule_traces(ctx, blocks);
                log::debug!("compile: {} scheduled into {} statements", proc_name, scheduled.len());
                if flags.verify_each_pass && !every_cjump_falls_through(&scheduled) {
                    return Err(CodegenError::VerifierFailure {
                        proc_name,
                        detail: "a CJump does not fall through to its false label".to_string(),
                    });
                }

                let mut instrs = select::select(ctx, isa, &mut frame, &scheduled);
                log::debug!("compile: {} selected into {} instructions", proc_name, instrs.len());

                frame.sink(ctx, isa, &mut instrs);

                let allocation = allocate::allocate(ctx, isa, &mut frame, &proc_name, flags, instrs)?;
                log::debug!(
                    "compile: {} allocated, {} instructions after redundant-move cleanup",
                    proc_name,
                    allocation.instructions.len()
                );

                compiled.push(CompiledFragment::Proc(CompiledProc {
                    frame,
                    temp_map: allocation.temp_map,
                    body: allocation.instructions,
                }));
            }
        }
    }

    Ok(emit::emit_program(ctx, isa, &compiled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expr::Expr;
    use crate::isa::TigerIsa;

    #[test]
    fn compiles_a_trivial_procedure_to_assembly_text() {
        let mut ctx = Context::new();
        let isa = TigerIsa::default();
        let flags = Flags::testing();
        let name = ctx.named_label("main");
        let (frame, prologue) = crate::ir::frame::Frame::new(&mut ctx, &isa, name, &[]);
        let t = ctx.new_temp();
        let body = Stmt::seq(prologue, Stmt::move_(Expr::Temp(t), Expr::Const(42)));
        let fragments = vec![Fragment::Proc { body, frame }];
        let asm = compile(&mut ctx, &isa, &flags, fragments).unwrap();
        assert!(asm.contains("main:"));
        assert!(asm.contains("\t.text\n"));
    }

    #[test]
    fn string_fragments_land_in_the_data_section() {
        let mut ctx = Context::new();
        let isa = TigerIsa::default();
        let flags = Flags::testing();
        let l = ctx.named_label("s0");
        let fragments = vec![Fragment::Str {
            label: l,
            data: b"hello".to_vec(),
        }];
        let asm = compile(&mut ctx, &isa, &flags, fragments).unwrap();
        assert!(asm.contains("s0:"));
        assert!(asm.contains(".asciz \"hello\""));
    }
}
