//! Maximal-munch instruction selector (spec §4.4).
//!
//! Grounded on the tiling shape of `original_source/compile.py`'s
//! `Codegen.codegen` call (one canonical statement list in, one abstract
//! assembly list out) and on the teacher's `isa::TargetIsa`/emission split:
//! selection only ever produces [`Instruction`]s carrying a template string
//! plus abstract `Temp` operands, never concrete register names.

use crate::context::Context;
use crate::entities::Temp;
use crate::assembly::Instruction;
use crate::ir::expr::{BinOp, Expr, RelOp};
use crate::ir::frame::Frame;
use crate::ir::stmt::Stmt;
use crate::isa::TargetIsa;
use smallvec::{smallvec, SmallVec};

fn relop_mnemonic(op: RelOp) -> &'static str {
    match op {
        RelOp::Eq => "beq",
        RelOp::Ne => "bne",
        RelOp::Lt => "blt",
        RelOp::Gt => "bgt",
        RelOp::Le => "ble",
        RelOp::Ge => "bge",
        RelOp::Ult => "bltu",
        RelOp::Ule => "bleu",
        RelOp::Ugt => "bgtu",
        RelOp::Uge => "bgeu",
    }
}

fn binop_mnemonic(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "div",
        BinOp::And => "and",
        BinOp::Or => "or",
        BinOp::Xor => "xor",
        BinOp::LShift => "sll",
        BinOp::RShift => "srl",
        BinOp::ARShift => "sra",
    }
}

/// Select a fragment's scheduled canonical statement list into abstract
/// assembly instructions, given its frame (used to address overflow
/// outgoing-call arguments).
pub fn select(ctx: &mut Context, isa: &dyn TargetIsa, frame: &mut Frame, stmts: &[Stmt]) -> Vec<Instruction> {
    let mut instrs = Vec::new();
    for s in stmts {
        munch_stmt(ctx, isa, frame, &mut instrs, s);
    }
    instrs
}

/// Munch a memory address into (base temp, displacement) or (base temp,
/// index temp), matching the base+offset / base+index tile shapes (spec
/// §4.4's minimum tile set).
enum Addr {
    BaseOffset(Temp, i64),
    BaseIndex(Temp, Temp),
}

fn munch_addr(ctx: &mut Context, isa: &dyn TargetIsa, instrs: &mut Vec<Instruction>, e: &Expr) -> Addr {
    match e {
        Expr::BinOp(BinOp::Add, l, r) => match (&**l, &**r) {
            (_, Expr::Const(n)) => Addr::BaseOffset(munch_expr(ctx, isa, instrs, l), *n),
            (Expr::Const(n), _) => Addr::BaseOffset(munch_expr(ctx, isa, instrs, r), *n),
            _ => Addr::BaseIndex(
                munch_expr(ctx, isa, instrs, l),
                munch_expr(ctx, isa, instrs, r),
            ),
        },
        _ => Addr::BaseOffset(munch_expr(ctx, isa, instrs, e), 0),
    }
}

/// Munch an expression, emitting whatever instructions are needed to
/// compute it, and return the temp holding its value.
fn munch_expr(ctx: &mut Context, isa: &dyn TargetIsa, instrs: &mut Vec<Instruction>, e: &Expr) -> Temp {
    match e {
        Expr::Temp(t) => *t,
        Expr::Const(n) => {
            let d = ctx.new_temp();
            instrs.push(Instruction::Oper {
                template: format!("li 'd0, {}", n),
                dst: smallvec![d],
                src: smallvec![],
                jump_targets: None,
            });
            d
        }
        Expr::Name(l) => {
            let d = ctx.new_temp();
            instrs.push(Instruction::Oper {
                template: format!("la 'd0, {}", l),
                dst: smallvec![d],
                src: smallvec![],
                jump_targets: None,
            });
            d
        }
        Expr::Mem(inner) => {
            let d = ctx.new_temp();
            match munch_addr(ctx, isa, instrs, inner) {
                Addr::BaseOffset(base, off) => instrs.push(Instruction::Oper {
                    template: format!("ld 'd0, {}('s0)", off),
                    dst: smallvec![d],
                    src: smallvec![base],
                    jump_targets: None,
                }),
                Addr::BaseIndex(base, index) => instrs.push(Instruction::Oper {
                    template: "ld 'd0, ('s0,'s1)".to_string(),
                    dst: smallvec![d],
                    src: smallvec![base, index],
                    jump_targets: None,
                }),
            }
            d
        }
        Expr::BinOp(op, l, r) => match &**r {
            Expr::Const(n) => {
                let lt = munch_expr(ctx, isa, instrs, l);
                let d = ctx.new_temp();
                instrs.push(Instruction::Oper {
                    template: format!("{} 'd0, 's0, {}", binop_mnemonic(*op), n),
                    dst: smallvec![d],
                    src: smallvec![lt],
                    jump_targets: None,
                });
                d
            }
            _ if op.commutes() => {
                if let Expr::Const(n) = &**l {
                    let rt = munch_expr(ctx, isa, instrs, r);
                    let d = ctx.new_temp();
                    instrs.push(Instruction::Oper {
                        template: format!("{} 'd0, 's0, {}", binop_mnemonic(*op), n),
                        dst: smallvec![d],
                        src: smallvec![rt],
                        jump_targets: None,
                    });
                    d
                } else {
                    reg_reg_binop(ctx, isa, instrs, *op, l, r)
                }
            }
            _ => reg_reg_binop(ctx, isa, instrs, *op, l, r),
        },
        Expr::Call(..) => unreachable!(
            "a Call may only appear as the top level of Move/Expr after canonicalization"
        ),
        Expr::ESeq(..) => unreachable!("ESeq cannot survive canonicalization"),
    }
}

fn reg_reg_binop(
    ctx: &mut Context,
    isa: &dyn TargetIsa,
    instrs: &mut Vec<Instruction>,
    op: BinOp,
    l: &Expr,
    r: &Expr,
) -> Temp {
    let lt = munch_expr(ctx, isa, instrs, l);
    let rt = munch_expr(ctx, isa, instrs, r);
    let d = ctx.new_temp();
    instrs.push(Instruction::Oper {
        template: format!("{} 'd0, 's0, 's1", binop_mnemonic(op)),
        dst: smallvec![d],
        src: smallvec![lt, rt],
        jump_targets: None,
    });
    d
}

fn munch_store(ctx: &mut Context, isa: &dyn TargetIsa, instrs: &mut Vec<Instruction>, addr: &Expr, src: &Expr) {
    let val = munch_expr(ctx, isa, instrs, src);
    match munch_addr(ctx, isa, instrs, addr) {
        Addr::BaseOffset(base, off) => instrs.push(Instruction::Oper {
            template: format!("st 's1, {}('s0)", off),
            dst: smallvec![],
            src: smallvec![base, val],
            jump_targets: None,
        }),
        Addr::BaseIndex(base, index) => instrs.push(Instruction::Oper {
            template: "st ('s0,'s1), 's2".to_string(),
            dst: smallvec![],
            src: smallvec![base, index, val],
            jump_targets: None,
        }),
    }
}

/// Munch a call (callee plus arguments), placing the first `arg_regs().len()`
/// arguments in their registers, spilling the rest to the frame's outgoing
/// argument area, and return the temp holding the return value.
fn munch_call(
    ctx: &mut Context,
    isa: &dyn TargetIsa,
    frame: &mut Frame,
    instrs: &mut Vec<Instruction>,
    f: &Expr,
    args: &[Expr],
) -> Temp {
    let arg_regs = isa.arg_regs().to_vec();
    let fp = ctx.machine_temp(isa.frame_pointer());
    let mut used = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        let t = munch_expr(ctx, isa, instrs, arg);
        if let Some(&reg) = arg_regs.get(i) {
            let reg_temp = ctx.machine_temp(reg);
            instrs.push(Instruction::Move {
                template: format!("mov 'd0, 's0  # arg {}", i),
                dst: reg_temp,
                src: t,
            });
            used.push(reg_temp);
        } else {
            let slot = frame.alloc_local(ctx, true);
            let addr = frame.exp(slot, Expr::Temp(fp));
            munch_store(ctx, isa, instrs, &strip_mem(&addr), &Expr::Temp(t));
        }
    }

    let mut dst: SmallVec<[Temp; 2]> = isa.caller_saved().iter().map(|&r| ctx.machine_temp(r)).collect();
    let rv = ctx.machine_temp(isa.return_value());
    if !dst.contains(&rv) {
        dst.push(rv);
    }

    match f {
        Expr::Name(label) => instrs.push(Instruction::Oper {
            template: format!("call {}", label),
            dst,
            src: SmallVec::from_vec(used),
            jump_targets: None,
        }),
        _ => {
            let ft = munch_expr(ctx, isa, instrs, f);
            let mut src = used;
            src.push(ft);
            instrs.push(Instruction::Oper {
                template: "call *'s0".to_string(),
                dst,
                src: SmallVec::from_vec(src),
                jump_targets: None,
            });
        }
    }
    rv
}

/// `Frame::exp` already wraps frame slots in `Mem(..)`; `munch_store` expects
/// the bare address expression, so unwrap one level for an `InFrame` access.
fn strip_mem(e: &Expr) -> Expr {
    match e {
        Expr::Mem(inner) => (**inner).clone(),
        other => other.clone(),
    }
}

fn munch_stmt(ctx: &mut Context, isa: &dyn TargetIsa, frame: &mut Frame, instrs: &mut Vec<Instruction>, s: &Stmt) {
    match s {
        Stmt::Label(l) => instrs.push(Instruction::Label {
            template: format!("{}:", l),
            label: *l,
        }),
        Stmt::Jump(Expr::Name(l), targets) => instrs.push(Instruction::Oper {
            template: format!("jmp {}", l),
            dst: smallvec![],
            src: smallvec![],
            jump_targets: Some(targets.clone()),
        }),
        Stmt::Jump(e, targets) => {
            let t = munch_expr(ctx, isa, instrs, e);
            instrs.push(Instruction::Oper {
                template: "jmp *'s0".to_string(),
                dst: smallvec![],
                src: smallvec![t],
                jump_targets: Some(targets.clone()),
            });
        }
        Stmt::CJump(op, l, r, t, f) => {
            let lt = munch_expr(ctx, isa, instrs, l);
            let rt = munch_expr(ctx, isa, instrs, r);
            instrs.push(Instruction::Oper {
                template: format!("{} 'j0", relop_mnemonic(*op)),
                dst: smallvec![],
                src: smallvec![lt, rt],
                jump_targets: Some(vec![*t, *f]),
            });
        }
        Stmt::Move(Expr::Mem(addr), src) => munch_store(ctx, isa, instrs, addr, src),
        Stmt::Move(Expr::Temp(dst), Expr::Call(f, args)) => {
            let rv = munch_call(ctx, isa, frame, instrs, f, args);
            if rv != *dst {
                instrs.push(Instruction::Move {
                    template: "mov 'd0, 's0".to_string(),
                    dst: *dst,
                    src: rv,
                });
            }
        }
        Stmt::Move(Expr::Temp(dst), src) => {
            let t = munch_expr(ctx, isa, instrs, src);
            if t != *dst {
                instrs.push(Instruction::Move {
                    template: "mov 'd0, 's0".to_string(),
                    dst: *dst,
                    src: t,
                });
            }
        }
        Stmt::Move(..) => unreachable!("Move destination must be Temp or Mem"),
        Stmt::Expr(Expr::Call(f, args)) => {
            munch_call(ctx, isa, frame, instrs, f, args);
        }
        Stmt::Expr(_) => {}
        Stmt::Seq(..) => unreachable!("Seq cannot survive linearization"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::TigerIsa;

    fn fresh_frame(ctx: &mut Context, isa: &TigerIsa) -> Frame {
        let name = ctx.named_label("f");
        Frame::new(ctx, isa, name, &[]).0
    }

    #[test]
    fn constant_load_and_immediate_binop() {
        let mut ctx = Context::new();
        let isa = TigerIsa::default();
        let mut frame = fresh_frame(&mut ctx, &isa);
        let t = ctx.new_temp();
        let stmts = vec![Stmt::move_(
            Expr::Temp(t),
            Expr::binop(BinOp::Add, Expr::Const(1), Expr::Const(2)),
        )];
        let instrs = select(&mut ctx, &isa, &mut frame, &stmts);
        assert!(!instrs.is_empty());
        assert!(instrs.iter().any(|i| matches!(i, Instruction::Oper { template, .. } if template.starts_with("li"))));
    }

    #[test]
    fn conditional_branch_carries_both_targets() {
        let mut ctx = Context::new();
        let isa = TigerIsa::default();
        let mut frame = fresh_frame(&mut ctx, &isa);
        let t = ctx.new_temp();
        let lt = ctx.new_label();
        let lf = ctx.new_label();
        let stmts = vec![Stmt::CJump(RelOp::Lt, Expr::Temp(t), Expr::Const(0), lt, lf)];
        let instrs = select(&mut ctx, &isa, &mut frame, &stmts);
        let branch = instrs
            .iter()
            .find(|i| i.jump_targets().is_some())
            .expect("a CJump must select to an Oper carrying jump_targets");
        assert_eq!(branch.jump_targets().unwrap(), &[lt, lf]);
    }

    #[test]
    fn direct_call_kills_caller_saved_registers() {
        let mut ctx = Context::new();
        let isa = TigerIsa::default();
        let mut frame = fresh_frame(&mut ctx, &isa);
        let callee = ctx.named_label("g");
        let stmts = vec![Stmt::Expr(Expr::Call(Box::new(Expr::Name(callee)), vec![Expr::Const(7)]))];
        let instrs = select(&mut ctx, &isa, &mut frame, &stmts);
        let call = instrs
            .iter()
            .find(|i| matches!(i, Instruction::Oper { template, .. } if template.starts_with("call")))
            .expect("expected a call instruction");
        assert_eq!(call.defs().len(), isa.caller_saved().len());
    }
}
