//! Canonicalizer: `ESeq` elimination followed by linearization (spec §4.1).
//!
//! No teacher file does this directly — cranelift's IR is built SSA-first and
//! never has an `ESeq`-shaped node to eliminate. The shape of the rewrite
//! (bottom-up `(stmt, expr)` pair construction, a commutativity test guarding
//! when a side effect may be hoisted past an operand versus when the operand
//! must be captured into a fresh temp first) follows `original_source`'s
//! `canonical/canon.py`, re-expressed as ordinary recursive functions over
//! the `Stmt`/`Expr` trees rather than its dictionary-dispatch visitor.

use crate::context::Context;
use crate::ir::expr::Expr;
use crate::ir::stmt::Stmt;

/// Canonicalize a procedure body: eliminate every `ESeq`, then flatten the
/// resulting `Seq` tree into a flat statement list with no `Call` anywhere
/// except as `Move(Temp, Call(..))` or `Expr(Call(..))`.
pub fn canonicalize(ctx: &mut Context, stmt: Stmt) -> Vec<Stmt> {
    let rewritten = do_stmt(ctx, stmt);
    let mut out = Vec::new();
    linearize(rewritten, &mut out);
    out
}

fn nop() -> Stmt {
    Stmt::Expr(Expr::Const(0))
}

fn is_nop(s: &Stmt) -> bool {
    matches!(s, Stmt::Expr(Expr::Const(_)))
}

/// Can statement `s`'s effects be left exactly where they are relative to
/// expression `e`, or must whatever `e` depends on be captured into a
/// temporary first? `s` commutes with `e` when `s` is a no-op, when `e` is a
/// bare `Const`/`Name` (touches neither memory nor a temporary), or when `s`
/// writes no memory and defines no temporary that `e` reads.
fn commute(s: &Stmt, e: &Expr) -> bool {
    if is_nop(s) {
        return true;
    }
    if e.is_const_or_name() {
        return true;
    }
    if s.writes_memory() && e.reads_memory() {
        return false;
    }
    let defs = s.defined_temps();
    if defs.is_empty() {
        return true;
    }
    let mut uses = Vec::new();
    e.used_temps(&mut uses);
    !defs.iter().any(|t| uses.contains(t))
}

/// Reduce a single expression to a hoisted side-effect statement plus a pure
/// (`ESeq`-free) expression.
fn do_expr(ctx: &mut Context, e: Expr) -> (Stmt, Expr) {
    match e {
        Expr::Const(_) | Expr::Name(_) | Expr::Temp(_) => (nop(), e),
        Expr::BinOp(op, l, r) => {
            let (s, mut operands) = do_expr_seq(ctx, vec![*l, *r]);
            let r2 = operands.pop().unwrap();
            let l2 = operands.pop().unwrap();
            (s, Expr::binop(op, l2, r2))
        }
        Expr::Mem(inner) => {
            let (s, e2) = do_expr(ctx, *inner);
            (s, Expr::mem(e2))
        }
        Expr::Call(f, args) => {
            let mut list = Vec::with_capacity(args.len() + 1);
            list.push(*f);
            list.extend(args);
            let (s, mut exprs) = do_expr_seq(ctx, list);
            let callee = exprs.remove(0);
            let t = ctx.new_temp();
            let call = Expr::Call(Box::new(callee), exprs);
            (Stmt::seq(s, Stmt::move_(Expr::Temp(t), call)), Expr::Temp(t))
        }
        Expr::ESeq(s, e2) => {
            let s1 = do_stmt(ctx, *s);
            let (s2, e3) = do_expr(ctx, *e2);
            (Stmt::seq(s1, s2), e3)
        }
    }
}

/// Reduce a statement to canonical (possibly still `Seq`-nested) form. No
/// `ESeq` survives anywhere below the returned statement.
fn do_stmt(ctx: &mut Context, s: Stmt) -> Stmt {
    match s {
        Stmt::Move(Expr::Mem(addr), src) => {
            let (s1, addr2) = do_expr(ctx, *addr);
            let (s2, src2) = do_expr(ctx, src);
            if commute(&s1, &src2) {
                Stmt::seq(Stmt::seq(s1, s2), Stmt::move_(Expr::mem(addr2), src2))
            } else {
                let t = ctx.new_temp();
                Stmt::seq(
                    Stmt::seq(Stmt::seq(s1, Stmt::move_(Expr::Temp(t), addr2)), s2),
                    Stmt::move_(Expr::mem(Expr::Temp(t)), src2),
                )
            }
        }
        Stmt::Move(dst, Expr::Call(f, args)) => {
            // A call's result lands directly in `dst`; don't introduce the
            // extra temp `do_expr` would otherwise mint for a bare `Call`.
            let (sdst, dst2) = do_expr(ctx, dst);
            let mut list = Vec::with_capacity(args.len() + 1);
            list.push(*f);
            list.extend(args);
            let (scall, mut exprs) = do_expr_seq(ctx, list);
            let callee = exprs.remove(0);
            Stmt::seq(
                Stmt::seq(sdst, scall),
                Stmt::move_(dst2, Expr::Call(Box::new(callee), exprs)),
            )
        }
        Stmt::Move(dst, src) => {
            let (s1, dst2) = do_expr(ctx, dst);
            let (s2, src2) = do_expr(ctx, src);
            Stmt::seq(Stmt::seq(s1, s2), Stmt::move_(dst2, src2))
        }
        Stmt::Expr(Expr::Call(f, args)) => {
            let mut list = Vec::with_capacity(args.len() + 1);
            list.push(*f);
            list.extend(args);
            let (s, mut exprs) = do_expr_seq(ctx, list);
            let callee = exprs.remove(0);
            Stmt::seq(s, Stmt::Expr(Expr::Call(Box::new(callee), exprs)))
        }
        Stmt::Expr(e) => {
            let (s, e2) = do_expr(ctx, e);
            Stmt::seq(s, Stmt::Expr(e2))
        }
        Stmt::Jump(e, labels) => {
            let (s, e2) = do_expr(ctx, e);
            Stmt::seq(s, Stmt::Jump(e2, labels))
        }
        Stmt::CJump(op, l, r, t, f) => {
            let (s, mut operands) = do_expr_seq(ctx, vec![l, r]);
            let r2 = operands.pop().unwrap();
            let l2 = operands.pop().unwrap();
            Stmt::seq(s, Stmt::CJump(op, l2, r2, t, f))
        }
        Stmt::Seq(a, b) => Stmt::seq(do_stmt(ctx, *a), do_stmt(ctx, *b)),
        Stmt::Label(_) => s,
    }
}

/// Reduce a left-to-right list of expression operands (binary-operator
/// operands, call arguments, comparison operands) to one combined hoisted
/// statement plus a list of pure expressions, applying the spec's pairwise
/// commuting rule at each step: when an operand's own hoisted statement `s`
/// doesn't commute with an earlier, not-yet-materialized operand's value,
/// that earlier value must be captured into a fresh temp *before* `s` runs,
/// so `s`'s effect (a store, a temp def) can never retroactively change a
/// value an earlier operand already read.
fn do_expr_seq(ctx: &mut Context, exprs: Vec<Expr>) -> (Stmt, Vec<Expr>) {
    let mut acc = nop();
    let mut out: Vec<Expr> = Vec::with_capacity(exprs.len());
    for e in exprs {
        let (s, e2) = do_expr(ctx, e);
        for prev in out.iter_mut() {
            if !matches!(prev, Expr::Temp(_)) && !commute(&s, prev) {
                let t = ctx.new_temp();
                acc = Stmt::seq(acc, Stmt::move_(Expr::Temp(t), prev.clone()));
                *prev = Expr::Temp(t);
            }
        }
        acc = Stmt::seq(acc, s);
        out.push(e2);
    }
    (acc, out)
}

/// Flatten a `Seq` tree into `out`, in order, dropping the no-op placeholders
/// `do_stmt`/`do_expr_seq` use to thread "nothing hoisted here".
fn linearize(s: Stmt, out: &mut Vec<Stmt>) {
    match s {
        Stmt::Seq(a, b) => {
            linearize(*a, out);
            linearize(*b, out);
        }
        Stmt::Expr(Expr::Const(_)) => {}
        other => out.push(other),
    }
}

fn has_eseq_expr(e: &Expr) -> bool {
    match e {
        Expr::Const(_) | Expr::Name(_) | Expr::Temp(_) => false,
        Expr::ESeq(..) => true,
        Expr::BinOp(_, l, r) => has_eseq_expr(l) || has_eseq_expr(r),
        Expr::Mem(e) => has_eseq_expr(e),
        Expr::Call(f, args) => has_eseq_expr(f) || args.iter().any(has_eseq_expr),
    }
}

fn has_eseq_stmt(s: &Stmt) -> bool {
    match s {
        Stmt::Move(d, s2) => has_eseq_expr(d) || has_eseq_expr(s2),
        Stmt::Expr(e) => has_eseq_expr(e),
        Stmt::Jump(e, _) => has_eseq_expr(e),
        Stmt::CJump(_, l, r, ..) => has_eseq_expr(l) || has_eseq_expr(r),
        Stmt::Seq(a, b) => has_eseq_stmt(a) || has_eseq_stmt(b),
        Stmt::Label(_) => false,
    }
}

/// Is every `ESeq` gone from `stmts`? Checked by [`crate::compile::compile`]
/// after canonicalization when `Flags::verify_each_pass` is set (spec §7).
pub fn is_fully_canonical(stmts: &[Stmt]) -> bool {
    stmts.iter().all(|s| !has_eseq_stmt(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expr::BinOp;

    #[test]
    fn linear_straight_line() {
        let mut ctx = Context::new();
        let t1 = ctx.new_temp();
        let stmt = Stmt::move_(Expr::Temp(t1), Expr::binop(BinOp::Add, Expr::Const(1), Expr::Const(2)));
        let flat = canonicalize(&mut ctx, stmt);
        assert_eq!(flat.len(), 1);
        assert!(matches!(&flat[0], Stmt::Move(Expr::Temp(t), _) if *t == t1));
        assert!(!has_eseq_stmt(&flat[0]));
    }

    #[test]
    fn no_eseq_survives_and_calls_are_top_level() {
        let mut ctx = Context::new();
        let callee = ctx.named_label("f");
        let t1 = ctx.new_temp();
        // t1 := 1 + (t1 := g(); t1)   -- an ESeq wrapping a call, nested in a binop.
        let inner_call = Expr::eseq(
            Stmt::move_(Expr::Temp(t1), Expr::Call(Box::new(Expr::Name(callee)), vec![])),
            Expr::Temp(t1),
        );
        let stmt = Stmt::move_(Expr::Temp(t1), Expr::binop(BinOp::Add, Expr::Const(1), inner_call));
        let flat = canonicalize(&mut ctx, stmt);
        assert!(flat.len() > 1, "the call's side effect must be hoisted into its own statement");
        for s in &flat {
            assert!(!has_eseq_stmt(s));
        }
        let call_count = flat
            .iter()
            .filter(|s| matches!(s, Stmt::Move(_, Expr::Call(..)) | Stmt::Expr(Expr::Call(..))))
            .count();
        assert!(call_count >= 1);
    }

    #[test]
    fn noncommuting_store_forces_fresh_temp_for_left_operand() {
        let mut ctx = Context::new();
        let e0 = Expr::Const(100);
        let left = Expr::eseq(
            Stmt::move_(Expr::mem(e0.clone()), Expr::Const(1)),
            Expr::mem(e0.clone()),
        );
        let right = Expr::mem(e0);
        let combined = Expr::binop(BinOp::Add, left, right);
        let (stmt, pure) = do_expr(&mut ctx, combined);
        // The left Mem(e0) must have been captured into a temp before the
        // right Mem(e0) is folded into the final BinOp.
        match pure {
            Expr::BinOp(BinOp::Add, l, r) => {
                assert!(matches!(*l, Expr::Temp(_)));
                assert!(matches!(*r, Expr::Mem(_)));
            }
            _ => panic!("expected a BinOp"),
        }
        assert!(!has_eseq_stmt(&stmt));
    }

    #[test]
    fn later_operands_store_does_not_reorder_before_an_earlier_operands_read() {
        // Add(Mem(100), ESeq(Move(Mem(100), 1), 7)): the left operand's read
        // of Mem(100) must be captured into a temp before the right
        // operand's store to Mem(100) runs, so the left value observed is
        // whatever was in memory beforehand, not post-store.
        let mut ctx = Context::new();
        let addr = Expr::Const(100);
        let left = Expr::mem(addr.clone());
        let right = Expr::eseq(Stmt::move_(Expr::mem(addr), Expr::Const(1)), Expr::Const(7));
        let combined = Expr::binop(BinOp::Add, left, right);
        let (stmt, pure) = do_expr(&mut ctx, combined);

        let captured_temp = match &pure {
            Expr::BinOp(BinOp::Add, l, r) => {
                assert!(matches!(**r, Expr::Const(7)));
                match **l {
                    Expr::Temp(t) => t,
                    _ => panic!("left operand must have been captured into a temp"),
                }
            }
            _ => panic!("expected a BinOp"),
        };

        let mut flat = Vec::new();
        linearize(stmt, &mut flat);
        let read_pos = flat
            .iter()
            .position(|s| matches!(s, Stmt::Move(Expr::Temp(t), Expr::Mem(_)) if *t == captured_temp))
            .expect("the read into the captured temp must appear");
        let store_pos = flat
            .iter()
            .position(|s| matches!(s, Stmt::Move(Expr::Mem(_), Expr::Const(1))))
            .expect("the store must appear");
        assert!(read_pos < store_pos, "the read of the old value must precede the store");
    }

    #[test]
    fn canonicalize_is_idempotent_in_shape() {
        let mut ctx = Context::new();
        let t1 = ctx.new_temp();
        let l = ctx.new_label();
        let stmt = Stmt::seq(
            Stmt::move_(Expr::Temp(t1), Expr::Const(3)),
            Stmt::seq(Stmt::Label(l), Stmt::Jump(Expr::Name(l), vec![l])),
        );
        let once = canonicalize(&mut ctx, stmt);
        let reflattened = {
            let mut out = Vec::new();
            for s in once.clone() {
                linearize(s, &mut out);
            }
            out
        };
        assert_eq!(once.len(), reflattened.len());
    }
}
