//! Trace scheduler (spec §4.3).
//!
//! No teacher or pack file builds traces over basic blocks this way — the
//! teacher crate works directly on a CFG of extended basic blocks it never
//! needs to linearize for a textual target. The "pick an unscheduled block,
//! follow its `Jump` target while unscheduled, repeat" loop and the
//! false-label-must-follow fixup are this crate's own, built to the shape
//! spec §4.3 and its concrete scenario #2 describe.

use crate::blocks::{Block, Blocks};
use crate::context::Context;
use crate::entities::Label;
use crate::ir::expr::Expr;
use crate::ir::stmt::Stmt;
use std::collections::HashMap;

fn label_of(block: &Block) -> Label {
    match block[0] {
        Stmt::Label(l) => l,
        _ => unreachable!("blocks::into_blocks guarantees every block starts with a Label"),
    }
}

fn jump_target_for_trace(block: &Block) -> Option<Label> {
    match block.last() {
        Some(Stmt::Jump(_, targets)) if targets.len() == 1 => Some(targets[0]),
        _ => None,
    }
}

/// Order `blocks` into traces (each trace follows its blocks' unconditional
/// `Jump` targets while they're still unscheduled), fix up every `CJump` so
/// its false-label immediately follows in the final order, and flatten the
/// result into one statement list ending with `Label(done_label)`.
pub fn schedule_traces(ctx: &mut Context, Blocks { done_label, blocks }: Blocks) -> Vec<Stmt> {
    let by_label: HashMap<Label, usize> = blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (label_of(b), i))
        .collect();
    let n = blocks.len();
    let mut scheduled = vec![false; n];
    let mut order: Vec<usize> = Vec::with_capacity(n);

    for start in 0..n {
        if scheduled[start] {
            continue;
        }
        let mut cur = start;
        loop {
            scheduled[cur] = true;
            order.push(cur);
            match jump_target_for_trace(&blocks[cur]).and_then(|l| by_label.get(&l)) {
                Some(&next) if !scheduled[next] => cur = next,
                _ => break,
            }
        }
    }

    let mut ordered: Vec<Block> = order.into_iter().map(|i| blocks[i].clone()).collect();
    fixup_false_labels(ctx, &mut ordered);
    drop_fallthrough_jumps(&mut ordered);

    let mut out = Vec::new();
    for block in ordered {
        out.extend(block);
    }
    out.push(Stmt::Label(done_label));
    out
}

/// Ensure every `CJump`'s false-label is the label of the block immediately
/// following it, negating the condition when only the true-label already is,
/// and inserting a synthetic `Label(L'); Jump(F)` block otherwise (spec §4.3
/// concrete scenario #2).
fn fixup_false_labels(ctx: &mut Context, ordered: &mut Vec<Block>) {
    let mut i = 0;
    while i < ordered.len() {
        let next_label = ordered.get(i + 1).map(|b| label_of(b));
        if let Some(Stmt::CJump(op, a, b, t, f)) = ordered[i].last().cloned() {
            if Some(f) == next_label {
                // Already correctly laid out.
            } else if Some(t) == next_label {
                let last = ordered[i].last_mut().unwrap();
                *last = Stmt::CJump(op.negate(), a, b, f, t);
            } else {
                let fresh = ctx.new_label();
                let last = ordered[i].last_mut().unwrap();
                *last = Stmt::CJump(op, a, b, t, fresh);
                let synthetic = vec![Stmt::Label(fresh), Stmt::Jump(Expr::Name(f), vec![f])];
                ordered.insert(i + 1, synthetic);
            }
        }
        i += 1;
    }
}

/// Drop an unconditional `Jump` whose sole target is the very next block in
/// the schedule — it would emit as a no-op fall-through anyway.
fn drop_fallthrough_jumps(ordered: &mut Vec<Block>) {
    let n = ordered.len();
    for i in 0..n.saturating_sub(1) {
        let next_label = label_of(&ordered[i + 1]);
        if let Some(Stmt::Jump(_, targets)) = ordered[i].last() {
            if targets.len() == 1 && targets[0] == next_label {
                ordered[i].pop();
            }
        }
    }
}

/// Does every `CJump` in `stmts` fall through to its own false-label, i.e. is
/// immediately followed by `Label(f)`? Checked by [`crate::compile::compile`]
/// after trace scheduling when `Flags::verify_each_pass` is set (spec §7).
pub fn every_cjump_falls_through(stmts: &[Stmt]) -> bool {
    stmts.windows(2).all(|w| match &w[0] {
        Stmt::CJump(_, _, _, _, f) => matches!(&w[1], Stmt::Label(l) if l == f),
        _ => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::into_blocks;
    use crate::ir::expr::RelOp;

    #[test]
    fn false_label_not_next_gets_synthetic_block_inserted() {
        let mut ctx = Context::new();
        let t = ctx.new_temp();
        let l_then = ctx.new_label();
        let l_other = ctx.new_label();
        let l_else = ctx.new_label();
        let stmts = vec![
            Stmt::CJump(RelOp::Lt, Expr::Temp(t), Expr::Const(0), l_then, l_else),
            Stmt::Label(l_other),
            Stmt::move_(Expr::Temp(t), Expr::Const(1)),
            Stmt::Jump(Expr::Name(l_then), vec![l_then]),
            Stmt::Label(l_then),
            Stmt::move_(Expr::Temp(t), Expr::Const(2)),
            Stmt::Jump(Expr::Name(l_else), vec![l_else]),
            Stmt::Label(l_else),
            Stmt::move_(Expr::Temp(t), Expr::Const(3)),
        ];
        let blocks = into_blocks(&mut ctx, stmts);
        let scheduled = schedule_traces(&mut ctx, blocks);

        let mut saw_cjump_followed_by_its_false_label = false;
        for w in scheduled.windows(2) {
            if let Stmt::CJump(_, _, _, _, f) = w[0] {
                if let Stmt::Label(l) = w[1] {
                    if l == f {
                        saw_cjump_followed_by_its_false_label = true;
                    }
                }
            }
        }
        assert!(saw_cjump_followed_by_its_false_label);
    }

    #[test]
    fn straight_line_schedule_ends_with_done_label() {
        let mut ctx = Context::new();
        let t = ctx.new_temp();
        let blocks = into_blocks(&mut ctx, vec![Stmt::move_(Expr::Temp(t), Expr::Const(1))]);
        let done = blocks.done_label;
        let scheduled = schedule_traces(&mut ctx, blocks);
        assert!(matches!(scheduled.last(), Some(Stmt::Label(l)) if *l == done));
    }
}
