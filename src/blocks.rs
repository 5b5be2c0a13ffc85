//! Basic-block builder (spec §4.2).
//!
//! Grounded on `original_source/canonical/basic_block.py`'s `basic_block`
//! function, re-expressed over this crate's `Stmt` enum and `Context`
//! label minting instead of a process-wide `TempManager`.

use crate::context::Context;
use crate::entities::Label;
use crate::ir::stmt::Stmt;

/// One straight-line, single-entry, single-exit chunk: starts with a
/// `Label`, ends with a `Jump` or `CJump`, and has no interior label or jump.
pub type Block = Vec<Stmt>;

/// The result of splitting a canonical statement list into basic blocks.
pub struct Blocks {
    /// A fresh label marking the procedure's logical exit; the last block's
    /// synthesized trailing jump (if any) targets it.
    pub done_label: Label,
    pub blocks: Vec<Block>,
}

/// Split a canonical flat statement list into basic blocks, inserting a
/// leading `Label` on any block that's missing one and a trailing
/// `Jump` on any block (other than the last) that's missing one.
pub fn into_blocks(ctx: &mut Context, stmts: Vec<Stmt>) -> Blocks {
    let done_label = ctx.new_label();
    let mut blocks: Vec<Block> = Vec::new();

    let mut start = 0;
    for (i, s) in stmts.iter().enumerate() {
        match s {
            Stmt::Label(_) => {
                if start < i {
                    blocks.push(stmts[start..i].to_vec());
                    start = i;
                }
            }
            Stmt::Jump(..) | Stmt::CJump(..) => {
                blocks.push(stmts[start..=i].to_vec());
                start = i + 1;
            }
            _ => {}
        }
    }
    let mut last = stmts[start..].to_vec();
    last.push(Stmt::Jump(crate::ir::expr::Expr::Name(done_label), vec![done_label]));
    blocks.push(last);

    for block in blocks.iter_mut() {
        if !matches!(block[0], Stmt::Label(_)) {
            block.insert(0, Stmt::Label(ctx.new_label()));
        }
    }

    let n = blocks.len();
    for i in 0..n.saturating_sub(1) {
        let ends_in_jump = matches!(blocks[i].last(), Some(Stmt::Jump(..)) | Some(Stmt::CJump(..)));
        if !ends_in_jump {
            let next_label = match blocks[i + 1][0] {
                Stmt::Label(l) => l,
                _ => unreachable!("every block was just given a leading Label"),
            };
            blocks[i].push(Stmt::Jump(crate::ir::expr::Expr::Name(next_label), vec![next_label]));
        }
    }

    Blocks { done_label, blocks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expr::{Expr, RelOp};

    #[test]
    fn straight_line_becomes_one_block_with_synthesized_jump() {
        let mut ctx = Context::new();
        let t = ctx.new_temp();
        let stmts = vec![Stmt::move_(Expr::Temp(t), Expr::Const(1))];
        let b = into_blocks(&mut ctx, stmts);
        assert_eq!(b.blocks.len(), 1);
        assert!(matches!(b.blocks[0][0], Stmt::Label(_)));
        assert!(matches!(b.blocks[0].last(), Some(Stmt::Jump(_, labels)) if labels == &[b.done_label]));
    }

    #[test]
    fn explicit_labels_split_blocks() {
        let mut ctx = Context::new();
        let l1 = ctx.new_label();
        let t = ctx.new_temp();
        let stmts = vec![
            Stmt::CJump(RelOp::Eq, Expr::Temp(t), Expr::Const(0), l1, l1),
            Stmt::Label(l1),
            Stmt::move_(Expr::Temp(t), Expr::Const(2)),
        ];
        let b = into_blocks(&mut ctx, stmts);
        assert_eq!(b.blocks.len(), 2);
        assert!(matches!(b.blocks[0].last(), Some(Stmt::CJump(..))));
        assert!(matches!(b.blocks[1][0], Stmt::Label(l) if l == l1));
    }

    #[test]
    fn every_block_starts_with_label_and_ends_with_jump() {
        let mut ctx = Context::new();
        let t = ctx.new_temp();
        let stmts = vec![
            Stmt::move_(Expr::Temp(t), Expr::Const(1)),
            Stmt::move_(Expr::Temp(t), Expr::Const(2)),
        ];
        let b = into_blocks(&mut ctx, stmts);
        for block in &b.blocks {
            assert!(matches!(block[0], Stmt::Label(_)));
            assert!(matches!(block.last(), Some(Stmt::Jump(..)) | Some(Stmt::CJump(..))));
            for interior in &block[1..block.len() - 1] {
                assert!(!matches!(interior, Stmt::Label(_) | Stmt::Jump(..) | Stmt::CJump(..)));
            }
        }
    }
}
