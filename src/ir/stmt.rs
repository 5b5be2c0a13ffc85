//! Pre-canonical tree-IR statements.

use crate::entities::{Label, Temp};
use crate::ir::expr::Expr;

/// A tree-IR statement, before canonicalization. See spec §3.2.
#[derive(Clone, Debug)]
pub enum Stmt {
    /// `Move(dst, src)`. `dst` must be `Expr::Temp` or `Expr::Mem` — enforced
    /// by a debug assertion in [`Stmt::move_`] rather than by a distinct
    /// type, keeping one flat `Stmt` enum (see DESIGN.md Open Questions).
    Move(Expr, Expr),
    /// An expression evaluated for its side effect; its value is discarded.
    /// After canonicalization, the only expressions that may appear here are
    /// `Call`s (`Expr(Call(..))`).
    Expr(Expr),
    /// An unconditional jump to the address `e`, which may land on any of
    /// the labels listed (a single-element list for a direct jump; see
    /// DESIGN.md's Open Question on computed jumps).
    Jump(Expr, Vec<Label>),
    /// `CJump(op, l, r, t, f)`: evaluate `l op r`; jump to `t` if true, to
    /// `f` if false.
    CJump(super::expr::RelOp, Expr, Expr, Label, Label),
    /// The sequential composition of two statements. Eliminated by
    /// [`crate::canon::linearize`].
    Seq(Box<Stmt>, Box<Stmt>),
    /// A code-address label.
    Label(Label),
}

impl Stmt {
    /// Helper for `Move(dst, src)` with a debug-time shape check.
    pub fn move_(dst: Expr, src: Expr) -> Stmt {
        debug_assert!(
            matches!(dst, Expr::Temp(_) | Expr::Mem(_)),
            "Move destination must be a Temp or Mem, got {:?}",
            dst
        );
        Stmt::Move(dst, src)
    }

    /// Helper for `Seq(Box::new(a), Box::new(b))`.
    pub fn seq(a: Stmt, b: Stmt) -> Stmt {
        Stmt::Seq(Box::new(a), Box::new(b))
    }

    /// Fold a list of statements into a right-nested `Seq` chain, or
    /// `Expr(Const(0))` (a no-op) if the list is empty.
    pub fn seq_all(mut stmts: Vec<Stmt>) -> Stmt {
        match stmts.len() {
            0 => Stmt::Expr(Expr::Const(0)),
            1 => stmts.pop().unwrap(),
            _ => {
                let last = stmts.pop().unwrap();
                stmts
                    .into_iter()
                    .rev()
                    .fold(last, |acc, s| Stmt::seq(s, acc))
            }
        }
    }

    /// Does this statement ever write to memory? Used by the
    /// canonicalizer's commutativity test.
    pub fn writes_memory(&self) -> bool {
        match self {
            Stmt::Move(dst, _) => matches!(dst, Expr::Mem(_)),
            Stmt::Expr(Expr::Call(..)) => true,
            Stmt::Expr(_) => false,
            Stmt::Jump(..) | Stmt::CJump(..) | Stmt::Label(_) => false,
            Stmt::Seq(a, b) => a.writes_memory() || b.writes_memory(),
        }
    }

    /// The set of temporaries defined (written) by this statement, used by
    /// the canonicalizer's "no shared temps" commutativity test.
    pub fn defined_temps(&self) -> Vec<Temp> {
        match self {
            Stmt::Move(Expr::Temp(t), _) => vec![*t],
            Stmt::Seq(a, b) => {
                let mut v = a.defined_temps();
                v.extend(b.defined_temps());
                v
            }
            _ => Vec::new(),
        }
    }
}
