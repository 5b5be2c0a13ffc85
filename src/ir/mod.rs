//! Tree-IR: pre-canonical expressions and statements, plus the per-procedure
//! frame model they compile against.

pub mod expr;
pub mod frame;
pub mod stmt;
