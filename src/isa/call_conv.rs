//! Calling convention identifier.
//!
//! The teacher crate dispatches on a `target_lexicon::Triple` to pick a
//! `CallConv` out of half a dozen ABI variants (System V, Windows fastcall,
//! ...). This crate targets exactly one ISA and one ABI, so `CallConv` is a
//! unit-like marker rather than a dispatch target — kept as its own type
//! (instead of being inlined into `TargetIsa`) so call sites read the same
//! way the teacher's do.

use std::fmt;

/// The (single) calling convention this back-end targets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CallConv;

impl fmt::Display for CallConv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("tiger_cdecl")
    }
}
