//! A Tiger-language code generation back-end: canonicalization, maximal-munch
//! instruction selection, and iterated-coalescing graph-coloring register
//! allocation with spilling.
//!
//! The pipeline, front to back:
//!
//! 1. [`canon`] rewrites a tree-IR [`ir::stmt::Stmt`] into canonical form
//!    (no `ESeq`, no nested `Call`, flattened `Seq`).
//! 2. [`blocks`] partitions canonical statements into basic blocks and
//!    [`trace`] schedules them into traces that make every conditional jump
//!    fall through to its false branch.
//! 3. [`isa::select`] munches the scheduled statements into [`assembly`]
//!    instructions for one [`isa::TargetIsa`].
//! 4. [`regalloc::liveness`] and [`regalloc::interference`] analyze the
//!    instruction list, and [`regalloc::allocate`] colors it, spilling and
//!    restarting as needed.
//! 5. [`emit`] substitutes the allocator's colors into instruction templates
//!    and assembles the data/code sections of an output file.
//!
//! [`compile::compile`] strings every stage together for a whole
//! compilation unit; [`context::Context`] carries the per-compilation state
//! (temp/label counters, name table) that would otherwise be global.

#![deny(missing_docs, trivial_numeric_casts, unused_extern_crates)]
#![warn(unused_import_braces)]
#![cfg_attr(feature = "cargo-clippy", allow(
// Relatively minor style issues inherited from the teacher's own lint list.
                clippy::many_single_char_names,
                clippy::identity_op,
                clippy::needless_borrow,
                clippy::cast_lossless,
                clippy::unreadable_literal,
                clippy::assign_op_pattern,
                clippy::too_many_arguments))]
#![cfg_attr(
    feature = "cargo-clippy",
    warn(
        clippy::float_arithmetic,
        clippy::mut_mut,
        clippy::nonminimal_bool,
        clippy::option_map_unwrap_or,
        clippy::option_map_unwrap_or_else,
        clippy::print_stdout,
        clippy::use_self
    )
)]

pub use crate::context::Context;
pub use crate::compile::compile;
pub use crate::result::{CodegenError, CodegenResult};

pub use cranelift_entity as entity;

pub mod assembly;
pub mod blocks;
pub mod canon;
pub mod compile;
pub mod context;
pub mod emit;
pub mod entities;
pub mod ir;
pub mod isa;
pub mod regalloc;
pub mod result;
pub mod settings;
pub mod trace;

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
