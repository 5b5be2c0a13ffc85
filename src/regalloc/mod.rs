//! Register allocation: liveness, interference, and the iterated-coalescing
//! allocator built on top of them (spec §4.5–§4.7).

pub mod allocate;
pub mod interference;
pub mod liveness;
