//! Entity references used throughout the back-end.
//!
//! Temporaries and labels are both opaque indices into per-compilation
//! tables owned by [`crate::context::Context`]. Using distinct newtypes (as
//! opposed to bare `u32`s) keeps a `Temp` from being accidentally used where
//! a `Label` is expected, while staying as cheap to copy as the integer it
//! wraps.

use cranelift_entity::entity_impl;
use std::fmt;

/// An abstract, infinite-supply register name.
///
/// Minted by [`crate::context::Context::new_temp`]. Eventually every `Temp`
/// that survives to emitted assembly is either a pre-colored machine
/// register or resolved through a [`crate::assembly::TempMap`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Temp(u32);
entity_impl!(Temp, "t");

/// A globally unique code-address name.
///
/// Minted by [`crate::context::Context::new_label`]. A label may additionally
/// carry a user-given name (the entry point of a named procedure, or a
/// string-literal's data label); see [`crate::context::Context::named_label`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(u32);
entity_impl!(Label, "L");

/// A node in the register-interference graph: one per temporary, plus one
/// permanent node per pre-colored machine register.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Node(u32);
entity_impl!(Node, "n");

impl fmt::Debug for Temp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    #[test]
    fn temps_are_stable_and_distinct() {
        let t0 = Temp::new(0);
        let t1 = Temp::new(1);
        assert_ne!(t0, t1);
        assert_eq!(t0.index(), 0);
        assert_eq!(t0.to_string(), "t0");
    }

    #[test]
    fn labels_display_with_prefix() {
        let l = Label::new(3);
        assert_eq!(l.to_string(), "L3");
    }
}
