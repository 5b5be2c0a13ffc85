//! Per-compilation context: temp/label minting and the fragment list.
//!
//! The source compiler mints temporaries and labels from a process-wide
//! singleton (`TempManager`). That doesn't translate cleanly to a language
//! without a blessed "the one compilation running right now" slot, and it
//! would make this crate's pipeline stages implicitly depend on global
//! mutable state. Instead, a single `Context` is created once per
//! compilation and threaded explicitly through every stage; the observable
//! contract (uniqueness of minted ids, stability of named labels) is
//! unchanged.

use crate::entities::{Label, Temp};
use crate::ir::frame::Fragment;
use crate::isa::registers::MachineReg;
use std::collections::HashMap;

/// Owns the monotone counters that mint fresh [`Temp`]s and [`Label`]s for a
/// single compilation, plus the ordered list of fragments handed off by the
/// front-end.
pub struct Context {
    next_temp: u32,
    next_label: u32,
    label_names: HashMap<Label, String>,
    fragments: Vec<Fragment>,
    machine_temps: HashMap<MachineReg, Temp>,
}

impl Context {
    /// Create a new, empty context. Call once per compilation.
    pub fn new() -> Self {
        Self {
            next_temp: 0,
            next_label: 0,
            label_names: HashMap::new(),
            fragments: Vec::new(),
            machine_temps: HashMap::new(),
        }
    }

    /// The precolored temp standing in for machine register `reg`, minting
    /// one the first time `reg` is requested (spec §3.1: "the temp map is
    /// initially seeded with the ISA's named registers").
    pub fn machine_temp(&mut self, reg: MachineReg) -> Temp {
        if let Some(&t) = self.machine_temps.get(&reg) {
            return t;
        }
        let t = self.new_temp();
        self.machine_temps.insert(reg, t);
        t
    }

    /// Look up the precolored temp for `reg` without minting one.
    pub fn machine_temp_ref(&self, reg: MachineReg) -> Option<Temp> {
        self.machine_temps.get(&reg).copied()
    }

    /// The machine register `t` is precolored to, if any.
    pub fn register_for_temp(&self, t: Temp) -> Option<MachineReg> {
        self.machine_temps
            .iter()
            .find(|&(_, &v)| v == t)
            .map(|(&r, _)| r)
    }

    /// All registered precolored (register, temp) pairs.
    pub fn machine_temps(&self) -> impl Iterator<Item = (MachineReg, Temp)> + '_ {
        self.machine_temps.iter().map(|(&r, &t)| (r, t))
    }

    /// Mint a fresh temporary, globally unique within this context.
    pub fn new_temp(&mut self) -> Temp {
        let t = Temp::new(self.next_temp as usize);
        self.next_temp += 1;
        t
    }

    /// Mint a fresh, anonymous label.
    pub fn new_label(&mut self) -> Label {
        let l = Label::new(self.next_label as usize);
        self.next_label += 1;
        l
    }

    /// Mint a fresh label and remember a user-given name for it (e.g. a
    /// procedure entry point or a string literal's data label).
    pub fn named_label(&mut self, name: &str) -> Label {
        let l = self.new_label();
        self.label_names.insert(l, name.to_string());
        l
    }

    /// The user-given name for `label`, if any.
    pub fn label_name(&self, label: Label) -> Option<&str> {
        self.label_names.get(&label).map(String::as_str)
    }

    /// Append a fragment produced by the front-end. Fragments are drained in
    /// the order they were appended; there is no interleaving between the
    /// front-end finishing and the back-end draining this list.
    pub fn push_fragment(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    /// Take every fragment appended so far, in order, leaving the context's
    /// fragment list empty.
    pub fn take_fragments(&mut self) -> Vec<Fragment> {
        std::mem::take(&mut self.fragments)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temps_and_labels_are_monotone_and_unique() {
        let mut ctx = Context::new();
        let t0 = ctx.new_temp();
        let t1 = ctx.new_temp();
        let l0 = ctx.new_label();
        assert_ne!(t0, t1);
        assert_ne!(ctx.new_label(), l0);
    }

    #[test]
    fn named_labels_remember_their_name() {
        let mut ctx = Context::new();
        let l = ctx.named_label("main");
        assert_eq!(ctx.label_name(l), Some("main"));
        let anon = ctx.new_label();
        assert_eq!(ctx.label_name(anon), None);
    }

    #[test]
    fn machine_temps_are_stable_across_lookups() {
        use crate::isa::registers::{FP, SP};
        let mut ctx = Context::new();
        let fp1 = ctx.machine_temp(FP);
        let fp2 = ctx.machine_temp(FP);
        assert_eq!(fp1, fp2);
        assert_eq!(ctx.register_for_temp(fp1), Some(FP));
        assert_eq!(ctx.machine_temp_ref(SP), None);
    }

    #[test]
    fn fragments_drain_in_append_order() {
        use crate::ir::frame::Fragment;
        let mut ctx = Context::new();
        let l1 = ctx.named_label("s1");
        let l2 = ctx.named_label("s2");
        ctx.push_fragment(Fragment::Str {
            label: l1,
            data: b"a".to_vec(),
        });
        ctx.push_fragment(Fragment::Str {
            label: l2,
            data: b"b".to_vec(),
        });
        let drained = ctx.take_fragments();
        assert_eq!(drained.len(), 2);
        assert!(ctx.take_fragments().is_empty());
    }
}
