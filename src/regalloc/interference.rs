//! Register-interference graph construction (spec §4.6).
//!
//! One arena-allocated [`Node`] per temporary (plus one per pre-colored
//! machine register), with plain `HashSet`-based adjacency lists rather than
//! temp-to-temp pointers — the teacher's register allocator threads an
//! explicit `Context`/arena of its own (`regalloc::context::Context`) for the
//! same reason: a graph whose nodes reference each other directly fights the
//! borrow checker the moment two nodes need to be merged (coalesced).
//! `cranelift_entity::SecondaryMap` gives the dense per-node storage the
//! teacher's own entity maps provide.

use crate::assembly::Instruction;
use crate::entities::{Node, Temp};
use crate::regalloc::liveness::Liveness;
use cranelift_entity::{PrimaryMap, SecondaryMap};
use std::collections::{HashMap, HashSet};

/// The interference graph for one procedure: nodes are temporaries
/// (including pre-colored machine-register temps), edges are "must not be
/// assigned the same register", and move edges are tracked separately for
/// coalescing.
pub struct InterferenceGraph {
    nodes: PrimaryMap<Node, Temp>,
    node_of: HashMap<Temp, Node>,
    adjacency: SecondaryMap<Node, HashSet<Node>>,
    moves: SecondaryMap<Node, HashSet<Node>>,
    precolored: HashSet<Node>,
}

impl InterferenceGraph {
    fn node_for(&mut self, t: Temp) -> Node {
        if let Some(&n) = self.node_of.get(&t) {
            return n;
        }
        let n = self.nodes.push(t);
        self.node_of.insert(t, n);
        n
    }

    fn add_edge(&mut self, u: Node, v: Node) {
        if u == v {
            return;
        }
        if self.adjacency[u].insert(v) {
            self.adjacency[v].insert(u);
        }
    }

    /// All nodes in the graph.
    pub fn nodes(&self) -> impl Iterator<Item = Node> + '_ {
        self.nodes.keys()
    }

    /// The temporary a node stands for.
    pub fn temp_of(&self, n: Node) -> Temp {
        self.nodes[n]
    }

    /// The node for a temporary, if it appears anywhere in the graph.
    pub fn node_of(&self, t: Temp) -> Option<Node> {
        self.node_of.get(&t).copied()
    }

    /// `u` and `v` interfere (must receive different colors).
    pub fn interferes(&self, u: Node, v: Node) -> bool {
        self.adjacency[u].contains(&v)
    }

    /// Neighbors of `n` in the interference graph.
    pub fn neighbors(&self, n: Node) -> impl Iterator<Item = Node> + '_ {
        self.adjacency[n].iter().copied()
    }

    /// `n`'s degree — `usize::MAX` for a pre-colored node, since a
    /// pre-colored register is never simplified or spilled regardless of how
    /// many neighbors it has (spec §4.6/§4.7).
    pub fn degree(&self, n: Node) -> usize {
        if self.precolored.contains(&n) {
            usize::MAX
        } else {
            self.adjacency[n].len()
        }
    }

    /// Is `n` a pre-colored machine-register node?
    pub fn is_precolored(&self, n: Node) -> bool {
        self.precolored.contains(&n)
    }

    /// Nodes connected to `n` by a move (candidates for coalescing).
    pub fn move_related(&self, n: Node) -> impl Iterator<Item = Node> + '_ {
        self.moves[n].iter().copied()
    }

    /// Remove the move edge between `u` and `v` (the move either coalesced
    /// or was frozen).
    pub fn forget_move(&mut self, u: Node, v: Node) {
        self.moves[u].remove(&v);
        self.moves[v].remove(&u);
    }

    /// Merge `v` into `u` after coalescing: every edge `v` had becomes an
    /// edge of `u`, and `v`'s move edges become `u`'s.
    pub fn coalesce(&mut self, u: Node, v: Node) {
        let v_neighbors: Vec<Node> = self.adjacency[v].iter().copied().collect();
        for w in v_neighbors {
            self.add_edge(u, w);
            self.adjacency[w].remove(&v);
        }
        self.adjacency[v].clear();
        let v_moves: Vec<Node> = self.moves[v].iter().copied().collect();
        for w in v_moves {
            if w != u {
                self.moves[u].insert(w);
                self.moves[w].insert(u);
            }
            self.moves[w].remove(&v);
        }
        self.moves[v].clear();
    }
}

/// Build the interference graph for one procedure's selected instructions,
/// given their liveness and the set of pre-colored machine-register temps.
/// Every pair of distinct pre-colored nodes gets a permanent interference
/// edge, even if selection happened to emit a move between them — two
/// machine registers are never candidates for coalescing into one color.
pub fn build(instrs: &[Instruction], liveness: &Liveness, precolored_temps: &HashSet<Temp>) -> InterferenceGraph {
    let mut graph = InterferenceGraph {
        nodes: PrimaryMap::new(),
        node_of: HashMap::new(),
        adjacency: SecondaryMap::new(),
        moves: SecondaryMap::new(),
        precolored: HashSet::new(),
    };

    let mut precolored_nodes = Vec::with_capacity(precolored_temps.len());
    for &t in precolored_temps {
        let n = graph.node_for(t);
        graph.precolored.insert(n);
        precolored_nodes.push(n);
    }
    // Pre-colored nodes are permanent, mutually interfering: two distinct
    // machine registers can never be coalesced into one rep (spec §4.6).
    for (i, &u) in precolored_nodes.iter().enumerate() {
        for &v in &precolored_nodes[i + 1..] {
            graph.add_edge(u, v);
        }
    }

    for (i, instr) in instrs.iter().enumerate() {
        let live_out = &liveness.live_out[i];
        match instr {
            Instruction::Move { dst, src, .. } => {
                let d = graph.node_for(*dst);
                let s = graph.node_for(*src);
                graph.moves[d].insert(s);
                graph.moves[s].insert(d);
                for &t in live_out {
                    if t == *src {
                        continue;
                    }
                    let n = graph.node_for(t);
                    graph.add_edge(d, n);
                }
            }
            _ => {
                for def in instr.defs() {
                    let d = graph.node_for(def);
                    for &t in live_out {
                        let n = graph.node_for(t);
                        graph.add_edge(d, n);
                    }
                }
            }
        }
    }

    graph
}
