//! Objectives and schedulers.
//!
//! An [`Objective`] tells an engine what it is being asked to preserve or
//! compute on a graph: a reachability query, or a plain lumping request with
//! a caller-supplied seed partition. Engines that resolve nondeterminism can
//! report their choices in a [`Scheduler`].

use crate::bitset::BitSet;

/// Flavor of bisimulation to compute.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Bisimulation {
    /// Blocks must agree on weights into every block.
    Strong,
    /// Blocks must agree on weights into every *other* block; transitions
    /// inside the own block are ignored.
    Weak,
}

#[derive(Debug, Clone)]
pub enum ObjectiveKind {
    /// Probability of eventually reaching `target`. Nodes in `zero` (if
    /// given) are known to have probability zero and may be treated as
    /// absorbing.
    UnboundedReachability {
        target: BitSet,
        zero: Option<BitSet>,
    },
    /// Probability of reaching `target` within `steps` transitions.
    StepBoundedReachability { target: BitSet, steps: u32 },
    /// Lump with respect to a caller-supplied seed partition: `seed[u]` is
    /// the initial block of node `u`.
    Lump { seed: Vec<usize> },
}

#[derive(Debug, Clone)]
pub struct Objective {
    pub kind: ObjectiveKind,
    /// Minimize (rather than maximize) over schedulers; only meaningful for
    /// nondeterministic models.
    pub min: bool,
    /// Whether the engine should record a witnessing scheduler.
    pub compute_scheduler: bool,
}

impl Objective {
    pub fn unbounded_reachability(target: BitSet) -> Self {
        Self {
            kind: ObjectiveKind::UnboundedReachability { target, zero: None },
            min: false,
            compute_scheduler: false,
        }
    }

    pub fn step_bounded_reachability(target: BitSet, steps: u32) -> Self {
        Self {
            kind: ObjectiveKind::StepBoundedReachability { target, steps },
            min: false,
            compute_scheduler: false,
        }
    }

    pub fn lump(seed: Vec<usize>) -> Self {
        Self {
            kind: ObjectiveKind::Lump { seed },
            min: false,
            compute_scheduler: false,
        }
    }

    pub fn with_scheduler(mut self) -> Self {
        self.compute_scheduler = true;
        self
    }

    pub fn minimizing(mut self) -> Self {
        self.min = true;
        self
    }

    /// Whether the objective is step-bounded (bounded objectives rule out
    /// weak lumping).
    pub fn is_bounded(&self) -> bool {
        matches!(self.kind, ObjectiveKind::StepBoundedReachability { .. })
    }
}

/// A memoryless scheduler: for each decision node, the ordinal of the chosen
/// successor, or [`Scheduler::UNDECIDED`] where no choice has been made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduler {
    decisions: Vec<i32>,
}

impl Scheduler {
    pub const UNDECIDED: i32 = -1;

    pub fn new(num_nodes: usize) -> Self {
        Self {
            decisions: vec![Self::UNDECIDED; num_nodes],
        }
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn is_decided(&self, node: usize) -> bool {
        self.decisions[node] != Self::UNDECIDED
    }

    /// Chosen successor ordinal. Fatal if the node is undecided.
    pub fn decision(&self, node: usize) -> usize {
        let d = self.decisions[node];
        assert!(d != Self::UNDECIDED, "Node {} is undecided", node);
        d as usize
    }

    pub fn set(&mut self, node: usize, choice: usize) {
        self.decisions[node] = choice as i32;
    }
}
