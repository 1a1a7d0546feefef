//! Backward reachability precomputation.
//!
//! Computes the set of nodes that can reach a target set at all, by a
//! backward breadth-first search over the predecessor index. Everything
//! outside the closure has reachability probability zero under every
//! scheduler, so downstream engines can treat those nodes as absorbing. For
//! nondeterministic models the search can simultaneously record a witnessing
//! scheduler: the first discovered path wins.

use std::collections::VecDeque;

use log::debug;

use crate::bitset::BitSet;
use crate::graph::Graph;
use crate::objective::{Objective, ObjectiveKind, Scheduler};

#[derive(Debug)]
pub struct ReachabilityResult {
    /// Nodes with a positive probability of reaching the target (the target
    /// itself included).
    pub reachable: BitSet,
    /// A scheduler witnessing reachability for every decision node in the
    /// closure outside the target, if one was requested.
    pub scheduler: Option<Scheduler>,
}

#[derive(Debug, Default)]
pub struct ReachabilityPrecompute;

impl ReachabilityPrecompute {
    pub fn new() -> Self {
        Self
    }

    /// Whether the precomputation applies: unbounded reachability without a
    /// caller-supplied zero set.
    pub fn can_handle(&self, objective: &Objective) -> bool {
        matches!(
            objective.kind,
            ObjectiveKind::UnboundedReachability { zero: None, .. }
        )
    }

    /// Run the precomputation and refine the objective with the computed
    /// zero set.
    pub fn process(&self, graph: &Graph, objective: &mut Objective) -> ReachabilityResult {
        assert!(self.can_handle(objective), "Objective not handled");
        let ObjectiveKind::UnboundedReachability { target, zero } = &mut objective.kind else {
            unreachable!()
        };
        assert!(
            !objective.compute_scheduler || graph.semantics().is_nondet(),
            "Scheduler requested on a deterministic model"
        );

        let mut reachable = target.clone();
        let mut scheduler = objective
            .compute_scheduler
            .then(|| Scheduler::new(graph.num_nodes()));

        let pred = graph.predecessors();
        let mut queue: VecDeque<usize> = target.iter().collect();
        while let Some(node) = queue.pop_front() {
            for &p in pred.predecessors(node) {
                if !reachable.insert(p) {
                    continue;
                }
                queue.push_back(p);
                if let Some(scheduler) = &mut scheduler {
                    if graph.is_decision(p) {
                        // Any successor ordinal leading into the closure
                        // witnesses reachability; take the discovery edge.
                        let choice = (0..graph.num_successors(p))
                            .find(|&i| graph.successor(p, i) == node)
                            .unwrap_or_else(|| unreachable!());
                        scheduler.set(p, choice);
                    }
                }
            }
        }
        debug!(
            "Reachability closure: {} of {} nodes",
            reachable.len(),
            graph.num_nodes()
        );

        // Everything outside the closure is a zero node.
        let mut zero_set = BitSet::with_capacity(graph.num_nodes());
        for node in 0..graph.num_nodes() {
            if !reachable.contains(node) {
                zero_set.insert(node);
            }
        }
        *zero = Some(zero_set);

        ReachabilityResult {
            reachable,
            scheduler,
        }
    }
}
