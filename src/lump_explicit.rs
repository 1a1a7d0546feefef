//! Signature-based lumping of explicit graphs.
//!
//! The lumper refines a seed partition until it is a bisimulation: in each
//! pass every node gets a *signature* (its current block plus the weights it
//! accumulates into each block), and nodes are regrouped by signature. The
//! seed comes from the objective, so the computed quotient preserves the
//! answer to the objective on the original graph.

use std::collections::BTreeMap;
use std::collections::HashMap;

use log::debug;

use crate::bitset::BitSet;
use crate::graph::{Graph, GraphBuilder};
use crate::objective::{Bisimulation, Objective, ObjectiveKind, Scheduler};
use crate::partition::{fill_gaps, refine_to_fixpoint, RefineStrategy};

/// Result of lumping: the quotient graph, the translated objective, and the
/// correspondence between original nodes and quotient blocks.
#[derive(Debug)]
pub struct Quotient {
    pub graph: Graph,
    pub objective: Objective,
    /// Block of each original node; block ids are the quotient node indices.
    pub from_original: Vec<usize>,
    /// Members of each block, in ascending node order.
    pub to_original: Vec<Vec<usize>>,
}

impl Quotient {
    /// Lift a per-block value vector back to the original nodes.
    pub fn values_to_original(&self, values: &[f64]) -> Vec<f64> {
        assert_eq!(values.len(), self.to_original.len());
        self.from_original.iter().map(|&b| values[b]).collect()
    }

    /// Lift a scheduler on the quotient back to the original graph: each
    /// decision node picks its first successor landing in the block the
    /// quotient scheduler chose.
    pub fn lift_scheduler(&self, original: &Graph, quotient: &Scheduler) -> Scheduler {
        let mut lifted = Scheduler::new(original.num_nodes());
        for node in 0..original.num_nodes() {
            if !original.is_decision(node) {
                continue;
            }
            let block = self.from_original[node];
            if !quotient.is_decided(block) {
                continue;
            }
            let chosen_block = self.graph.successor(block, quotient.decision(block));
            let choice = (0..original.num_successors(node))
                .find(|&i| self.from_original[original.successor(node, i)] == chosen_block);
            // Bisimilarity guarantees every member of the block offers the
            // chosen successor block.
            let choice =
                choice.unwrap_or_else(|| panic!("Node {} cannot realize the lifted choice", node));
            lifted.set(node, choice);
        }
        lifted
    }
}

/// A node's signature for one refinement pass: its decision flag, its current
/// block, and the (block, weight-bits) pairs of its outgoing transitions,
/// sorted by block. The flag keeps decision and distribution nodes apart even
/// when their transitions look alike.
type Signature = (bool, usize, Vec<(usize, u64)>);

pub struct LumperExplicit<'g> {
    bisimulation: Bisimulation,
    original: Option<(&'g Graph, Objective)>,
    lumped: bool,
}

impl<'g> LumperExplicit<'g> {
    pub fn new(bisimulation: Bisimulation) -> Self {
        Self {
            bisimulation,
            original: None,
            lumped: false,
        }
    }

    /// Attach the graph and objective to lump for. Resets any previous run.
    pub fn set_original(&mut self, graph: &'g Graph, objective: Objective) {
        self.original = Some((graph, objective));
        self.lumped = false;
    }

    /// Whether this lumper handles the attached graph and objective.
    pub fn can_lump(&self) -> bool {
        let Some((graph, objective)) = &self.original else {
            return false;
        };
        match self.bisimulation {
            Bisimulation::Strong => true,
            // Weak lumping ignores own-block transitions, which is only
            // answer-preserving for unbounded objectives on Markov chains.
            Bisimulation::Weak => !graph.semantics().is_nondet() && !objective.is_bounded(),
        }
    }

    /// Compute the quotient. Must be called at most once per `set_original`.
    pub fn lump(&mut self) -> Quotient {
        assert!(!self.lumped, "Already lumped");
        assert!(self.can_lump(), "Objective not handled by this lumper");
        self.lumped = true;

        // can_lump() above implies the original has been set.
        let Some((graph, objective)) = &self.original else {
            unreachable!()
        };
        let graph = *graph;

        let mut blocks = seed_partition(graph, objective);
        let num_blocks = fill_gaps(&mut blocks);
        debug!(
            "Lumping {} nodes, {:?}, seed has {} blocks",
            graph.num_nodes(),
            self.bisimulation,
            num_blocks
        );

        let mut strategy = ExplicitRefine {
            graph,
            bisimulation: self.bisimulation,
        };
        let (blocks, num_blocks) = refine_to_fixpoint(&mut strategy, blocks, num_blocks);
        debug!("Lumping finished with {} blocks", num_blocks);

        self.build_quotient(graph, objective, blocks, num_blocks)
    }

    fn build_quotient(
        &self,
        graph: &Graph,
        objective: &Objective,
        blocks: Vec<usize>,
        num_blocks: usize,
    ) -> Quotient {
        // Block ids were assigned in node order, so the first occurrence of
        // each id is the least member: the block's representative.
        let mut to_original = vec![Vec::new(); num_blocks];
        for (node, &block) in blocks.iter().enumerate() {
            to_original[block].push(node);
        }
        let representatives: Vec<usize> = to_original.iter().map(|members| members[0]).collect();

        let mut builder = GraphBuilder::new(graph.semantics());
        builder.reserve_nodes(num_blocks);
        for (block, &rep) in representatives.iter().enumerate() {
            if graph.is_decision(rep) {
                builder.mark_decision(block);
                let mut seen = BitSet::new();
                for i in 0..graph.num_successors(rep) {
                    let succ_block = blocks[graph.successor(rep, i)];
                    if seen.insert(succ_block) {
                        builder.add_edge(block, succ_block, 1.0);
                    }
                }
            } else {
                let mut weights: BTreeMap<usize, f64> = BTreeMap::new();
                for i in 0..graph.num_successors(rep) {
                    let succ_block = blocks[graph.successor(rep, i)];
                    *weights.entry(succ_block).or_insert(0.0) += graph.weight(rep, i);
                }
                for (succ_block, weight) in weights {
                    builder.add_edge(block, succ_block, weight);
                }
            }
        }
        *builder.props_mut() = graph.props().translate(&representatives);
        let quotient_graph = builder.build();

        let translate_set = |set: &BitSet| -> BitSet {
            representatives
                .iter()
                .enumerate()
                .filter(|&(_, &rep)| set.contains(rep))
                .map(|(block, _)| block)
                .collect()
        };
        let kind = match &objective.kind {
            ObjectiveKind::UnboundedReachability { target, zero } => {
                ObjectiveKind::UnboundedReachability {
                    target: translate_set(target),
                    zero: zero.as_ref().map(translate_set),
                }
            }
            ObjectiveKind::StepBoundedReachability { target, steps } => {
                ObjectiveKind::StepBoundedReachability {
                    target: translate_set(target),
                    steps: *steps,
                }
            }
            ObjectiveKind::Lump { seed } => ObjectiveKind::Lump {
                seed: representatives.iter().map(|&rep| seed[rep]).collect(),
            },
        };
        let objective = Objective {
            kind,
            min: objective.min,
            compute_scheduler: objective.compute_scheduler,
        };

        Quotient {
            graph: quotient_graph,
            objective,
            from_original: blocks,
            to_original,
        }
    }
}

/// Refinement pass over an explicit graph.
struct ExplicitRefine<'g> {
    graph: &'g Graph,
    bisimulation: Bisimulation,
}

impl RefineStrategy for ExplicitRefine<'_> {
    type Partition = Vec<usize>;

    /// Regroup nodes by signature. New block ids are assigned in node-index
    /// order, so each block's id is determined by its least member.
    fn refine(&mut self, blocks: &Vec<usize>) -> (Vec<usize>, usize) {
        let mut ids: HashMap<Signature, usize> = HashMap::new();
        let mut new_blocks = Vec::with_capacity(blocks.len());

        for node in 0..self.graph.num_nodes() {
            let sig = self.signature(blocks, node);
            let next_id = ids.len();
            let id = *ids.entry(sig).or_insert(next_id);
            new_blocks.push(id);
        }
        let num = ids.len();
        (new_blocks, num)
    }
}

impl ExplicitRefine<'_> {
    fn signature(&self, blocks: &[usize], node: usize) -> Signature {
        let graph = self.graph;
        let own = blocks[node];
        let mut weights: BTreeMap<usize, f64> = BTreeMap::new();
        for i in 0..graph.num_successors(node) {
            let block = blocks[graph.successor(node, i)];
            if self.bisimulation == Bisimulation::Weak && block == own {
                continue;
            }
            if graph.is_decision(node) {
                // A decision node's signature is the *set* of successor
                // blocks; two choices into the same block collapse.
                weights.insert(block, 1.0);
            } else {
                *weights.entry(block).or_insert(0.0) += graph.weight(node, i);
            }
        }
        let entries = weights
            .into_iter()
            .map(|(block, weight)| (block, weight.to_bits()))
            .collect();
        (graph.is_decision(node), own, entries)
    }
}

/// Initial partition induced by the objective: the coarsest partition that
/// separates the node sets the objective talks about.
fn seed_partition(graph: &Graph, objective: &Objective) -> Vec<usize> {
    match &objective.kind {
        ObjectiveKind::UnboundedReachability { target, zero } => {
            let mut blocks = vec![0usize; graph.num_nodes()];
            for node in target.iter() {
                blocks[node] = 1;
            }
            if let Some(zero) = zero {
                for node in zero.iter() {
                    assert!(!target.contains(node), "Target and zero sets overlap");
                    blocks[node] = 2;
                }
            }
            blocks
        }
        ObjectiveKind::StepBoundedReachability { target, .. } => {
            let mut blocks = vec![0usize; graph.num_nodes()];
            for node in target.iter() {
                blocks[node] = 1;
            }
            blocks
        }
        ObjectiveKind::Lump { seed } => {
            assert_eq!(seed.len(), graph.num_nodes(), "Seed size mismatch");
            seed.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::graph::Semantics;
    use crate::props::{PropKey, PropValue};

    /// 0 branches to the symmetric nodes 1 and 2, both of which reach the
    /// absorbing target 3.
    fn diamond_dtmc() -> Graph {
        let mut builder = GraphBuilder::new(Semantics::Dtmc);
        builder
            .add_edge(0, 1, 0.5)
            .add_edge(0, 2, 0.5)
            .add_edge(1, 3, 1.0)
            .add_edge(2, 3, 1.0)
            .add_edge(3, 3, 1.0);
        builder.build()
    }

    #[test]
    fn test_dtmc_strong_lumping() {
        let graph = diamond_dtmc();
        let target: BitSet = [3].into_iter().collect();

        let mut lumper = LumperExplicit::new(Bisimulation::Strong);
        lumper.set_original(&graph, Objective::unbounded_reachability(target));
        assert!(lumper.can_lump());
        let quotient = lumper.lump();

        // Nodes 1 and 2 are bisimilar; 0 and 3 stand alone.
        assert_eq!(quotient.graph.num_nodes(), 3);
        assert_eq!(quotient.from_original[1], quotient.from_original[2]);
        assert_ne!(quotient.from_original[0], quotient.from_original[1]);
        assert_eq!(quotient.to_original[quotient.from_original[1]], vec![1, 2]);

        // The branch weights merge in the quotient.
        let q0 = quotient.from_original[0];
        let q1 = quotient.from_original[1];
        assert_eq!(quotient.graph.successors(q0), &[q1]);
        assert_eq!(quotient.graph.weight(q0, 0), 1.0);

        // The target survives translation.
        match &quotient.objective.kind {
            ObjectiveKind::UnboundedReachability { target, .. } => {
                assert_eq!(
                    target.iter().collect::<Vec<_>>(),
                    vec![quotient.from_original[3]]
                );
            }
            other => panic!("unexpected objective: {other:?}"),
        }
    }

    #[test]
    fn test_props_translate_to_quotient() {
        let mut graph = diamond_dtmc();
        let label: BitSet = [1, 2].into_iter().collect();
        graph
            .props_mut()
            .insert(PropKey::label("mid"), PropValue::NodeBool(label));

        let mut lumper = LumperExplicit::new(Bisimulation::Strong);
        lumper.set_original(
            &graph,
            Objective::unbounded_reachability([3].into_iter().collect()),
        );
        let quotient = lumper.lump();

        let translated = quotient.graph.props().get(&PropKey::label("mid")).unwrap();
        match translated {
            PropValue::NodeBool(set) => {
                assert_eq!(
                    set.iter().collect::<Vec<_>>(),
                    vec![quotient.from_original[1]]
                );
            }
            other => panic!("unexpected prop: {other:?}"),
        }
    }

    #[test]
    fn test_values_to_original() {
        let graph = diamond_dtmc();
        let mut lumper = LumperExplicit::new(Bisimulation::Strong);
        lumper.set_original(
            &graph,
            Objective::unbounded_reachability([3].into_iter().collect()),
        );
        let quotient = lumper.lump();

        let mut block_values = vec![0.0; quotient.graph.num_nodes()];
        block_values[quotient.from_original[0]] = 0.25;
        block_values[quotient.from_original[1]] = 0.5;
        block_values[quotient.from_original[3]] = 1.0;
        assert_eq!(
            quotient.values_to_original(&block_values),
            vec![0.25, 0.5, 0.5, 1.0]
        );
    }

    #[test]
    fn test_weak_ctmc_ignores_own_block_rates() {
        // Nodes 0 and 1 differ only in their rate to each other; both move
        // to the absorbing 2 at rate 3.
        let mut builder = GraphBuilder::new(Semantics::Ctmc);
        builder
            .add_edge(0, 1, 5.0)
            .add_edge(0, 2, 3.0)
            .add_edge(1, 0, 8.0)
            .add_edge(1, 2, 3.0);
        let graph = builder.build();

        let target: BitSet = [2].into_iter().collect();

        let mut strong = LumperExplicit::new(Bisimulation::Strong);
        strong.set_original(&graph, Objective::unbounded_reachability(target.clone()));
        let strong_quotient = strong.lump();
        assert_eq!(strong_quotient.graph.num_nodes(), 3);

        let mut weak = LumperExplicit::new(Bisimulation::Weak);
        weak.set_original(&graph, Objective::unbounded_reachability(target));
        assert!(weak.can_lump());
        let weak_quotient = weak.lump();
        assert_eq!(weak_quotient.graph.num_nodes(), 2);
        assert_eq!(weak_quotient.from_original[0], weak_quotient.from_original[1]);
    }

    #[test]
    fn test_weak_rejects_bounded() {
        let graph = diamond_dtmc();
        let mut lumper = LumperExplicit::new(Bisimulation::Weak);
        lumper.set_original(
            &graph,
            Objective::step_bounded_reachability([3].into_iter().collect(), 5),
        );
        assert!(!lumper.can_lump());
    }

    /// MDP where decision node 0 has two actions (distribution nodes 1, 2)
    /// that become equivalent after lumping.
    fn mdp_with_equivalent_actions() -> Graph {
        let mut builder = GraphBuilder::new(Semantics::Mdp);
        builder
            .mark_decision(0)
            .mark_decision(3)
            .mark_decision(4)
            // two actions of state 0
            .add_edge(0, 1, 1.0)
            .add_edge(0, 2, 1.0)
            // both distributions: 0.5 to target state, 0.5 to sink state
            .add_edge(1, 3, 0.5)
            .add_edge(1, 4, 0.5)
            .add_edge(2, 4, 0.5)
            .add_edge(2, 3, 0.5)
            // absorbing states via their self-distributions 5, 6
            .add_edge(3, 5, 1.0)
            .add_edge(5, 3, 1.0)
            .add_edge(4, 6, 1.0)
            .add_edge(6, 4, 1.0);
        builder.build()
    }

    #[test]
    fn test_mdp_equivalent_actions_collapse() {
        let graph = mdp_with_equivalent_actions();
        let target: BitSet = [3].into_iter().collect();

        let mut lumper = LumperExplicit::new(Bisimulation::Strong);
        lumper.set_original(&graph, Objective::unbounded_reachability(target));
        let quotient = lumper.lump();

        // Distribution nodes 1 and 2 are bisimilar, so state 0's two actions
        // collapse to one in the quotient.
        assert_eq!(quotient.from_original[1], quotient.from_original[2]);
        let q0 = quotient.from_original[0];
        assert!(quotient.graph.is_decision(q0));
        assert_eq!(quotient.graph.num_successors(q0), 1);
    }

    #[test]
    fn test_lift_scheduler() {
        let graph = mdp_with_equivalent_actions();
        let target: BitSet = [3].into_iter().collect();

        let mut lumper = LumperExplicit::new(Bisimulation::Strong);
        lumper.set_original(
            &graph,
            Objective::unbounded_reachability(target).with_scheduler(),
        );
        let quotient = lumper.lump();

        let q0 = quotient.from_original[0];
        let mut quotient_scheduler = Scheduler::new(quotient.graph.num_nodes());
        quotient_scheduler.set(q0, 0);

        let lifted = quotient.lift_scheduler(&graph, &quotient_scheduler);
        assert!(lifted.is_decided(0));
        let choice = lifted.decision(0);
        assert_eq!(
            quotient.from_original[graph.successor(0, choice)],
            quotient.graph.successor(q0, 0)
        );
    }

    #[test]
    fn test_lump_seed_objective() {
        let graph = diamond_dtmc();
        // Seed separates node 3 from the rest; refinement distinguishes 0.
        let mut lumper = LumperExplicit::new(Bisimulation::Strong);
        lumper.set_original(&graph, Objective::lump(vec![0, 0, 0, 1]));
        let quotient = lumper.lump();
        assert_eq!(quotient.graph.num_nodes(), 3);
        match &quotient.objective.kind {
            ObjectiveKind::Lump { seed } => assert_eq!(seed.len(), 3),
            other => panic!("unexpected objective: {other:?}"),
        }
    }

    #[test]
    #[should_panic(expected = "Already lumped")]
    fn test_lump_twice_panics() {
        let graph = diamond_dtmc();
        let mut lumper = LumperExplicit::new(Bisimulation::Strong);
        lumper.set_original(
            &graph,
            Objective::unbounded_reachability([3].into_iter().collect()),
        );
        lumper.lump();
        lumper.lump();
    }
}
