//! Signature-based lumping of symbolic graphs.
//!
//! The partition is itself a diagram: `P(s, b) = 1` iff state `s` belongs to
//! the block whose index is encoded in binary over dedicated *block*
//! variables. Each refinement pass combines the canonicalized transition
//! relation with the partition over the next-state variables and
//! sum-abstracts the next-state variables away, yielding for every state an
//! integer-counting signature diagram over (weight-code, successor-block).
//! States are regrouped by signature sub-diagram; structural sharing makes
//! the grouping a dictionary lookup on node handles.
//!
//! Following the refinement, the final block encoding becomes the quotient's
//! state space: a minimal set of quotient variables, a representative state
//! per block, and translation of diagrams between the original and quotient
//! variable spaces through the partition relation.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::canon::{CanonicalTrans, Canonicalizer, DEFAULT_TOLERANCE};
use crate::error::Error;
use crate::graph_dd::GraphDd;
use crate::mtbdd::{Mtdd, Op, Ref};
use crate::objective::Bisimulation;
use crate::partition::{refine_to_fixpoint, RefineStrategy};
use crate::props::{DdProps, PropKey};

/// Result of symbolic lumping.
#[derive(Debug)]
pub struct QuotientDd {
    /// Partition relation over (original pres, block) variables.
    partition: Ref,
    pres_vars: Vec<u32>,
    block_vars: Vec<u32>,
    next_block_vars: Vec<u32>,
    /// Quotient weight diagram over (block, next-block, action) variables.
    trans: Ref,
    /// 0/1 diagram of the valid block codes.
    space: Ref,
    props: DdProps,
    num_blocks: usize,
}

impl QuotientDd {
    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    pub fn trans(&self) -> Ref {
        self.trans
    }

    pub fn space(&self) -> Ref {
        self.space
    }

    pub fn block_vars(&self) -> &[u32] {
        &self.block_vars
    }

    pub fn next_block_vars(&self) -> &[u32] {
        &self.next_block_vars
    }

    pub fn partition(&self) -> Ref {
        self.partition
    }

    pub fn props(&self) -> &DdProps {
        &self.props
    }

    /// Translate a 0/1 state set over the original present-state variables
    /// into the set of blocks containing at least one of its states.
    pub fn original_to_quotient(&self, dd: &Mtdd, set: Ref) -> Ref {
        dd.exists(dd.apply(Op::Mul, self.partition, set), &self.pres_vars)
    }

    /// Translate a per-block value diagram back to the original state space:
    /// every state receives the value of its block.
    pub fn quotient_to_original(&self, dd: &Mtdd, values: Ref) -> Ref {
        dd.sum_abstract(dd.apply(Op::Mul, self.partition, values), &self.block_vars)
    }

    /// Number of blocks counted symbolically over the block-code space.
    /// Always agrees with [`Self::num_blocks`].
    pub fn count_blocks(&self, dd: &Mtdd) -> num_bigint::BigUint {
        dd.sat_count(self.space, &self.block_vars)
    }

    /// Diagrams that must survive garbage collection for this quotient to
    /// stay usable.
    pub fn roots(&self) -> Vec<Ref> {
        let mut roots = vec![self.partition, self.trans, self.space];
        roots.extend(self.props.iter().map(|(_, dd)| dd));
        roots
    }
}

pub struct LumperDd {
    bisimulation: Bisimulation,
    canonicalizer: Canonicalizer,
    valid_for: Vec<PropKey>,
    lumped: bool,
}

impl LumperDd {
    pub fn new(bisimulation: Bisimulation) -> Self {
        Self {
            bisimulation,
            canonicalizer: Canonicalizer::new(DEFAULT_TOLERANCE),
            valid_for: Vec::new(),
            lumped: false,
        }
    }

    /// Register a property the quotient must stay valid for: its states are
    /// separated in the seed partition and it is translated to the quotient.
    /// May be called repeatedly; duplicates are ignored.
    pub fn require_valid_for(&mut self, key: PropKey) {
        if !self.valid_for.contains(&key) {
            self.valid_for.push(key);
        }
    }

    /// Whether this lumper handles the given graph.
    pub fn can_lump(&self, graph: &GraphDd<'_>) -> bool {
        match self.bisimulation {
            Bisimulation::Strong => true,
            // Weak lumping ignores own-block transitions, which is only
            // sound without nondeterminism.
            Bisimulation::Weak => !graph.semantics().is_nondet(),
        }
    }

    /// Compute the quotient. Must be called at most once.
    pub fn lump(&mut self, graph: &GraphDd<'_>) -> Result<QuotientDd, Error> {
        assert!(!self.lumped, "Already lumped");
        assert!(self.can_lump(graph), "Graph not handled by this lumper");
        self.lumped = true;

        let dd = graph.dd();
        let canonical = self
            .canonicalizer
            .canonicalize(dd, graph.trans(), &mut || graph.fresh_var());
        let marker = graph.fresh_var();

        // Seed partition: each registered property contributes a field of
        // block bits carrying the dense code of the property's value, so
        // states agreeing on every property share a seed block. Boolean
        // labels (two codes) and real-valued rewards go through the same
        // encoding.
        let mut pool: Vec<u32> = Vec::new();
        let props: Vec<Ref> = self
            .valid_for
            .iter()
            .map(|key| graph.props().require(key))
            .collect::<Result<_, _>>()?;
        let mut partition = graph.space();
        for prop in props {
            let values = dd.collect_values(prop);
            let bits = bits_for(values.len());
            let offset = pool.len();
            while pool.len() < offset + bits {
                pool.push(graph.fresh_var());
            }
            let coded = value_codes(dd, prop, &pool[offset..], &values);
            partition = dd.apply(Op::Mul, partition, coded);
        }
        if pool.is_empty() {
            pool.push(graph.fresh_var());
            partition = dd.apply(Op::Mul, partition, dd.index_cube(&pool[..1], 0));
        }
        debug!(
            "Symbolic lumping, {:?}, {} seed properties",
            self.bisimulation,
            self.valid_for.len()
        );

        let mut strategy = SymbolicRefine {
            graph,
            canonical: &canonical,
            marker,
            pool,
            bisimulation: self.bisimulation,
        };
        // The seed block count is unknown until the first pass, so start
        // from zero and let the fixpoint loop settle it.
        let (partition, num_blocks) = refine_to_fixpoint(&mut strategy, partition, 0);
        debug!("Symbolic lumping finished with {} blocks", num_blocks);

        Ok(self.build_quotient(graph, partition, num_blocks, &strategy.pool))
    }

    fn build_quotient(
        &self,
        graph: &GraphDd<'_>,
        partition: Ref,
        num_blocks: usize,
        pool: &[u32],
    ) -> QuotientDd {
        let dd = graph.dd();
        let bits = bits_for(num_blocks);
        let block_vars = pool[..bits].to_vec();
        let next_block_vars: Vec<u32> = (0..bits).map(|_| graph.fresh_var()).collect();
        let block_to_next: HashMap<u32, u32> = block_vars
            .iter()
            .zip(&next_block_vars)
            .map(|(&b, &n)| (b, n))
            .collect();

        let p_next = dd.rename(partition, &graph.pres_to_next());

        let mut space = dd.zero;
        let mut trans = dd.zero;
        let mut representatives: Vec<HashMap<u32, bool>> = Vec::with_capacity(num_blocks);
        for block in 0..num_blocks {
            let code = dd.index_cube(&block_vars, block);
            space = dd.apply(Op::Max, space, code);

            let members = dd.exists(dd.apply(Op::Mul, partition, code), &block_vars);
            let rep = dd
                .one_sat(members, graph.pres_vars())
                .unwrap_or_else(|| unreachable!("Block {} has no members", block));
            let literals: Vec<(u32, bool)> = graph
                .pres_vars()
                .iter()
                .copied()
                .zip(rep.iter().copied())
                .collect();
            let rep_cube = dd.cube01(&literals);

            // The representative's outgoing weights, aggregated per
            // successor block and re-encoded over the next-block variables.
            let out = dd.sum_abstract(
                dd.apply(Op::Mul, graph.trans(), rep_cube),
                graph.pres_vars(),
            );
            let weights = dd.sum_abstract(dd.apply(Op::Mul, out, p_next), graph.next_vars());
            let weights = dd.rename(weights, &block_to_next);
            trans = dd.apply(Op::Add, trans, dd.apply(Op::Mul, code, weights));

            representatives.push(literals.into_iter().collect());
        }

        // Properties read off the representatives, like the explicit side.
        let mut props = DdProps::new();
        for (key, prop) in graph.props().iter() {
            let mut translated = dd.zero;
            for (block, rep) in representatives.iter().enumerate() {
                let value = dd.eval(prop, rep);
                if value != 0.0 {
                    let weighted =
                        dd.apply(Op::Mul, dd.index_cube(&block_vars, block), dd.constant(value));
                    translated = dd.apply(Op::Add, translated, weighted);
                }
            }
            props.insert(key.clone(), translated);
        }

        QuotientDd {
            partition,
            pres_vars: graph.pres_vars().to_vec(),
            block_vars,
            next_block_vars,
            trans,
            space,
            props,
            num_blocks,
        }
    }
}

/// Bits needed to encode block codes `0..k`.
fn bits_for(k: usize) -> usize {
    let bits = usize::BITS as usize - k.max(1).saturating_sub(1).leading_zeros() as usize;
    bits.max(1)
}

/// Rebuild a property diagram as the 0/1 relation pairing each state with
/// the dense code of its value, spelled out in binary over `bits`. `values`
/// are the distinct leaf values, sorted ascending; zero is a value like any
/// other, so every state keeps a code.
fn value_codes(dd: &Mtdd, f: Ref, bits: &[u32], values: &[f64]) -> Ref {
    let code_of: HashMap<u64, usize> = values
        .iter()
        .enumerate()
        .map(|(code, value)| (value.to_bits(), code))
        .collect();
    let mut memo = HashMap::new();
    value_codes_(dd, f, bits, &code_of, &mut memo)
}

fn value_codes_(
    dd: &Mtdd,
    f: Ref,
    bits: &[u32],
    code_of: &HashMap<u64, usize>,
    memo: &mut HashMap<Ref, Ref>,
) -> Ref {
    if dd.is_terminal(f) {
        return dd.index_cube(bits, code_of[&dd.value(f).to_bits()]);
    }
    if let Some(&res) = memo.get(&f) {
        return res;
    }
    let low = value_codes_(dd, dd.low(f), bits, code_of, memo);
    let high = value_codes_(dd, dd.high(f), bits, code_of, memo);
    let res = dd.mk_node(dd.var_of(f), low, high);
    memo.insert(f, res);
    res
}

/// Refinement pass over a symbolic graph.
struct SymbolicRefine<'g, 'a> {
    graph: &'g GraphDd<'a>,
    canonical: &'g CanonicalTrans,
    /// Auxiliary variable separating the old-partition and signature parts
    /// of the combined refinement diagram.
    marker: u32,
    /// Block variables allocated so far, grown as the block count grows.
    pool: Vec<u32>,
    bisimulation: Bisimulation,
}

impl RefineStrategy for SymbolicRefine<'_, '_> {
    type Partition = Ref;

    fn refine(&mut self, partition: &Ref) -> (Ref, usize) {
        let graph = self.graph;
        let dd = graph.dd();
        let p = *partition;
        let p_next = dd.rename(p, &graph.pres_to_next());

        let mut relation = self.canonical.relation;
        if self.bisimulation == Bisimulation::Weak {
            // Drop transitions that stay inside the own block.
            let same = dd.exists(dd.apply(Op::Mul, p, p_next), &self.pool);
            relation = dd.apply(Op::Mul, relation, dd.not01(same));
        }

        // Per-state signature: for every (weight-code, successor-block),
        // the number of successors realizing it.
        let sig = dd.sum_abstract(dd.apply(Op::Mul, relation, p_next), graph.next_vars());

        // Pair each state's old block with its signature; distinct pairs
        // become the new blocks.
        let total = dd.ite(dd.var_bool(self.marker), p, sig);

        let mut ids: HashMap<Ref, usize> = HashMap::new();
        let mut seen: HashSet<(Ref, usize)> = HashSet::new();
        collect_ids(dd, graph.pres_vars(), total, 0, &mut ids, &mut seen);
        let num_blocks = ids.len();

        let bits = bits_for(num_blocks);
        while self.pool.len() < bits {
            self.pool.push(graph.fresh_var());
        }
        let block_vars = &self.pool[..bits];

        let mut memo: HashMap<(Ref, usize), Ref> = HashMap::new();
        let refined = assign_codes(dd, graph.pres_vars(), block_vars, total, 0, &ids, &mut memo);

        (refined, num_blocks)
    }
}

/// First pass: walk the combined diagram down the present-state variables
/// and assign a dense id to every distinct sub-diagram found below them.
/// The all-zero sub-diagram belongs to states outside the state space and
/// gets no id.
fn collect_ids(
    dd: &Mtdd,
    pres_vars: &[u32],
    node: Ref,
    level: usize,
    ids: &mut HashMap<Ref, usize>,
    seen: &mut HashSet<(Ref, usize)>,
) {
    if level == pres_vars.len() {
        if !dd.is_zero(node) {
            let next_id = ids.len();
            ids.entry(node).or_insert(next_id);
        }
        return;
    }
    if !seen.insert((node, level)) {
        return;
    }
    let (low, high) = dd.top_cofactors(node, pres_vars[level]);
    collect_ids(dd, pres_vars, low, level + 1, ids, seen);
    collect_ids(dd, pres_vars, high, level + 1, ids, seen);
}

/// Second pass: rebuild the partition, replacing every signature
/// sub-diagram by the cube of its block code.
fn assign_codes(
    dd: &Mtdd,
    pres_vars: &[u32],
    block_vars: &[u32],
    node: Ref,
    level: usize,
    ids: &HashMap<Ref, usize>,
    memo: &mut HashMap<(Ref, usize), Ref>,
) -> Ref {
    if level == pres_vars.len() {
        return if dd.is_zero(node) {
            dd.zero
        } else {
            dd.index_cube(block_vars, ids[&node])
        };
    }
    if let Some(&res) = memo.get(&(node, level)) {
        return res;
    }
    let (low, high) = dd.top_cofactors(node, pres_vars[level]);
    let low = assign_codes(dd, pres_vars, block_vars, low, level + 1, ids, memo);
    let high = assign_codes(dd, pres_vars, block_vars, high, level + 1, ids, memo);
    let res = dd.mk_node(pres_vars[level], low, high);
    memo.insert((node, level), res);
    res
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::graph::Semantics;
    use crate::graph_dd::GraphDdBuilder;

    /// Block code of a state, decoded from the translated singleton cube.
    fn block_of(quotient: &QuotientDd, dd: &Mtdd, graph: &GraphDd<'_>, state: usize) -> usize {
        let cube = dd.index_cube(graph.pres_vars(), state);
        let blocks = quotient.original_to_quotient(dd, cube);
        let bits = dd.one_sat(blocks, quotient.block_vars()).unwrap();
        bits.iter()
            .enumerate()
            .map(|(j, &b)| (b as usize) << j)
            .sum()
    }

    fn diamond_dtmc<'a>(dd: &'a Mtdd) -> GraphDd<'a> {
        let mut builder = GraphDdBuilder::new(dd, Semantics::Dtmc, 2, 0);
        builder
            .add_edge(0, 0, 1, 0.5)
            .add_edge(0, 0, 2, 0.5)
            .add_edge(1, 0, 3, 1.0)
            .add_edge(2, 0, 3, 1.0)
            .add_edge(3, 0, 3, 1.0)
            .set_prop(PropKey::label("goal"), &[3]);
        builder.build()
    }

    #[test]
    fn test_strong_lumping_diamond() {
        let dd = Mtdd::default();
        let graph = diamond_dtmc(&dd);

        let mut lumper = LumperDd::new(Bisimulation::Strong);
        lumper.require_valid_for(PropKey::label("goal"));
        assert!(lumper.can_lump(&graph));
        let quotient = lumper.lump(&graph).unwrap();

        assert_eq!(quotient.num_blocks(), 3);
        assert_eq!(
            quotient.count_blocks(&dd),
            num_bigint::BigUint::from(3u32)
        );
        assert_eq!(
            block_of(&quotient, &dd, &graph, 1),
            block_of(&quotient, &dd, &graph, 2)
        );
        assert_ne!(
            block_of(&quotient, &dd, &graph, 0),
            block_of(&quotient, &dd, &graph, 1)
        );
    }

    #[test]
    fn test_quotient_transition_weights() {
        let dd = Mtdd::default();
        let graph = diamond_dtmc(&dd);

        let mut lumper = LumperDd::new(Bisimulation::Strong);
        lumper.require_valid_for(PropKey::label("goal"));
        let quotient = lumper.lump(&graph).unwrap();

        let b0 = block_of(&quotient, &dd, &graph, 0);
        let b1 = block_of(&quotient, &dd, &graph, 1);
        let b3 = block_of(&quotient, &dd, &graph, 3);

        let weight = |from: usize, to: usize| -> f64 {
            let mut assignment = HashMap::new();
            for (j, &v) in quotient.block_vars().iter().enumerate() {
                assignment.insert(v, (from >> j) & 1 != 0);
            }
            for (j, &v) in quotient.next_block_vars().iter().enumerate() {
                assignment.insert(v, (to >> j) & 1 != 0);
            }
            dd.eval(quotient.trans(), &assignment)
        };
        // The two 0.5-branches into the merged middle block sum up.
        assert_eq!(weight(b0, b1), 1.0);
        assert_eq!(weight(b1, b3), 1.0);
        assert_eq!(weight(b3, b3), 1.0);
        assert_eq!(weight(b0, b3), 0.0);
    }

    #[test]
    fn test_goal_prop_translates() {
        let dd = Mtdd::default();
        let graph = diamond_dtmc(&dd);

        let mut lumper = LumperDd::new(Bisimulation::Strong);
        lumper.require_valid_for(PropKey::label("goal"));
        let quotient = lumper.lump(&graph).unwrap();

        let goal = quotient.props().get(&PropKey::label("goal")).unwrap();
        let b3 = block_of(&quotient, &dd, &graph, 3);
        assert_eq!(goal, dd.index_cube(quotient.block_vars(), b3));
    }

    #[test]
    fn test_quotient_to_original_values() {
        let dd = Mtdd::default();
        let graph = diamond_dtmc(&dd);

        let mut lumper = LumperDd::new(Bisimulation::Strong);
        lumper.require_valid_for(PropKey::label("goal"));
        let quotient = lumper.lump(&graph).unwrap();

        // Per-block values: 0.25 for the block of 0, 0.5 for the merged
        // middle block, 1.0 for the goal block.
        let mut values = dd.zero;
        for (state, value) in [(0, 0.25), (1, 0.5), (3, 1.0)] {
            let block = block_of(&quotient, &dd, &graph, state);
            let cube = dd.index_cube(quotient.block_vars(), block);
            values = dd.apply(Op::Add, values, dd.apply(Op::Mul, cube, dd.constant(value)));
        }

        let lifted = quotient.quotient_to_original(&dd, values);
        for (state, expected) in [(0, 0.25), (1, 0.5), (2, 0.5), (3, 1.0)] {
            let mut assignment = HashMap::new();
            for (j, &v) in graph.pres_vars().iter().enumerate() {
                assignment.insert(v, (state >> j) & 1 != 0);
            }
            assert_eq!(dd.eval(lifted, &assignment), expected);
        }
    }

    /// Per-state reward diagram: the sum of each state's cube times its value.
    fn reward_diagram(dd: &Mtdd, graph: &GraphDd<'_>, entries: &[(usize, f64)]) -> Ref {
        let mut reward = dd.zero;
        for &(state, value) in entries {
            let cube = dd.index_cube(graph.pres_vars(), state);
            reward = dd.apply(Op::Add, reward, dd.apply(Op::Mul, cube, dd.constant(value)));
        }
        reward
    }

    #[test]
    fn test_reward_property_merges_equal_values() {
        let dd = Mtdd::default();
        let mut graph = diamond_dtmc(&dd);
        let reward = reward_diagram(&dd, &graph, &[(1, 2.5), (2, 2.5)]);
        graph.props_mut().insert(PropKey::reward("energy"), reward);

        let mut lumper = LumperDd::new(Bisimulation::Strong);
        lumper.require_valid_for(PropKey::reward("energy"));
        assert!(lumper.can_lump(&graph));
        let quotient = lumper.lump(&graph).unwrap();

        assert_eq!(quotient.num_blocks(), 3);
        assert_eq!(
            block_of(&quotient, &dd, &graph, 1),
            block_of(&quotient, &dd, &graph, 2)
        );

        // The reward survives translation to the quotient.
        let translated = quotient.props().get(&PropKey::reward("energy")).unwrap();
        let b1 = block_of(&quotient, &dd, &graph, 1);
        let mut assignment = HashMap::new();
        for (j, &v) in quotient.block_vars().iter().enumerate() {
            assignment.insert(v, (b1 >> j) & 1 != 0);
        }
        assert_eq!(dd.eval(translated, &assignment), 2.5);
    }

    #[test]
    fn test_reward_property_splits_differing_values() {
        // States 1 and 2 are bisimilar but carry different rewards, so the
        // seed partition must keep them apart.
        let dd = Mtdd::default();
        let mut graph = diamond_dtmc(&dd);
        let reward = reward_diagram(&dd, &graph, &[(1, 1.0), (2, 4.0)]);
        graph.props_mut().insert(PropKey::reward("energy"), reward);

        let mut lumper = LumperDd::new(Bisimulation::Strong);
        lumper.require_valid_for(PropKey::reward("energy"));
        let quotient = lumper.lump(&graph).unwrap();

        assert_eq!(quotient.num_blocks(), 4);
        assert_ne!(
            block_of(&quotient, &dd, &graph, 1),
            block_of(&quotient, &dd, &graph, 2)
        );
    }

    #[test]
    fn test_weak_ctmc_ignores_own_block_rates() {
        let dd = Mtdd::default();
        let mut builder = GraphDdBuilder::new(&dd, Semantics::Ctmc, 2, 0);
        builder
            .add_edge(0, 0, 1, 5.0)
            .add_edge(0, 0, 2, 3.0)
            .add_edge(1, 0, 0, 8.0)
            .add_edge(1, 0, 2, 3.0)
            .set_prop(PropKey::label("done"), &[2]);
        let graph = builder.build();

        let mut strong = LumperDd::new(Bisimulation::Strong);
        strong.require_valid_for(PropKey::label("done"));
        let strong_quotient = strong.lump(&graph).unwrap();
        assert_eq!(strong_quotient.num_blocks(), 3);

        let mut weak = LumperDd::new(Bisimulation::Weak);
        weak.require_valid_for(PropKey::label("done"));
        assert!(weak.can_lump(&graph));
        let weak_quotient = weak.lump(&graph).unwrap();
        assert_eq!(weak_quotient.num_blocks(), 2);
        assert_eq!(
            block_of(&weak_quotient, &dd, &graph, 0),
            block_of(&weak_quotient, &dd, &graph, 1)
        );
    }

    #[test]
    fn test_weak_rejects_mdp() {
        let dd = Mtdd::default();
        let builder = GraphDdBuilder::new(&dd, Semantics::Mdp, 2, 1);
        let graph = builder.build();
        let lumper = LumperDd::new(Bisimulation::Weak);
        assert!(!lumper.can_lump(&graph));
    }

    #[test]
    fn test_missing_property_errors() {
        let dd = Mtdd::default();
        let graph = diamond_dtmc(&dd);
        let mut lumper = LumperDd::new(Bisimulation::Strong);
        lumper.require_valid_for(PropKey::label("missing"));
        let err = lumper.lump(&graph).unwrap_err();
        assert!(matches!(err, Error::UnknownProperty(name) if name == "missing"));
    }

    #[test]
    fn test_no_seed_properties_lumps_by_behavior() {
        let dd = Mtdd::default();
        // Two states that only loop on themselves with the same probability
        // collapse into one block without any seed property.
        let mut builder = GraphDdBuilder::new(&dd, Semantics::Dtmc, 1, 0);
        builder.add_edge(0, 0, 0, 1.0).add_edge(1, 0, 1, 1.0);
        let graph = builder.build();

        let mut lumper = LumperDd::new(Bisimulation::Strong);
        let quotient = lumper.lump(&graph).unwrap();
        assert_eq!(quotient.num_blocks(), 1);
    }

    #[test]
    #[should_panic(expected = "Already lumped")]
    fn test_lump_twice_panics() {
        let dd = Mtdd::default();
        let graph = diamond_dtmc(&dd);
        let mut lumper = LumperDd::new(Bisimulation::Strong);
        lumper.require_valid_for(PropKey::label("goal"));
        lumper.lump(&graph).unwrap();
        let _ = lumper.lump(&graph);
    }

    #[test]
    fn test_require_valid_for_repeatable() {
        let mut lumper = LumperDd::new(Bisimulation::Strong);
        lumper.require_valid_for(PropKey::label("goal"));
        lumper.require_valid_for(PropKey::label("goal"));
        assert_eq!(lumper.valid_for.len(), 1);
    }

    #[test]
    fn test_mdp_actions_stay_separate() {
        let dd = Mtdd::default();
        // State 0 reaches the target only under action 1; state 1 under
        // action 0. With per-action signatures they end up in different
        // blocks.
        let mut builder = GraphDdBuilder::new(&dd, Semantics::Mdp, 2, 1);
        builder
            .add_edge(0, 0, 3, 1.0)
            .add_edge(0, 1, 2, 1.0)
            .add_edge(1, 0, 2, 1.0)
            .add_edge(1, 1, 3, 1.0)
            .add_edge(2, 0, 2, 1.0)
            .add_edge(2, 1, 2, 1.0)
            .add_edge(3, 0, 3, 1.0)
            .add_edge(3, 1, 3, 1.0)
            .set_prop(PropKey::label("goal"), &[2]);
        let graph = builder.build();

        let mut lumper = LumperDd::new(Bisimulation::Strong);
        lumper.require_valid_for(PropKey::label("goal"));
        let quotient = lumper.lump(&graph).unwrap();
        assert_ne!(
            block_of(&quotient, &dd, &graph, 0),
            block_of(&quotient, &dd, &graph, 1)
        );
    }

    #[test]
    fn test_relumping_stable_partition_is_idempotent() {
        let dd = Mtdd::default();
        let graph = diamond_dtmc(&dd);

        let mut first = LumperDd::new(Bisimulation::Strong);
        first.require_valid_for(PropKey::label("goal"));
        let first_quotient = first.lump(&graph).unwrap();

        let mut second = LumperDd::new(Bisimulation::Strong);
        second.require_valid_for(PropKey::label("goal"));
        let second_quotient = second.lump(&graph).unwrap();
        assert_eq!(first_quotient.num_blocks(), second_quotient.num_blocks());
        for state in 0..4 {
            assert_eq!(
                block_of(&first_quotient, &dd, &graph, state),
                block_of(&second_quotient, &dd, &graph, state)
            );
        }
    }
}
