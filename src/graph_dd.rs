//! Symbolic transition systems over decision diagrams.
//!
//! A [`GraphDd`] represents a probabilistic transition system as a weight
//! diagram over present-state, action, and next-state boolean variables,
//! together with a 0/1 state-space diagram over the present-state variables.
//! Action variables are only populated for nondeterministic models.
//!
//! The variable order is: present-state variables lowest, then next-state,
//! then action variables. Fresh variables for engine-internal encodings
//! (leaf codes, block indices) are allocated above all of them.

use std::cell::Cell;
use std::collections::HashMap;

use num_bigint::BigUint;

use crate::graph::Semantics;
use crate::mtbdd::{Mtdd, Op, Ref};
use crate::props::DdProps;

pub struct GraphDd<'a> {
    dd: &'a Mtdd,
    semantics: Semantics,
    pres_vars: Vec<u32>,
    next_vars: Vec<u32>,
    action_vars: Vec<u32>,
    /// Weight diagram over (pres, next, action).
    trans: Ref,
    /// 0/1 diagram of the reachable state space, over pres.
    space: Ref,
    props: DdProps,
    next_fresh: Cell<u32>,
}

impl std::fmt::Debug for GraphDd<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphDd")
            .field("semantics", &self.semantics)
            .field("state_bits", &self.pres_vars.len())
            .field("action_bits", &self.action_vars.len())
            .finish()
    }
}

impl<'a> GraphDd<'a> {
    pub fn dd(&self) -> &'a Mtdd {
        self.dd
    }

    pub fn semantics(&self) -> Semantics {
        self.semantics
    }

    pub fn pres_vars(&self) -> &[u32] {
        &self.pres_vars
    }

    pub fn next_vars(&self) -> &[u32] {
        &self.next_vars
    }

    pub fn action_vars(&self) -> &[u32] {
        &self.action_vars
    }

    pub fn trans(&self) -> Ref {
        self.trans
    }

    pub fn space(&self) -> Ref {
        self.space
    }

    pub fn props(&self) -> &DdProps {
        &self.props
    }

    pub fn props_mut(&mut self) -> &mut DdProps {
        &mut self.props
    }

    /// Allocate a fresh variable above every variable handed out so far.
    pub fn fresh_var(&self) -> u32 {
        let v = self.next_fresh.get();
        self.next_fresh.set(v + 1);
        v
    }

    /// Renaming of present-state to next-state variables.
    pub fn pres_to_next(&self) -> HashMap<u32, u32> {
        self.pres_vars
            .iter()
            .zip(&self.next_vars)
            .map(|(&p, &n)| (p, n))
            .collect()
    }

    pub fn next_to_pres(&self) -> HashMap<u32, u32> {
        self.pres_vars
            .iter()
            .zip(&self.next_vars)
            .map(|(&p, &n)| (n, p))
            .collect()
    }

    /// Number of states in the state space.
    pub fn num_states(&self) -> BigUint {
        self.dd.sat_count(self.space, &self.pres_vars)
    }
}

/// Builder for [`GraphDd`], adding one weighted edge at a time. States and
/// actions are plain indices encoded in binary over the respective variable
/// vectors.
pub struct GraphDdBuilder<'a> {
    dd: &'a Mtdd,
    semantics: Semantics,
    pres_vars: Vec<u32>,
    next_vars: Vec<u32>,
    action_vars: Vec<u32>,
    trans: Ref,
    space: Ref,
    props: DdProps,
    next_fresh: u32,
}

impl<'a> GraphDdBuilder<'a> {
    pub fn new(
        dd: &'a Mtdd,
        semantics: Semantics,
        state_bits: usize,
        action_bits: usize,
    ) -> Self {
        assert!(state_bits > 0, "At least one state bit is required");
        assert!(
            semantics.is_nondet() || action_bits == 0,
            "Action bits require nondeterministic semantics"
        );

        let mut next_var = 1u32;
        let mut alloc = |n: usize| -> Vec<u32> {
            let vars: Vec<u32> = (next_var..next_var + n as u32).collect();
            next_var += n as u32;
            vars
        };
        let pres_vars = alloc(state_bits);
        let next_vars = alloc(state_bits);
        let action_vars = alloc(action_bits);

        Self {
            dd,
            semantics,
            pres_vars,
            next_vars,
            action_vars,
            trans: dd.zero,
            space: dd.zero,
            props: DdProps::new(),
            next_fresh: next_var,
        }
    }

    /// Add `state` to the state space.
    pub fn add_state(&mut self, state: usize) -> &mut Self {
        let cube = self.dd.index_cube(&self.pres_vars, state);
        self.space = self.dd.apply(Op::Max, self.space, cube);
        self
    }

    /// Add a weighted edge. `action` must be 0 for deterministic semantics.
    pub fn add_edge(
        &mut self,
        source: usize,
        action: usize,
        target: usize,
        weight: f64,
    ) -> &mut Self {
        assert!(
            self.semantics.is_nondet() || action == 0,
            "Actions require nondeterministic semantics"
        );
        self.add_state(source);
        self.add_state(target);

        let mut cube = self.dd.apply(
            Op::Mul,
            self.dd.index_cube(&self.pres_vars, source),
            self.dd.index_cube(&self.next_vars, target),
        );
        if !self.action_vars.is_empty() {
            cube = self
                .dd
                .apply(Op::Mul, cube, self.dd.index_cube(&self.action_vars, action));
        }
        let weighted = self.dd.apply(Op::Mul, cube, self.dd.constant(weight));
        self.trans = self.dd.apply(Op::Add, self.trans, weighted);
        self
    }

    /// Attach a property as the union of the given states' cubes.
    pub fn set_prop(&mut self, key: crate::props::PropKey, states: &[usize]) -> &mut Self {
        let mut prop = self.dd.zero;
        for &state in states {
            let cube = self.dd.index_cube(&self.pres_vars, state);
            prop = self.dd.apply(Op::Max, prop, cube);
        }
        self.props.insert(key, prop);
        self
    }

    pub fn build(self) -> GraphDd<'a> {
        GraphDd {
            dd: self.dd,
            semantics: self.semantics,
            pres_vars: self.pres_vars,
            next_vars: self.next_vars,
            action_vars: self.action_vars,
            trans: self.trans,
            space: self.space,
            props: self.props,
            next_fresh: Cell::new(self.next_fresh),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::props::PropKey;

    fn eval_edge(graph: &GraphDd<'_>, source: usize, target: usize) -> f64 {
        let dd = graph.dd();
        let mut assignment = HashMap::new();
        for (j, &v) in graph.pres_vars().iter().enumerate() {
            assignment.insert(v, (source >> j) & 1 != 0);
        }
        for (j, &v) in graph.next_vars().iter().enumerate() {
            assignment.insert(v, (target >> j) & 1 != 0);
        }
        dd.eval(graph.trans(), &assignment)
    }

    #[test]
    fn test_build_dtmc() {
        let dd = Mtdd::default();
        let mut builder = GraphDdBuilder::new(&dd, Semantics::Dtmc, 2, 0);
        builder
            .add_edge(0, 0, 1, 0.5)
            .add_edge(0, 0, 2, 0.5)
            .add_edge(1, 0, 3, 1.0)
            .add_edge(2, 0, 3, 1.0)
            .add_edge(3, 0, 3, 1.0);
        let graph = builder.build();

        assert_eq!(eval_edge(&graph, 0, 1), 0.5);
        assert_eq!(eval_edge(&graph, 0, 2), 0.5);
        assert_eq!(eval_edge(&graph, 1, 3), 1.0);
        assert_eq!(eval_edge(&graph, 0, 3), 0.0);
        assert_eq!(graph.num_states(), BigUint::from(4u32));
    }

    #[test]
    fn test_fresh_vars_above_all() {
        let dd = Mtdd::default();
        let builder = GraphDdBuilder::new(&dd, Semantics::Mdp, 3, 2);
        let graph = builder.build();
        let top = *graph.action_vars().last().unwrap();
        assert!(graph.fresh_var() > top);
        assert_eq!(graph.fresh_var(), top + 2);
    }

    #[test]
    fn test_props() {
        let dd = Mtdd::default();
        let mut builder = GraphDdBuilder::new(&dd, Semantics::Dtmc, 2, 0);
        builder.add_edge(0, 0, 1, 1.0).add_edge(1, 0, 1, 1.0);
        builder.set_prop(PropKey::label("goal"), &[1]);
        let graph = builder.build();

        let prop = graph.props().get(&PropKey::label("goal")).unwrap();
        let cube1 = dd.index_cube(graph.pres_vars(), 1);
        assert_eq!(prop, cube1);
    }

    #[test]
    #[should_panic(expected = "Actions require nondeterministic semantics")]
    fn test_action_on_dtmc_panics() {
        let dd = Mtdd::default();
        let mut builder = GraphDdBuilder::new(&dd, Semantics::Dtmc, 1, 0);
        builder.add_edge(0, 1, 1, 1.0);
    }
}
