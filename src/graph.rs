//! Explicit transition systems in compressed sparse row form.
//!
//! A [`Graph`] holds the successor lists and edge weights of a probabilistic
//! transition system. Markov chains (discrete or continuous time) use one
//! node per state with probability/rate weights on the edges. Markov decision
//! processes are bipartite: a *decision* node per state whose unweighted
//! successors are distribution nodes, and a distribution node per available
//! action carrying the weighted probabilistic successors.

use std::cell::OnceCell;

use log::debug;

use crate::bitset::BitSet;
use crate::props::Props;

/// Time model of a transition system.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Semantics {
    /// Discrete-time Markov chain: edge weights are probabilities.
    Dtmc,
    /// Continuous-time Markov chain: edge weights are rates.
    Ctmc,
    /// Markov decision process: bipartite decision/distribution structure.
    Mdp,
}

impl Semantics {
    /// Whether the model has nondeterministic choice.
    pub fn is_nondet(self) -> bool {
        matches!(self, Semantics::Mdp)
    }
}

/// Predecessor index of a graph, in compressed sparse row form.
#[derive(Debug)]
pub struct PredIndex {
    pred_from: Vec<usize>,
    pred: Vec<usize>,
}

impl PredIndex {
    fn build(graph: &Graph) -> Self {
        let num_nodes = graph.num_nodes();
        debug!("Building predecessor index for {} nodes", num_nodes);

        // Counting sort over incoming edges.
        let mut pred_from = vec![0usize; num_nodes + 1];
        for target in &graph.succ {
            pred_from[target + 1] += 1;
        }
        for i in 0..num_nodes {
            pred_from[i + 1] += pred_from[i];
        }

        let mut fill = pred_from.clone();
        let mut pred = vec![0usize; graph.succ.len()];
        for node in 0..num_nodes {
            for i in 0..graph.num_successors(node) {
                let target = graph.successor(node, i);
                pred[fill[target]] = node;
                fill[target] += 1;
            }
        }

        Self { pred_from, pred }
    }

    /// Predecessors of a node. A node with parallel edges from the same
    /// source appears once per edge.
    pub fn predecessors(&self, node: usize) -> &[usize] {
        &self.pred[self.pred_from[node]..self.pred_from[node + 1]]
    }
}

pub struct Graph {
    semantics: Semantics,
    /// CSR offsets: successors of node `u` live at `succ_from[u]..succ_from[u+1]`.
    succ_from: Vec<usize>,
    succ: Vec<usize>,
    weights: Vec<f64>,
    /// Decision nodes of a nondeterministic model (empty otherwise).
    decision: BitSet,
    props: Props,
    pred_index: OnceCell<PredIndex>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("semantics", &self.semantics)
            .field("num_nodes", &self.num_nodes())
            .field("num_edges", &self.succ.len())
            .finish()
    }
}

impl Graph {
    pub fn semantics(&self) -> Semantics {
        self.semantics
    }

    pub fn num_nodes(&self) -> usize {
        self.succ_from.len() - 1
    }

    pub fn num_edges(&self) -> usize {
        self.succ.len()
    }

    pub fn num_successors(&self, node: usize) -> usize {
        self.succ_from[node + 1] - self.succ_from[node]
    }

    pub fn successor(&self, node: usize, i: usize) -> usize {
        assert!(i < self.num_successors(node));
        self.succ[self.succ_from[node] + i]
    }

    /// Weight of the `i`-th outgoing edge. Edges out of decision nodes carry
    /// weight 1.
    pub fn weight(&self, node: usize, i: usize) -> f64 {
        assert!(i < self.num_successors(node));
        self.weights[self.succ_from[node] + i]
    }

    pub fn successors(&self, node: usize) -> &[usize] {
        &self.succ[self.succ_from[node]..self.succ_from[node + 1]]
    }

    pub fn is_decision(&self, node: usize) -> bool {
        self.decision.contains(node)
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn props_mut(&mut self) -> &mut Props {
        &mut self.props
    }

    /// Predecessor index, built on first use and cached.
    pub fn predecessors(&self) -> &PredIndex {
        self.pred_index.get_or_init(|| PredIndex::build(self))
    }
}

/// Builder for [`Graph`]. Nodes are added implicitly by the edges; the node
/// count is the largest mentioned index plus one (or an explicit reserve).
#[derive(Debug, Default)]
pub struct GraphBuilder {
    semantics: Option<Semantics>,
    edges: Vec<(usize, usize, f64)>,
    decision: BitSet,
    num_nodes: usize,
    props: Props,
}

impl GraphBuilder {
    pub fn new(semantics: Semantics) -> Self {
        Self {
            semantics: Some(semantics),
            ..Default::default()
        }
    }

    /// Make sure the graph has at least `n` nodes.
    pub fn reserve_nodes(&mut self, n: usize) -> &mut Self {
        self.num_nodes = self.num_nodes.max(n);
        self
    }

    pub fn add_edge(&mut self, from: usize, to: usize, weight: f64) -> &mut Self {
        self.num_nodes = self.num_nodes.max(from + 1).max(to + 1);
        self.edges.push((from, to, weight));
        self
    }

    /// Mark a node as a decision node of a nondeterministic model.
    pub fn mark_decision(&mut self, node: usize) -> &mut Self {
        self.num_nodes = self.num_nodes.max(node + 1);
        self.decision.insert(node);
        self
    }

    pub fn props_mut(&mut self) -> &mut Props {
        &mut self.props
    }

    pub fn build(self) -> Graph {
        let semantics = self.semantics.unwrap_or(Semantics::Dtmc);
        assert!(
            semantics.is_nondet() || self.decision.is_empty(),
            "Decision nodes require nondeterministic semantics"
        );

        // Counting sort into CSR, preserving the insertion order of each
        // node's edges (the order defines the successor ordinals).
        let mut succ_from = vec![0usize; self.num_nodes + 1];
        for &(from, _, _) in &self.edges {
            succ_from[from + 1] += 1;
        }
        for i in 0..self.num_nodes {
            succ_from[i + 1] += succ_from[i];
        }

        let mut fill = succ_from.clone();
        let mut succ = vec![0usize; self.edges.len()];
        let mut weights = vec![0f64; self.edges.len()];
        for &(from, to, weight) in &self.edges {
            succ[fill[from]] = to;
            weights[fill[from]] = weight;
            fill[from] += 1;
        }

        Graph {
            semantics,
            succ_from,
            succ,
            weights,
            decision: self.decision,
            props: self.props,
            pred_index: OnceCell::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn chain() -> Graph {
        // 0 -> 1 (0.5), 0 -> 2 (0.5), 1 -> 2 (1.0), 2 -> 2 (1.0)
        let mut builder = GraphBuilder::new(Semantics::Dtmc);
        builder
            .add_edge(0, 1, 0.5)
            .add_edge(0, 2, 0.5)
            .add_edge(1, 2, 1.0)
            .add_edge(2, 2, 1.0);
        builder.build()
    }

    #[test]
    fn test_csr_layout() {
        let graph = chain();
        assert_eq!(graph.num_nodes(), 3);
        assert_eq!(graph.num_edges(), 4);
        assert_eq!(graph.num_successors(0), 2);
        assert_eq!(graph.successor(0, 0), 1);
        assert_eq!(graph.successor(0, 1), 2);
        assert_eq!(graph.weight(0, 0), 0.5);
        assert_eq!(graph.successors(2), &[2]);
    }

    #[test]
    fn test_predecessors() {
        let graph = chain();
        let pred = graph.predecessors();
        assert_eq!(pred.predecessors(0), &[] as &[usize]);
        assert_eq!(pred.predecessors(1), &[0]);
        let mut p2: Vec<usize> = pred.predecessors(2).to_vec();
        p2.sort_unstable();
        assert_eq!(p2, vec![0, 1, 2]);
    }

    #[test]
    fn test_decision_nodes() {
        let mut builder = GraphBuilder::new(Semantics::Mdp);
        // Decision node 0 with two distribution nodes 1, 2.
        builder
            .mark_decision(0)
            .add_edge(0, 1, 1.0)
            .add_edge(0, 2, 1.0)
            .add_edge(1, 3, 1.0)
            .add_edge(2, 3, 0.5)
            .add_edge(2, 4, 0.5)
            .add_edge(3, 3, 1.0)
            .add_edge(4, 4, 1.0)
            .mark_decision(3)
            .mark_decision(4);
        let graph = builder.build();
        assert!(graph.is_decision(0));
        assert!(!graph.is_decision(1));
        assert!(graph.semantics().is_nondet());
    }

    #[test]
    #[should_panic(expected = "Decision nodes require nondeterministic semantics")]
    fn test_decision_requires_nondet() {
        let mut builder = GraphBuilder::new(Semantics::Dtmc);
        builder.mark_decision(0).add_edge(0, 0, 1.0);
        builder.build();
    }
}
