//! # lump-rs
//!
//! Bisimulation-based state-space reduction ("lumping") for probabilistic
//! transition systems, over two interchangeable representations:
//!
//! - **Explicit**: an enumerated graph in compressed sparse row form
//!   ([`graph::Graph`]), lumped by [`lump_explicit::LumperExplicit`].
//! - **Symbolic**: a multi-terminal decision diagram ([`mtbdd::Mtdd`])
//!   encoding the transition weights ([`graph_dd::GraphDd`]), lumped by
//!   [`lump_dd::LumperDd`] after canonicalizing the weights
//!   ([`canon::Canonicalizer`]).
//!
//! Both lumpers refine a seed partition with the same signature-based
//! fixpoint loop ([`partition::refine_to_fixpoint`]) and produce a quotient
//! graph plus original↔quotient correspondence maps. For reachability
//! objectives, [`reach::ReachabilityPrecompute`] first extends the target by
//! backward closure and, on nondeterministic models, reconstructs a
//! witnessing memoryless scheduler. [`solver::Registry`] wires the pipeline
//! together: precompute, then commit to the first applicable lumper.
//!
//! # Example
//!
//! ```
//! use lump_rs::bitset::BitSet;
//! use lump_rs::graph::{GraphBuilder, Semantics};
//! use lump_rs::objective::Objective;
//! use lump_rs::solver::Registry;
//!
//! // 0 branches to the symmetric states 1 and 2, which both reach 3.
//! let mut builder = GraphBuilder::new(Semantics::Dtmc);
//! builder
//!     .add_edge(0, 1, 0.5)
//!     .add_edge(0, 2, 0.5)
//!     .add_edge(1, 3, 1.0)
//!     .add_edge(2, 3, 1.0)
//!     .add_edge(3, 3, 1.0);
//! let graph = builder.build();
//!
//! let target: BitSet = [3].into_iter().collect();
//! let prepared = Registry::new()
//!     .prepare(&graph, Objective::unbounded_reachability(target))
//!     .unwrap();
//! assert_eq!(prepared.quotient.graph.num_nodes(), 3);
//! assert_eq!(
//!     prepared.quotient.from_original[1],
//!     prepared.quotient.from_original[2]
//! );
//! ```

pub mod bitset;
pub mod cache;
pub mod canon;
pub mod error;
pub mod graph;
pub mod graph_dd;
pub mod lump_dd;
pub mod lump_explicit;
pub mod mtbdd;
pub mod objective;
pub mod partition;
pub mod props;
pub mod reach;
pub mod solver;
pub mod table;
pub mod utils;
