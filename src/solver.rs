//! Solver selection and the preparation pipeline.
//!
//! A [`Registry`] holds the candidate lumpers in a fixed order. Preparing an
//! objective first runs the reachability precomputation when it applies,
//! then offers the objective to each candidate in turn; the first accepting
//! lumper commits, so at most one lumper ever processes an objective. If no
//! candidate accepts, preparation fails with
//! [`Error::NoApplicableSolver`](crate::error::Error).

use log::debug;

use crate::error::Error;
use crate::graph::Graph;
use crate::graph_dd::GraphDd;
use crate::lump_dd::{LumperDd, QuotientDd};
use crate::lump_explicit::{LumperExplicit, Quotient};
use crate::objective::{Bisimulation, Objective};
use crate::props::PropKey;
use crate::reach::{ReachabilityPrecompute, ReachabilityResult};

/// Outcome of the preparation pipeline: the precomputation result (when the
/// objective admitted one) and the committed lumper's quotient. Downstream
/// numeric solvers run on `quotient.graph` and lift their answers back
/// through the quotient's correspondence maps.
#[derive(Debug)]
pub struct Prepared {
    pub reachability: Option<ReachabilityResult>,
    pub quotient: Quotient,
}

pub struct Registry {
    order: Vec<Bisimulation>,
}

impl Default for Registry {
    fn default() -> Self {
        // Weak first where it applies: it yields the coarser quotient.
        Self::with_order(vec![Bisimulation::Weak, Bisimulation::Strong])
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry trying the given bisimulations in order.
    pub fn with_order(order: Vec<Bisimulation>) -> Self {
        Self { order }
    }

    /// Run the preparation pipeline for an objective on a graph.
    pub fn prepare(&self, graph: &Graph, mut objective: Objective) -> Result<Prepared, Error> {
        let precompute = ReachabilityPrecompute::new();
        let reachability = precompute
            .can_handle(&objective)
            .then(|| precompute.process(graph, &mut objective));

        for &bisimulation in &self.order {
            let mut lumper = LumperExplicit::new(bisimulation);
            lumper.set_original(graph, objective.clone());
            if !lumper.can_lump() {
                continue;
            }
            debug!("Committing to {:?} lumping", bisimulation);
            let quotient = lumper.lump();
            return Ok(Prepared {
                reachability,
                quotient,
            });
        }
        Err(Error::NoApplicableSolver)
    }

    /// Symbolic counterpart of [`Registry::prepare`]: commit to the first
    /// bisimulation whose lumper accepts the graph. The quotient stays valid
    /// for the given properties.
    pub fn prepare_dd(
        &self,
        graph: &GraphDd<'_>,
        valid_for: &[PropKey],
    ) -> Result<QuotientDd, Error> {
        for &bisimulation in &self.order {
            let mut lumper = LumperDd::new(bisimulation);
            for key in valid_for {
                lumper.require_valid_for(key.clone());
            }
            if !lumper.can_lump(graph) {
                continue;
            }
            debug!("Committing to symbolic {:?} lumping", bisimulation);
            return lumper.lump(graph);
        }
        Err(Error::NoApplicableSolver)
    }
}
