//! Error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A block predicate could not be evaluated on some node while building
    /// the initial partition.
    #[error("predicate '{name}' failed on node {node}: {reason}")]
    PredicateEval {
        name: String,
        node: usize,
        reason: String,
    },

    /// A property key was requested that the graph does not carry.
    #[error("unknown graph property: {0}")]
    UnknownProperty(String),

    /// No registered engine accepted the objective.
    #[error("no applicable solver for the given objective")]
    NoApplicableSolver,
}
