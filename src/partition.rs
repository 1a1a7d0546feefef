//! Partitions of graph nodes into blocks.
//!
//! A partition is stored as a block-id array indexed by node. Block ids are
//! kept *dense*: after [`fill_gaps`], the ids in use are exactly `0..k` and
//! their relative order is preserved.

use log::trace;

use crate::bitset::BitSet;
use crate::error::Error;
use crate::graph::Graph;

/// One refinement pass of a lumping engine. The explicit and symbolic
/// engines plug their representation-specific pass into the shared
/// [`refine_to_fixpoint`] loop.
pub trait RefineStrategy {
    type Partition;

    /// Split the partition by one-step behavior. Returns the refined
    /// partition and its block count. The result must refine the input, so
    /// the block count never decreases.
    fn refine(&mut self, partition: &Self::Partition) -> (Self::Partition, usize);
}

/// Drive a refinement strategy until a full pass splits no block.
///
/// Since every pass refines its input, an unchanged block count means an
/// unchanged partition.
pub fn refine_to_fixpoint<S: RefineStrategy>(
    strategy: &mut S,
    mut partition: S::Partition,
    mut num_blocks: usize,
) -> (S::Partition, usize) {
    loop {
        let (refined, k) = strategy.refine(&partition);
        trace!("Refined {} -> {} blocks", num_blocks, k);
        assert!(k >= num_blocks, "Refinement must not merge blocks");
        let stable = k == num_blocks;
        partition = refined;
        num_blocks = k;
        if stable {
            return (partition, num_blocks);
        }
    }
}

/// Compact the block ids in `blocks` to `0..k`, preserving their relative
/// order. Returns `k`, the number of distinct blocks.
pub fn fill_gaps(blocks: &mut [usize]) -> usize {
    let used: BitSet = blocks.iter().copied().collect();

    // Ascending iteration gives each used id its rank.
    let mut rank = vec![0usize; used.iter().last().map_or(0, |max| max + 1)];
    let mut k = 0;
    for id in used.iter() {
        rank[id] = k;
        k += 1;
    }

    for block in blocks.iter_mut() {
        *block = rank[*block];
    }
    k
}

/// Build the coarsest partition refining a set of named node predicates: two
/// nodes share a block iff they agree on every predicate.
///
/// A failing predicate aborts the construction; no partial partition is
/// returned.
pub fn atomic_partition<F>(
    graph: &Graph,
    predicates: &[(&str, F)],
) -> Result<Vec<usize>, Error>
where
    F: Fn(&Graph, usize) -> Result<bool, String>,
{
    assert!(
        predicates.len() < usize::BITS as usize,
        "Too many predicates"
    );

    let mut blocks = vec![0usize; graph.num_nodes()];
    for (bit, (name, predicate)) in predicates.iter().enumerate() {
        for (node, block) in blocks.iter_mut().enumerate() {
            let holds =
                predicate(graph, node).map_err(|reason| Error::PredicateEval {
                    name: name.to_string(),
                    node,
                    reason,
                })?;
            if holds {
                *block |= 1 << bit;
            }
        }
    }

    fill_gaps(&mut blocks);
    Ok(blocks)
}

/// Group nodes by block: entry `b` of the result lists the members of block
/// `b` in ascending node order. Block ids must be dense.
pub fn blocks_of(blocks: &[usize], num_blocks: usize) -> Vec<Vec<usize>> {
    let mut members = vec![Vec::new(); num_blocks];
    for (node, &block) in blocks.iter().enumerate() {
        assert!(block < num_blocks, "Block id {} out of range", block);
        members[block].push(node);
    }
    members
}
