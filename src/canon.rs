//! Canonicalization of weight diagrams into boolean relations.
//!
//! Symbolic signature refinement needs to compare transition *weights*
//! symbolically. To do that, the distinct leaf values of the transition
//! diagram are collected, merged up to a relative tolerance, and assigned
//! dense integer codes; the diagram is then rebuilt as a 0/1 relation with
//! the code of each edge's weight spelled out in binary over fresh *index*
//! variables. Two weight diagrams are then equal iff their canonical
//! relations are the same diagram.

use std::collections::HashMap;

use log::debug;

use crate::mtbdd::{Mtdd, Ref};

/// Default relative tolerance for merging nearly-equal weights.
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

/// A canonicalized weight diagram.
#[derive(Debug, Clone)]
pub struct CanonicalTrans {
    /// 0/1 relation: 1 exactly where the original diagram has a non-zero
    /// weight whose code matches the index-variable assignment.
    pub relation: Ref,
    /// Index variables carrying the weight code, least significant first.
    pub index_vars: Vec<u32>,
    /// Representative weight of each code.
    pub leaves: Vec<f64>,
}

pub struct Canonicalizer {
    tolerance: f64,
    cache: HashMap<Ref, CanonicalTrans>,
    /// Index variables allocated so far, reused across calls.
    index_vars: Vec<u32>,
}

impl Canonicalizer {
    pub fn new(tolerance: f64) -> Self {
        assert!(tolerance >= 0.0);
        Self {
            tolerance,
            cache: HashMap::new(),
            index_vars: Vec::new(),
        }
    }

    /// Canonicalize `trans`, allocating fresh index variables through
    /// `fresh` as needed. Results are cached per diagram.
    pub fn canonicalize(
        &mut self,
        dd: &Mtdd,
        trans: Ref,
        fresh: &mut dyn FnMut() -> u32,
    ) -> CanonicalTrans {
        if let Some(canonical) = self.cache.get(&trans) {
            return canonical.clone();
        }

        // Distinct non-zero weights, clustered up to the tolerance. Values
        // come out sorted, so clustering is a single sweep.
        let mut leaves: Vec<f64> = Vec::new();
        let mut code_of: HashMap<u64, usize> = HashMap::new();
        for value in dd.collect_values(trans) {
            if value == 0.0 {
                continue;
            }
            let mergeable = leaves
                .last()
                .is_some_and(|&rep| (value - rep).abs() <= self.tolerance * value.abs().max(rep.abs()));
            if !mergeable {
                leaves.push(value);
            }
            code_of.insert(value.to_bits(), leaves.len() - 1);
        }

        let bits = usize::BITS as usize - leaves.len().saturating_sub(1).leading_zeros() as usize;
        let bits = bits.max(1);
        while self.index_vars.len() < bits {
            self.index_vars.push(fresh());
        }
        let index_vars = self.index_vars[..bits].to_vec();
        debug!(
            "Canonicalizing {} distinct weights into {} index bits",
            leaves.len(),
            bits
        );

        let mut memo = HashMap::new();
        let relation = self.rebuild(dd, trans, &index_vars, &code_of, &mut memo);

        let canonical = CanonicalTrans {
            relation,
            index_vars,
            leaves,
        };
        self.cache.insert(trans, canonical.clone());
        canonical
    }

    /// Replace each non-zero leaf by the cube of its code. Index variables
    /// sit above every diagram variable, so the rebuild preserves the order.
    fn rebuild(
        &self,
        dd: &Mtdd,
        f: Ref,
        index_vars: &[u32],
        code_of: &HashMap<u64, usize>,
        memo: &mut HashMap<Ref, Ref>,
    ) -> Ref {
        if dd.is_terminal(f) {
            let value = dd.value(f);
            if value == 0.0 {
                return dd.zero;
            }
            let code = code_of[&value.to_bits()];
            return dd.index_cube(index_vars, code);
        }
        if let Some(&res) = memo.get(&f) {
            return res;
        }
        let low = self.rebuild(dd, dd.low(f), index_vars, code_of, memo);
        let high = self.rebuild(dd, dd.high(f), index_vars, code_of, memo);
        let res = dd.mk_node(dd.var_of(f), low, high);
        memo.insert(f, res);
        res
    }
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::mtbdd::Op;

    #[test]
    fn test_codes_assigned_ascending() {
        let dd = Mtdd::default();
        // f = x1 ? 0.7 : (x2 ? 0.3 : 0)
        let inner = dd.ite(dd.var_bool(2), dd.constant(0.3), dd.zero);
        let f = dd.ite(dd.var_bool(1), dd.constant(0.7), inner);

        let mut next = 10u32;
        let mut fresh = || {
            next += 1;
            next - 1
        };
        let canonical = Canonicalizer::default().canonicalize(&dd, f, &mut fresh);

        assert_eq!(canonical.leaves, vec![0.3, 0.7]);
        assert_eq!(canonical.index_vars, vec![10]);

        let assignment = |x1: bool, x2: bool, idx: bool| {
            HashMap::from([(1, x1), (2, x2), (10, idx)])
        };
        // 0.3 has code 0, 0.7 has code 1.
        assert_eq!(dd.eval(canonical.relation, &assignment(false, true, false)), 1.0);
        assert_eq!(dd.eval(canonical.relation, &assignment(false, true, true)), 0.0);
        assert_eq!(dd.eval(canonical.relation, &assignment(true, false, true)), 1.0);
        assert_eq!(dd.eval(canonical.relation, &assignment(true, false, false)), 0.0);
        // Zero edges stay zero under every code.
        assert_eq!(dd.eval(canonical.relation, &assignment(false, false, false)), 0.0);
        assert_eq!(dd.eval(canonical.relation, &assignment(false, false, true)), 0.0);
    }

    #[test]
    fn test_tolerance_merges_nearby_weights() {
        let dd = Mtdd::default();
        let a = dd.constant(0.5);
        let b = dd.constant(0.5 * (1.0 + 1e-12));
        let f = dd.ite(dd.var_bool(1), a, b);

        let mut next = 10u32;
        let mut fresh = || {
            next += 1;
            next - 1
        };
        let canonical = Canonicalizer::default().canonicalize(&dd, f, &mut fresh);
        assert_eq!(canonical.leaves.len(), 1);
        // Both branches get the same code, so the relation no longer
        // depends on x1.
        assert_eq!(canonical.relation, dd.index_cube(&canonical.index_vars, 0));
    }

    #[test]
    fn test_cache_reuse() {
        let dd = Mtdd::default();
        let f = dd.ite(dd.var_bool(1), dd.constant(0.25), dd.zero);

        let mut allocations = 0;
        let mut next = 10u32;
        let mut fresh = || {
            allocations += 1;
            next += 1;
            next - 1
        };
        let mut canonicalizer = Canonicalizer::default();
        let first = canonicalizer.canonicalize(&dd, f, &mut fresh);
        let second = canonicalizer.canonicalize(&dd, f, &mut fresh);
        assert_eq!(first.relation, second.relation);
        assert_eq!(allocations, 1);
    }
}
