//! Manager-centric multi-terminal decision diagrams.
//!
//! An [`Mtdd`] stores hash-consed nodes over ordered boolean variables with
//! real-valued terminals, which is the symbolic representation used for
//! probabilistic transition functions: a diagram maps each variable
//! assignment (present-state, action, next-state bits) to an edge weight.
//! Boolean predicates and relations are the special case where every terminal
//! is 0 or 1.
//!
//! All operations go through the manager, which guarantees structural sharing:
//! two diagrams represent the same function iff their [`Ref`]s are equal.
//! Nodes live until [`Mtdd::collect_garbage`] is called with the roots that
//! must survive.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::{self, Debug, Display};

use log::debug;
use num_bigint::BigUint;

use crate::cache::Cache;
use crate::table::Table;
use crate::utils::{pairing3, MyHash};

/// Handle to a node owned by an [`Mtdd`] manager.
///
/// Handles are plain indices: cheap to copy, valid for the lifetime of the
/// manager (until a garbage collection drops the node).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Ref(u32);

impl Ref {
    pub(crate) const fn new(index: u32) -> Self {
        Ref(index)
    }

    /// Index of the referenced node in the manager's table.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Variable index 0 is reserved for terminal nodes.
const TERMINAL: u32 = 0;

/// A diagram node. For terminals (`var == 0`), `low` holds the index into the
/// leaf-value table and `high` is unused.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Node {
    var: u32,
    low: Ref,
    high: Ref,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            var: TERMINAL,
            low: Ref(0),
            high: Ref(0),
        }
    }
}

impl MyHash for Node {
    fn hash(&self) -> u64 {
        pairing3(self.var as u64, self.low.0 as u64, self.high.0 as u64)
    }
}

/// Pointwise binary operation on terminal values.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Op {
    Add,
    Mul,
    Max,
    Min,
}

impl Op {
    fn eval(self, a: f64, b: f64) -> f64 {
        match self {
            Op::Add => a + b,
            Op::Mul => a * b,
            Op::Max => a.max(b),
            Op::Min => a.min(b),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
enum OpKey {
    Apply(Op, Ref, Ref),
    Ite(Ref, Ref, Ref),
}

impl MyHash for OpKey {
    fn hash(&self) -> u64 {
        match *self {
            OpKey::Apply(op, a, b) => {
                let tag = match op {
                    Op::Add => 1,
                    Op::Mul => 2,
                    Op::Max => 3,
                    Op::Min => 4,
                };
                pairing3(tag, a.0 as u64, b.0 as u64)
            }
            OpKey::Ite(c, t, e) => pairing3(pairing3(5, c.0 as u64, 0), t.0 as u64, e.0 as u64),
        }
    }
}

pub struct Mtdd {
    table: RefCell<Table<Node>>,
    cache: RefCell<Cache<OpKey, Ref>>,
    leaves: RefCell<Vec<f64>>,
    leaf_ids: RefCell<HashMap<u64, u32>>,
    /// The constant-0 diagram (also boolean "false").
    pub zero: Ref,
    /// The constant-1 diagram (also boolean "true").
    pub one: Ref,
}

impl Default for Mtdd {
    fn default() -> Self {
        Mtdd::new(20)
    }
}

impl Debug for Mtdd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.borrow();
        f.debug_struct("Mtdd")
            .field("capacity", &table.capacity())
            .field("size", &table.real_size())
            .field("leaves", &self.leaves.borrow().len())
            .finish()
    }
}

impl Mtdd {
    /// Create a manager with room for `2^storage_bits` nodes.
    pub fn new(storage_bits: usize) -> Self {
        assert!(
            storage_bits <= 31,
            "Storage bits should be in the range 0..=31"
        );

        let cache_bits = storage_bits.min(16);
        let mut table = Table::new(storage_bits);

        // Allocate the two distinguished terminals first.
        let zero = Ref(table.put(Node {
            var: TERMINAL,
            low: Ref(0),
            high: Ref(0),
        }) as u32);
        let one = Ref(table.put(Node {
            var: TERMINAL,
            low: Ref(1),
            high: Ref(0),
        }) as u32);

        let leaves = vec![0.0, 1.0];
        let mut leaf_ids = HashMap::new();
        leaf_ids.insert(0.0f64.to_bits(), 0u32);
        leaf_ids.insert(1.0f64.to_bits(), 1u32);

        Self {
            table: RefCell::new(table),
            cache: RefCell::new(Cache::new(cache_bits)),
            leaves: RefCell::new(leaves),
            leaf_ids: RefCell::new(leaf_ids),
            zero,
            one,
        }
    }

    /// Number of live nodes in the manager.
    pub fn num_nodes(&self) -> usize {
        self.table.borrow().real_size()
    }

    fn node(&self, f: Ref) -> Node {
        *self.table.borrow().value(f.index())
    }

    /// Variable of the node, or 0 for terminals.
    pub fn var_of(&self, f: Ref) -> u32 {
        self.node(f).var
    }

    pub fn low(&self, f: Ref) -> Ref {
        let node = self.node(f);
        assert_ne!(node.var, TERMINAL, "Terminal has no low child");
        node.low
    }

    pub fn high(&self, f: Ref) -> Ref {
        let node = self.node(f);
        assert_ne!(node.var, TERMINAL, "Terminal has no high child");
        node.high
    }

    pub fn is_terminal(&self, f: Ref) -> bool {
        self.node(f).var == TERMINAL
    }

    pub fn is_zero(&self, f: Ref) -> bool {
        f == self.zero
    }

    pub fn is_one(&self, f: Ref) -> bool {
        f == self.one
    }

    /// Terminal value of the diagram. Fatal on non-terminals.
    pub fn value(&self, f: Ref) -> f64 {
        let node = self.node(f);
        assert_eq!(node.var, TERMINAL, "value() on a non-terminal node");
        self.leaves.borrow()[node.low.index()]
    }

    /// The constant diagram with the given terminal value.
    pub fn constant(&self, value: f64) -> Ref {
        assert!(!value.is_nan(), "NaN terminal");
        let value = if value == 0.0 { 0.0 } else { value }; // normalize -0.0

        let bits = value.to_bits();
        let leaf = {
            let mut leaf_ids = self.leaf_ids.borrow_mut();
            match leaf_ids.get(&bits) {
                Some(&id) => id,
                None => {
                    let mut leaves = self.leaves.borrow_mut();
                    let id = leaves.len() as u32;
                    leaves.push(value);
                    leaf_ids.insert(bits, id);
                    id
                }
            }
        };
        let index = self.table.borrow_mut().put(Node {
            var: TERMINAL,
            low: Ref(leaf),
            high: Ref(0),
        });
        Ref(index as u32)
    }

    /// Create (or reuse) the node `if var then high else low`.
    pub fn mk_node(&self, var: u32, low: Ref, high: Ref) -> Ref {
        assert_ne!(var, TERMINAL, "Variable index should not be zero");

        // Handle duplicates
        if low == high {
            return low;
        }

        let index = self.table.borrow_mut().put(Node { var, low, high });
        Ref(index as u32)
    }

    /// The 0/1-valued diagram of a single variable.
    pub fn var_bool(&self, var: u32) -> Ref {
        self.mk_node(var, self.zero, self.one)
    }

    /// Cofactors of `f` with respect to variable `v`, which must be at or
    /// above `f`'s top variable.
    pub fn top_cofactors(&self, f: Ref, v: u32) -> (Ref, Ref) {
        assert_ne!(v, TERMINAL);
        let node = self.node(f);
        if node.var == TERMINAL || v < node.var {
            return (f, f);
        }
        assert_eq!(v, node.var);
        (node.low, node.high)
    }

    /// Top variable among the given diagrams (0 if all are terminal).
    fn top_var_of(&self, refs: &[Ref]) -> u32 {
        refs.iter()
            .map(|&f| self.var_of(f))
            .filter(|&v| v != TERMINAL)
            .min()
            .unwrap_or(TERMINAL)
    }

    /// Apply a pointwise binary operation.
    pub fn apply(&self, op: Op, a: Ref, b: Ref) -> Ref {
        // Short circuits on the absorbing/neutral constants:
        match op {
            Op::Add => {
                if self.is_zero(a) {
                    return b;
                }
                if self.is_zero(b) {
                    return a;
                }
            }
            Op::Mul => {
                if self.is_zero(a) || self.is_zero(b) {
                    return self.zero;
                }
                if self.is_one(a) {
                    return b;
                }
                if self.is_one(b) {
                    return a;
                }
            }
            Op::Max | Op::Min => {
                if a == b {
                    return a;
                }
            }
        }

        if self.is_terminal(a) && self.is_terminal(b) {
            return self.constant(op.eval(self.value(a), self.value(b)));
        }

        // All four operations are commutative; normalize the argument order
        // for better cache utilization.
        let (a, b) = if a <= b { (a, b) } else { (b, a) };

        let key = OpKey::Apply(op, a, b);
        if let Some(&res) = self.cache.borrow().get(&key) {
            return res;
        }

        let m = self.top_var_of(&[a, b]);
        assert_ne!(m, TERMINAL);
        let (a0, a1) = self.top_cofactors(a, m);
        let (b0, b1) = self.top_cofactors(b, m);

        let low = self.apply(op, a0, b0);
        let high = self.apply(op, a1, b1);
        let res = self.mk_node(m, low, high);
        debug!("apply({:?}, {}, {}) -> {}", op, a, b, res);

        self.cache.borrow_mut().insert(&key, res);
        res
    }

    /// If-then-else with a 0/1-valued condition.
    pub fn ite(&self, c: Ref, t: Ref, e: Ref) -> Ref {
        if self.is_one(c) {
            return t;
        }
        if self.is_zero(c) {
            return e;
        }
        assert!(
            !self.is_terminal(c),
            "ite condition must be 0/1-valued, got {}",
            self.value(c)
        );
        if t == e {
            return t;
        }

        let key = OpKey::Ite(c, t, e);
        if let Some(&res) = self.cache.borrow().get(&key) {
            return res;
        }

        let m = self.top_var_of(&[c, t, e]);
        assert_ne!(m, TERMINAL);
        let (c0, c1) = self.top_cofactors(c, m);
        let (t0, t1) = self.top_cofactors(t, m);
        let (e0, e1) = self.top_cofactors(e, m);

        let low = self.ite(c0, t0, e0);
        let high = self.ite(c1, t1, e1);
        let res = self.mk_node(m, low, high);

        self.cache.borrow_mut().insert(&key, res);
        res
    }

    /// The 0/1-valued diagram that is 1 exactly where `f` is non-zero.
    pub fn not_zero(&self, f: Ref) -> Ref {
        let mut memo = HashMap::new();
        self.not_zero_(f, &mut memo)
    }

    fn not_zero_(&self, f: Ref, memo: &mut HashMap<Ref, Ref>) -> Ref {
        if self.is_terminal(f) {
            return if self.value(f) == 0.0 { self.zero } else { self.one };
        }
        if let Some(&res) = memo.get(&f) {
            return res;
        }
        let low = self.not_zero_(self.low(f), memo);
        let high = self.not_zero_(self.high(f), memo);
        let res = self.mk_node(self.var_of(f), low, high);
        memo.insert(f, res);
        res
    }

    /// Boolean complement of a 0/1-valued diagram.
    pub fn not01(&self, f: Ref) -> Ref {
        self.ite(f, self.zero, self.one)
    }

    /// Abstract the listed variables out of `f` by folding with `op`.
    ///
    /// `Op::Add` yields sum abstraction (a variable absent from `f` doubles
    /// the result), `Op::Max`/`Op::Min` yield max/min abstraction. `vars`
    /// must be sorted ascending.
    pub fn abstract_op(&self, op: Op, f: Ref, vars: &[u32]) -> Ref {
        assert!(vars.windows(2).all(|w| w[0] < w[1]), "Cube must be sorted");
        let mut memo = HashMap::new();
        self.abstract_(op, f, vars, 0, &mut memo)
    }

    fn abstract_(
        &self,
        op: Op,
        f: Ref,
        vars: &[u32],
        i: usize,
        memo: &mut HashMap<(Ref, usize), Ref>,
    ) -> Ref {
        if i == vars.len() {
            return f;
        }
        if let Some(&res) = memo.get(&(f, i)) {
            return res;
        }

        let v = vars[i];
        let fv = self.var_of(f);
        let res = if fv == TERMINAL || fv > v {
            // `f` does not depend on `v`.
            let r = self.abstract_(op, f, vars, i + 1, memo);
            match op {
                Op::Add => self.apply(Op::Add, r, r),
                _ => r,
            }
        } else if fv == v {
            let low = self.abstract_(op, self.low(f), vars, i + 1, memo);
            let high = self.abstract_(op, self.high(f), vars, i + 1, memo);
            self.apply(op, low, high)
        } else {
            // `f`'s top variable sits above the current cube position.
            let low = self.abstract_(op, self.low(f), vars, i, memo);
            let high = self.abstract_(op, self.high(f), vars, i, memo);
            self.mk_node(fv, low, high)
        };
        memo.insert((f, i), res);
        res
    }

    /// Sum abstraction over the listed variables.
    pub fn sum_abstract(&self, f: Ref, vars: &[u32]) -> Ref {
        self.abstract_op(Op::Add, f, vars)
    }

    /// Existential abstraction of a 0/1-valued diagram.
    pub fn exists(&self, f: Ref, vars: &[u32]) -> Ref {
        self.abstract_op(Op::Max, f, vars)
    }

    /// Rename variables according to `map` (identity for unlisted variables).
    ///
    /// The diagram is rebuilt bottom-up, so the mapping does not have to
    /// preserve the variable order.
    pub fn rename(&self, f: Ref, map: &HashMap<u32, u32>) -> Ref {
        let mut memo = HashMap::new();
        self.rename_(f, map, &mut memo)
    }

    fn rename_(&self, f: Ref, map: &HashMap<u32, u32>, memo: &mut HashMap<Ref, Ref>) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        if let Some(&res) = memo.get(&f) {
            return res;
        }
        let v = self.var_of(f);
        let v2 = map.get(&v).copied().unwrap_or(v);
        let low = self.rename_(self.low(f), map, memo);
        let high = self.rename_(self.high(f), map, memo);
        let res = self.ite(self.var_bool(v2), high, low);
        memo.insert(f, res);
        res
    }

    /// Conjunction of literals as a 0/1-valued diagram.
    pub fn cube01(&self, literals: &[(u32, bool)]) -> Ref {
        let mut literals = literals.to_vec();
        literals.sort_by_key(|&(v, _)| v);
        assert!(
            literals.windows(2).all(|w| w[0].0 < w[1].0),
            "Duplicate variable in cube"
        );

        let mut current = self.one;
        for &(v, positive) in literals.iter().rev() {
            current = if positive {
                self.mk_node(v, self.zero, current)
            } else {
                self.mk_node(v, current, self.zero)
            };
        }
        current
    }

    /// Cube encoding `value` in binary over `vars` (`vars[0]` is the least
    /// significant bit).
    pub fn index_cube(&self, vars: &[u32], value: usize) -> Ref {
        assert!(
            vars.len() >= usize::BITS as usize - value.leading_zeros() as usize,
            "Value {} does not fit in {} bits",
            value,
            vars.len()
        );
        let literals: Vec<(u32, bool)> = vars
            .iter()
            .enumerate()
            .map(|(j, &v)| (v, (value >> j) & 1 != 0))
            .collect();
        self.cube01(&literals)
    }

    /// Evaluate the diagram under a (total) variable assignment.
    pub fn eval(&self, f: Ref, assignment: &HashMap<u32, bool>) -> f64 {
        let mut current = f;
        while !self.is_terminal(current) {
            let v = self.var_of(current);
            let bit = *assignment
                .get(&v)
                .unwrap_or_else(|| panic!("Unassigned variable {}", v));
            current = if bit {
                self.high(current)
            } else {
                self.low(current)
            };
        }
        self.value(current)
    }

    /// Distinct terminal values reachable from `f`, sorted ascending.
    pub fn collect_values(&self, f: Ref) -> Vec<f64> {
        let mut seen = HashSet::new();
        let mut values = Vec::new();
        let mut queue = VecDeque::from([f]);
        while let Some(node) = queue.pop_front() {
            if !seen.insert(node) {
                continue;
            }
            if self.is_terminal(node) {
                values.push(self.value(node));
            } else {
                queue.push_back(self.low(node));
                queue.push_back(self.high(node));
            }
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        values.dedup();
        values
    }

    /// Variables occurring in `f`, sorted ascending.
    pub fn support(&self, f: Ref) -> Vec<u32> {
        let mut seen = HashSet::new();
        let mut vars = HashSet::new();
        let mut queue = VecDeque::from([f]);
        while let Some(node) = queue.pop_front() {
            if !seen.insert(node) || self.is_terminal(node) {
                continue;
            }
            vars.insert(self.var_of(node));
            queue.push_back(self.low(node));
            queue.push_back(self.high(node));
        }
        let mut vars: Vec<u32> = vars.into_iter().collect();
        vars.sort_unstable();
        vars
    }

    /// Count assignments over `vars` under which `f` is non-zero.
    ///
    /// `vars` must be sorted ascending and cover the support of `f`.
    pub fn sat_count(&self, f: Ref, vars: &[u32]) -> BigUint {
        assert!(vars.windows(2).all(|w| w[0] < w[1]), "Cube must be sorted");
        let mut memo = HashMap::new();
        self.sat_count_(f, vars, 0, &mut memo)
    }

    fn sat_count_(
        &self,
        f: Ref,
        vars: &[u32],
        i: usize,
        memo: &mut HashMap<(Ref, usize), BigUint>,
    ) -> BigUint {
        if i == vars.len() {
            assert!(
                self.is_terminal(f),
                "sat_count cube must cover the support"
            );
            return if self.value(f) != 0.0 {
                BigUint::from(1u32)
            } else {
                BigUint::ZERO
            };
        }
        if let Some(count) = memo.get(&(f, i)) {
            return count.clone();
        }

        let v = vars[i];
        let fv = self.var_of(f);
        let count = if fv == TERMINAL || fv > v {
            self.sat_count_(f, vars, i + 1, memo) << 1
        } else {
            assert_eq!(fv, v, "sat_count cube must cover the support");
            self.sat_count_(self.low(f), vars, i + 1, memo)
                + self.sat_count_(self.high(f), vars, i + 1, memo)
        };
        memo.insert((f, i), count.clone());
        count
    }

    /// The lexicographically least assignment over `vars` under which `f` is
    /// non-zero, or `None` if `f` is the zero diagram.
    ///
    /// `vars` must be sorted ascending and cover the support of `f`.
    pub fn one_sat(&self, f: Ref, vars: &[u32]) -> Option<Vec<bool>> {
        if self.is_zero(f) {
            return None;
        }
        let mut bits = Vec::with_capacity(vars.len());
        let mut current = f;
        for &v in vars {
            let fv = self.var_of(current);
            if fv == TERMINAL || fv > v {
                bits.push(false);
            } else {
                assert_eq!(fv, v, "one_sat cube must cover the support");
                // Any non-zero diagram has a non-zero leaf, so prefer low.
                if !self.is_zero(self.low(current)) {
                    bits.push(false);
                    current = self.low(current);
                } else {
                    bits.push(true);
                    current = self.high(current);
                }
            }
        }
        Some(bits)
    }

    /// Number of distinct nodes reachable from `f`.
    pub fn size(&self, f: Ref) -> usize {
        self.descendants(&[f]).len()
    }

    fn descendants(&self, roots: &[Ref]) -> HashSet<usize> {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<Ref> = roots.iter().copied().collect();
        while let Some(node) = queue.pop_front() {
            if visited.insert(node.index()) && !self.is_terminal(node) {
                queue.push_back(self.low(node));
                queue.push_back(self.high(node));
            }
        }
        visited
    }

    /// Drop every node not reachable from `roots`. Terminals always survive.
    ///
    /// Invalidates all handles to dropped nodes; the operation cache is
    /// cleared because it may reference them.
    pub fn collect_garbage(&self, roots: &[Ref]) {
        debug!("Collecting garbage, {} roots", roots.len());

        self.cache.borrow_mut().clear();
        let alive = self.descendants(roots);

        let keep = |table: &Table<Node>, index: usize| -> bool {
            alive.contains(&index) || table.value(index).var == TERMINAL
        };

        let num_buckets = self.table.borrow().num_buckets();
        for b in 0..num_buckets {
            let mut table = self.table.borrow_mut();

            // Drop dead nodes from the head of the chain.
            let mut head = table.bucket(b);
            while head != 0 && !keep(&table, head) {
                let next = table.next(head);
                table.drop(head);
                head = next;
            }
            table.set_bucket(b, head);

            // Then from the rest of the chain.
            let mut prev = head;
            while prev != 0 {
                let mut cur = table.next(prev);
                while cur != 0 && !keep(&table, cur) {
                    let next = table.next(cur);
                    table.drop(cur);
                    cur = next;
                }
                table.set_next(prev, cur);
                prev = cur;
            }
        }
    }

    /// Render the diagram as a nested `var:(high, low)` string, for debugging.
    pub fn to_bracket_string(&self, f: Ref) -> String {
        if self.is_terminal(f) {
            return format!("({})", self.value(f));
        }
        format!(
            "x{}:({}, {})",
            self.var_of(f),
            self.to_bracket_string(self.high(f)),
            self.to_bracket_string(self.low(f))
        )
    }
}
