//! Named properties attached to graph nodes.
//!
//! Properties are how atomic propositions, rewards, and other per-node
//! annotations travel with a graph. When a quotient graph is built, each
//! property is translated by reading it off a representative node of every
//! block, so the quotient carries the same property keys as the original.

use std::collections::HashMap;

use crate::bitset::BitSet;
use crate::error::Error;
use crate::mtbdd::Ref;

/// Key identifying a graph property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropKey {
    /// A boolean atomic proposition (state label).
    Label(String),
    /// A per-node reward value.
    Reward(String),
}

impl PropKey {
    pub fn label(name: impl Into<String>) -> Self {
        PropKey::Label(name.into())
    }

    pub fn reward(name: impl Into<String>) -> Self {
        PropKey::Reward(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            PropKey::Label(name) | PropKey::Reward(name) => name,
        }
    }
}

/// A property value over the nodes of an explicit graph.
#[derive(Debug, Clone)]
pub enum PropValue {
    NodeBool(BitSet),
    NodeInt(Vec<i64>),
    NodeReal(Vec<f64>),
}

impl PropValue {
    /// Translate the property to a quotient graph: entry `q` of the result is
    /// the value at `representatives[q]` in the original.
    pub fn translate(&self, representatives: &[usize]) -> PropValue {
        match self {
            PropValue::NodeBool(set) => PropValue::NodeBool(
                representatives
                    .iter()
                    .enumerate()
                    .filter(|&(_, &orig)| set.contains(orig))
                    .map(|(q, _)| q)
                    .collect(),
            ),
            PropValue::NodeInt(values) => {
                PropValue::NodeInt(representatives.iter().map(|&orig| values[orig]).collect())
            }
            PropValue::NodeReal(values) => {
                PropValue::NodeReal(representatives.iter().map(|&orig| values[orig]).collect())
            }
        }
    }
}

/// Property store of an explicit graph.
#[derive(Debug, Clone, Default)]
pub struct Props {
    entries: HashMap<PropKey, PropValue>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: PropKey, value: PropValue) {
        self.entries.insert(key, value);
    }

    pub fn get(&self, key: &PropKey) -> Option<&PropValue> {
        self.entries.get(key)
    }

    pub fn require(&self, key: &PropKey) -> Result<&PropValue, Error> {
        self.entries
            .get(key)
            .ok_or_else(|| Error::UnknownProperty(key.name().to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &PropKey> {
        self.entries.keys()
    }

    /// Translate every property to a quotient graph, reading values off the
    /// given representative node of each block.
    pub fn translate(&self, representatives: &[usize]) -> Props {
        Props {
            entries: self
                .entries
                .iter()
                .map(|(key, value)| (key.clone(), value.translate(representatives)))
                .collect(),
        }
    }
}

/// Property store of a symbolic graph: each property is a diagram over the
/// present-state variables (0/1-valued for labels).
#[derive(Debug, Clone, Default)]
pub struct DdProps {
    entries: HashMap<PropKey, Ref>,
}

impl DdProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: PropKey, dd: Ref) {
        self.entries.insert(key, dd);
    }

    pub fn get(&self, key: &PropKey) -> Option<Ref> {
        self.entries.get(key).copied()
    }

    pub fn require(&self, key: &PropKey) -> Result<Ref, Error> {
        self.entries
            .get(key)
            .copied()
            .ok_or_else(|| Error::UnknownProperty(key.name().to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropKey, Ref)> {
        self.entries.iter().map(|(key, &dd)| (key, dd))
    }

    pub fn map(&self, mut f: impl FnMut(Ref) -> Ref) -> DdProps {
        DdProps {
            entries: self
                .entries
                .iter()
                .map(|(key, &dd)| (key.clone(), f(dd)))
                .collect(),
        }
    }
}
