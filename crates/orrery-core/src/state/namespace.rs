//! The shared execution namespace.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::graph::Name;

use super::element::ElementId;
use super::reactive::StateId;

/// A value bound to a name.
///
/// State and UI element handles are stored by id; their current values live
/// in the [`StateRegistry`](super::StateRegistry) and
/// [`ElementRegistry`](super::ElementRegistry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Plain data.
    Data(serde_json::Value),
    /// Reactive state handle.
    State(StateId),
    /// UI element handle.
    Element(ElementId),
}

impl Value {
    pub fn as_data(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Data(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_state(&self) -> Option<StateId> {
        match self {
            Value::State(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<ElementId> {
        match self {
            Value::Element(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Data(value)
    }
}

/// Name → value environment shared by all cells of one kernel.
///
/// Owned by the kernel and lent to the executor for the duration of a
/// single cell.
#[derive(Debug, Default, Clone)]
pub struct Namespace {
    values: FxHashMap<Name, Value>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<Name>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Bound names, sorted.
    pub fn names(&self) -> BTreeSet<&Name> {
        self.values.keys().collect()
    }

    /// Remove every name in `names` that is not in `keep`.
    ///
    /// Returns how many bindings were removed.
    pub fn invalidate<'a>(
        &mut self,
        names: impl IntoIterator<Item = &'a Name>,
        keep: &BTreeSet<Name>,
    ) -> usize {
        names
            .into_iter()
            .filter(|name| !keep.contains(*name))
            .filter(|name| self.values.remove(name.as_str()).is_some())
            .count()
    }

    /// Names holding the given state handle.
    pub fn names_bound_to_state(&self, state: StateId) -> BTreeSet<Name> {
        self.values
            .iter()
            .filter(|(_, v)| v.as_state() == Some(state))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Names holding any UI element handle, with the handle.
    pub fn element_bindings(&self) -> impl Iterator<Item = (&Name, ElementId)> {
        self.values
            .iter()
            .filter_map(|(name, v)| v.as_element().map(|id| (name, id)))
    }
}
