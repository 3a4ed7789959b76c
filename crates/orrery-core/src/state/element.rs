//! Interactive UI elements and their bindings.
//!
//! Elements let notebook users drive cells from the front end: when a
//! value changes, every cell reading a name bound to the element re-runs.
//!
//! An element is either a *source*, which owns its value, or a *view*
//! (lens) onto one key of another element's object value. Updating a view
//! writes through to its ultimate source.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::{CellId, Name};

use super::namespace::Namespace;

/// Handle to a UI element.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ElementId(u64);

impl ElementId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "element_{}", self.0)
    }
}

#[derive(Debug, Clone)]
enum ElementKind {
    Source { value: serde_json::Value },
    View { parent: ElementId, key: String },
}

#[derive(Debug, Clone)]
struct ElementEntry {
    owner: Option<CellId>,
    kind: ElementKind,
}

/// Arena of UI elements for one kernel.
#[derive(Debug, Default)]
pub struct ElementRegistry {
    next_id: u64,
    elements: FxHashMap<ElementId, ElementEntry>,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self, owner: Option<CellId>, kind: ElementKind) -> ElementId {
        let id = ElementId(self.next_id);
        self.next_id += 1;
        self.elements.insert(id, ElementEntry { owner, kind });
        id
    }

    /// Create a source element holding `initial`.
    pub fn create(&mut self, owner: Option<CellId>, initial: serde_json::Value) -> ElementId {
        self.allocate(owner, ElementKind::Source { value: initial })
    }

    /// Create a view onto `key` of `parent`'s object value.
    pub fn create_view(
        &mut self,
        owner: Option<CellId>,
        parent: ElementId,
        key: impl Into<String>,
    ) -> Result<ElementId> {
        if !self.contains(parent) {
            return Err(Error::UnknownElement(parent));
        }
        Ok(self.allocate(
            owner,
            ElementKind::View {
                parent,
                key: key.into(),
            },
        ))
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.elements.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn owner(&self, id: ElementId) -> Result<Option<CellId>> {
        self.entry(id).map(|e| e.owner)
    }

    fn entry(&self, id: ElementId) -> Result<&ElementEntry> {
        self.elements.get(&id).ok_or(Error::UnknownElement(id))
    }

    /// Current value; views read through to their parent.
    pub fn value(&self, id: ElementId) -> Result<serde_json::Value> {
        match &self.entry(id)?.kind {
            ElementKind::Source { value } => Ok(value.clone()),
            ElementKind::View { parent, key } => Ok(self
                .value(*parent)?
                .get(key)
                .cloned()
                .unwrap_or(serde_json::Value::Null)),
        }
    }

    /// Follow view links to the element that owns the value.
    pub fn ultimate_source(&self, id: ElementId) -> Result<ElementId> {
        let mut current = id;
        loop {
            match &self.entry(current)?.kind {
                ElementKind::Source { .. } => return Ok(current),
                ElementKind::View { parent, .. } => current = *parent,
            }
        }
    }

    /// Replace the value of a source element.
    pub fn set_value(&mut self, id: ElementId, new_value: serde_json::Value) -> Result<()> {
        let entry = self.elements.get_mut(&id).ok_or(Error::UnknownElement(id))?;
        match &mut entry.kind {
            ElementKind::Source { value } => {
                *value = new_value;
                Ok(())
            }
            ElementKind::View { .. } => Err(Error::InvalidOperation(format!(
                "{} is a view; update its source instead",
                id
            ))),
        }
    }

    /// Destroy every element owned by `cell`, and any view left dangling.
    pub fn dispose(&mut self, cell: CellId) -> Vec<ElementId> {
        let mut removed: Vec<ElementId> = self
            .elements
            .iter()
            .filter(|(_, e)| e.owner == Some(cell))
            .map(|(&id, _)| id)
            .collect();
        for id in &removed {
            self.elements.remove(id);
        }

        loop {
            let dangling: Vec<ElementId> = self
                .elements
                .iter()
                .filter(|(_, e)| match &e.kind {
                    ElementKind::View { parent, .. } => !self.elements.contains_key(parent),
                    ElementKind::Source { .. } => false,
                })
                .map(|(&id, _)| id)
                .collect();
            if dangling.is_empty() {
                break;
            }
            for id in &dangling {
                self.elements.remove(id);
            }
            removed.extend(dangling);
        }

        removed
    }

    fn resolve(&self, id: ElementId, value: serde_json::Value) -> Result<(ElementId, serde_json::Value)> {
        match &self.entry(id)?.kind {
            ElementKind::Source { .. } => Ok((id, value)),
            ElementKind::View { parent, key } => {
                let mut parent_value = self.value(*parent)?;
                if parent_value.is_null() {
                    parent_value = serde_json::Value::Object(serde_json::Map::new());
                }
                let object = parent_value.as_object_mut().ok_or_else(|| {
                    Error::InvalidOperation(format!(
                        "{} views key '{}' of a non-object value",
                        id, key
                    ))
                })?;
                object.insert(key.clone(), value);
                self.resolve(*parent, parent_value)
            }
        }
    }
}

/// Maps UI value updates to the element that owns the value and to the
/// names bound to it.
pub trait BindingProvider {
    /// Translate an update of `id` into an update of its ultimate source.
    fn resolve_view(
        &self,
        id: ElementId,
        value: serde_json::Value,
    ) -> Result<(ElementId, serde_json::Value)>;

    /// Names bound to `source` or to any view of it.
    fn bound_names(&self, source: ElementId) -> BTreeSet<Name>;
}

/// [`BindingProvider`] backed by the kernel's element registry and namespace.
pub struct Bindings<'a> {
    pub elements: &'a ElementRegistry,
    pub namespace: &'a Namespace,
}

impl BindingProvider for Bindings<'_> {
    fn resolve_view(
        &self,
        id: ElementId,
        value: serde_json::Value,
    ) -> Result<(ElementId, serde_json::Value)> {
        self.elements.resolve(id, value)
    }

    fn bound_names(&self, source: ElementId) -> BTreeSet<Name> {
        self.namespace
            .element_bindings()
            .filter(|&(_, id)| {
                self.elements
                    .ultimate_source(id)
                    .is_ok_and(|s| s == source)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}
