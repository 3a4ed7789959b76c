//! Reactive state objects.
//!
//! A state is created by a cell and read through the names that hold its
//! handle. Writing a state records the writer; after a run pass the kernel
//! drains the recorded writes and re-runs the cells that read the state.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::CellId;

/// Handle to a reactive state object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct StateId(u64);

impl StateId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "state_{}", self.0)
    }
}

/// Who performed a state write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOrigin {
    /// The cell running when the setter was called.
    Cell(CellId),
    /// A setter call from outside any cell.
    External,
}

impl WriteOrigin {
    pub fn cell(&self) -> Option<CellId> {
        match self {
            WriteOrigin::Cell(id) => Some(*id),
            WriteOrigin::External => None,
        }
    }
}

/// A recorded state write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateWrite {
    pub state: StateId,
    pub origin: WriteOrigin,
}

#[derive(Debug)]
struct StateEntry {
    value: serde_json::Value,
    owner: Option<CellId>,
    allow_self_loops: bool,
    last_writer: Option<WriteOrigin>,
}

/// Arena of reactive states for one kernel.
#[derive(Debug, Default)]
pub struct StateRegistry {
    next_id: u64,
    states: FxHashMap<StateId, StateEntry>,
    pending: Vec<StateWrite>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state owned by `owner` (or by nobody, for external states).
    pub fn create(
        &mut self,
        owner: Option<CellId>,
        initial: serde_json::Value,
        allow_self_loops: bool,
    ) -> StateId {
        let id = StateId(self.next_id);
        self.next_id += 1;
        self.states.insert(
            id,
            StateEntry {
                value: initial,
                owner,
                allow_self_loops,
                last_writer: None,
            },
        );
        id
    }

    pub fn contains(&self, id: StateId) -> bool {
        self.states.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Current value of a state.
    pub fn value(&self, id: StateId) -> Result<&serde_json::Value> {
        self.entry(id).map(|e| &e.value)
    }

    pub fn allows_self_loops(&self, id: StateId) -> Result<bool> {
        self.entry(id).map(|e| e.allow_self_loops)
    }

    pub fn owner(&self, id: StateId) -> Result<Option<CellId>> {
        self.entry(id).map(|e| e.owner)
    }

    pub fn last_writer(&self, id: StateId) -> Result<Option<WriteOrigin>> {
        self.entry(id).map(|e| e.last_writer)
    }

    fn entry(&self, id: StateId) -> Result<&StateEntry> {
        self.states.get(&id).ok_or(Error::UnknownState(id))
    }

    /// Write a state.
    ///
    /// Writes that leave the value unchanged are not recorded. Returns
    /// whether a write was recorded.
    pub fn set(&mut self, id: StateId, value: serde_json::Value, origin: WriteOrigin) -> Result<bool> {
        let entry = self.states.get_mut(&id).ok_or(Error::UnknownState(id))?;
        entry.last_writer = Some(origin);
        if entry.value == value {
            return Ok(false);
        }
        entry.value = value;
        self.pending.push(StateWrite { state: id, origin });
        tracing::debug!(state = %id, ?origin, "state written");
        Ok(true)
    }

    /// Whether any writes are waiting to be processed.
    pub fn has_pending_writes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Take every write recorded since the last drain, deduplicated.
    pub fn drain_writes(&mut self) -> BTreeSet<StateWrite> {
        self.pending.drain(..).collect()
    }

    /// Destroy every state owned by `cell`.
    pub fn dispose(&mut self, cell: CellId) -> Vec<StateId> {
        let owned: Vec<StateId> = self
            .states
            .iter()
            .filter(|(_, e)| e.owner == Some(cell))
            .map(|(&id, _)| id)
            .collect();
        for id in &owned {
            self.states.remove(id);
        }
        self.pending.retain(|w| !owned.contains(&w.state));
        owned
    }
}
