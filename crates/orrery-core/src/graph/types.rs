//! Types for the dependency graph.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::analyze::CellAnalysis;

/// A variable name in the shared namespace.
pub type Name = String;

/// Unique identifier for a cell within a notebook.
///
/// Ids are assigned by the front end and stay stable across edits of the
/// same cell slot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CellId(pub(crate) usize);

impl CellId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cell_{}", self.0)
    }
}

/// Hash of a cell's source code, used to skip re-registration of unchanged cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeFingerprint(u64);

impl CodeFingerprint {
    /// Fingerprint the given source code.
    pub fn of(code: &str) -> Self {
        let mut hasher = FxHasher::default();
        code.hash(&mut hasher);
        Self(hasher.finish())
    }
}

/// What kind of value a defined name holds, as reported by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    /// Plain value assignment.
    Variable,
    /// Function definition.
    Function,
    /// Type or class definition.
    Type,
    /// Imported module or symbol.
    Import,
    /// Reactive state handle.
    State,
    /// UI element handle.
    Element,
}

/// User-controlled per-cell configuration.
///
/// Survives re-registration and syntax errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellConfig {
    /// Disabled cells never run, and neither do their descendants.
    #[serde(default)]
    pub disabled: bool,
}

/// Runtime status of a cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CellStatus {
    /// Not scheduled.
    #[default]
    Idle,
    /// Scheduled in the current run pass.
    Queued,
    /// Currently executing.
    Running,
    /// Output no longer reflects the cell's inputs.
    Stale,
    /// Skipped in the current pass because an ancestor failed.
    Cancelled,
    /// Blocked by a disabled ancestor.
    DisabledTransitively,
}

/// A registered cell: the node payload of the dependency graph.
#[derive(Debug, Clone)]
pub struct Cell {
    /// Unique identifier
    pub id: CellId,
    /// Source code
    pub code: String,
    /// Fingerprint of `code`
    pub fingerprint: CodeFingerprint,
    /// Names this cell assigns
    pub defs: BTreeSet<Name>,
    /// Names this cell reads from other cells
    pub refs: BTreeSet<Name>,
    /// Names this cell deletes from the namespace
    pub deleted_refs: BTreeSet<Name>,
    /// Kind of each defined name
    pub variable_kinds: BTreeMap<Name, VariableKind>,
    /// User configuration
    pub config: CellConfig,
    /// Runtime status
    pub status: CellStatus,
    /// Whether the last output is out of date
    pub stale: bool,
}

impl Cell {
    /// Build a cell from analyzed source code.
    pub fn new(id: CellId, code: impl Into<String>, analysis: CellAnalysis) -> Self {
        let code = code.into();
        Self {
            id,
            fingerprint: CodeFingerprint::of(&code),
            code,
            defs: analysis.defs,
            refs: analysis.refs,
            deleted_refs: analysis.deleted_refs,
            variable_kinds: analysis.variable_kinds,
            config: CellConfig::default(),
            status: CellStatus::Idle,
            stale: false,
        }
    }

    /// Set the configuration (builder style).
    pub fn with_config(mut self, config: CellConfig) -> Self {
        self.config = config;
        self
    }

    /// Names this cell depends on: read and deleted names.
    pub fn dependencies(&self) -> impl Iterator<Item = &Name> {
        self.refs.iter().chain(self.deleted_refs.iter())
    }

    /// Whether this cell reads or deletes `name`.
    pub fn depends_on(&self, name: &str) -> bool {
        self.refs.contains(name) || self.deleted_refs.contains(name)
    }
}
