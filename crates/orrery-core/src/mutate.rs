//! Graph mutations.
//!
//! A [`MutationBatch`] registers and deletes cells in one step. The
//! [`Orchestrator`] applies it to the graph, recomputes structural errors
//! and works out which cells must run and which bindings must go.
//!
//! Errors are attributed conservatively: a cell that was valid before the
//! batch only picks up a new structural error when the batch is responsible
//! for it, meaning the cell is downstream of a registered cell or the error
//! names a registered cell. Errors that appear anywhere else are pruned and
//! the cell keeps its bindings.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashMap;

use crate::analyze::Analyzer;
use crate::graph::{
    Cell, CellConfig, CellId, CodeFingerprint, DependencyGraph, GraphError, Name,
    check_for_errors,
};

/// A set of registrations and deletions applied together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationBatch {
    pub register: Vec<(CellId, String)>,
    pub delete: Vec<CellId>,
}

impl MutationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a cell.
    pub fn register(mut self, id: CellId, code: impl Into<String>) -> Self {
        self.register.push((id, code.into()));
        self
    }

    /// Delete a cell.
    pub fn delete(mut self, id: CellId) -> Self {
        self.delete.push(id);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.register.is_empty() && self.delete.is_empty()
    }
}

/// What a batch did and what must happen next.
#[derive(Debug, Clone, Default)]
pub struct MutationOutcome {
    /// Cells whose code was (re)submitted and analyzed without a syntax error.
    pub registered: BTreeSet<CellId>,
    /// Cells removed from the notebook.
    pub deleted: BTreeSet<CellId>,
    /// Cells that must run, error-free and present in the graph.
    pub run_set: BTreeSet<CellId>,
    /// Cells whose error list changed, with their new list (empty if cleared).
    pub changed_errors: BTreeMap<CellId, Vec<GraphError>>,
    /// Bindings to drop: cell and the names it defined.
    pub invalidate: Vec<(CellId, BTreeSet<Name>)>,
    /// Names that must survive invalidation.
    pub keep: BTreeSet<Name>,
    /// Cells with a structural error that was pruned.
    pub pruned: BTreeSet<CellId>,
}

/// Applies mutation batches and owns the structural error table.
#[derive(Debug, Default)]
pub struct Orchestrator {
    errors: BTreeMap<CellId, Vec<GraphError>>,
    /// Configuration of cells that are not in the graph (syntax errors).
    detached_configs: FxHashMap<CellId, CellConfig>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current structural errors of every cell.
    pub fn errors(&self) -> &BTreeMap<CellId, Vec<GraphError>> {
        &self.errors
    }

    /// Structural errors of one cell.
    pub fn errors_for(&self, id: CellId) -> &[GraphError] {
        self.errors.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_errors(&self, id: CellId) -> bool {
        self.errors.contains_key(&id)
    }

    /// Ids of all errored cells.
    pub fn errored_cells(&self) -> BTreeSet<CellId> {
        self.errors.keys().copied().collect()
    }

    /// Whether the cell is known, in the graph or held back by a syntax error.
    pub fn is_known(&self, graph: &DependencyGraph, id: CellId) -> bool {
        graph.contains(id) || self.detached_configs.contains_key(&id)
    }

    /// Configuration of a cell, wherever it lives.
    pub fn config(&self, graph: &DependencyGraph, id: CellId) -> Option<CellConfig> {
        graph
            .get(id)
            .map(|c| c.config)
            .or_else(|| self.detached_configs.get(&id).copied())
    }

    /// Update the configuration of a cell that is not in the graph.
    ///
    /// Returns false when the cell is unknown.
    pub fn set_detached_config(&mut self, id: CellId, config: CellConfig) -> bool {
        match self.detached_configs.get_mut(&id) {
            Some(existing) => {
                *existing = config;
                true
            }
            None => false,
        }
    }

    /// Apply a batch.
    ///
    /// Deletions are processed before registrations.
    pub fn apply(
        &mut self,
        graph: &mut DependencyGraph,
        analyzer: &dyn Analyzer,
        batch: MutationBatch,
    ) -> MutationOutcome {
        let present_before = graph.cell_ids();
        let previous_errors = std::mem::take(&mut self.errors);
        let errored_before: BTreeSet<CellId> = previous_errors.keys().copied().collect();

        let mut outcome = MutationOutcome::default();
        let mut orphaned: BTreeSet<CellId> = BTreeSet::new();
        let mut syntax_errors: BTreeMap<CellId, GraphError> = BTreeMap::new();

        for id in batch.delete {
            if let Some(cell) = graph.get(id) {
                outcome.invalidate.push((id, cell.defs.clone()));
            }
            orphaned.extend(graph.delete(id));
            self.detached_configs.remove(&id);
            outcome.deleted.insert(id);
        }

        for (id, code) in batch.register {
            outcome.deleted.remove(&id);
            if graph.is_cached(id, CodeFingerprint::of(&code)) {
                tracing::trace!(cell = %id, "code unchanged, reusing analysis");
                outcome.registered.insert(id);
                continue;
            }

            let config = self.config(graph, id).unwrap_or_default();
            if let Some(old) = graph.get(id) {
                outcome.invalidate.push((id, old.defs.clone()));
            }

            match analyzer.analyze(&code) {
                Ok(analysis) => {
                    let cell = Cell::new(id, code, analysis).with_config(config);
                    orphaned.extend(graph.register(cell));
                    self.detached_configs.remove(&id);
                    outcome.registered.insert(id);
                }
                Err(err) => {
                    tracing::debug!(cell = %id, "syntax error: {}", err);
                    orphaned.extend(graph.delete(id));
                    self.detached_configs.insert(id, config);
                    syntax_errors.insert(
                        id,
                        GraphError::Syntax {
                            message: err.to_string(),
                        },
                    );
                }
            }
        }

        // Structural errors over the updated graph, minus the pruned ones.
        let registered_closure = graph.transitive_closure(&outcome.registered);
        let mut errors: BTreeMap<CellId, Vec<GraphError>> = BTreeMap::new();
        for (id, cell_errors) in check_for_errors(graph) {
            let previously_valid = present_before.contains(&id) && !errored_before.contains(&id);
            let attributable = registered_closure.contains(&id)
                || cell_errors
                    .iter()
                    .any(|e| !e.involved_cells().is_disjoint(&outcome.registered));
            if previously_valid && !attributable {
                tracing::debug!(cell = %id, "pruned structural error caused elsewhere");
                outcome.pruned.insert(id);
                continue;
            }
            errors.insert(id, cell_errors);
        }
        for (id, error) in syntax_errors {
            errors.insert(id, vec![error]);
        }
        // Syntax errors from earlier batches stand until the cell is resubmitted.
        for (id, cell_errors) in &previous_errors {
            if !graph.contains(*id)
                && self.detached_configs.contains_key(id)
                && !errors.contains_key(id)
            {
                errors.insert(*id, cell_errors.clone());
            }
        }

        for (id, cell_errors) in &errors {
            if previous_errors.get(id) != Some(cell_errors) {
                outcome.changed_errors.insert(*id, cell_errors.clone());
            }
        }
        for id in previous_errors.keys() {
            if !errors.contains_key(id) {
                outcome.changed_errors.insert(*id, Vec::new());
            }
        }

        let errored_now: BTreeSet<CellId> = errors.keys().copied().collect();
        let newly_errored = errored_now.difference(&errored_before).copied();
        let left_error = errored_before.difference(&errored_now).copied();

        let roots: BTreeSet<CellId> = outcome
            .registered
            .iter()
            .copied()
            .filter(|id| !errored_now.contains(id))
            .chain(orphaned)
            .chain(newly_errored)
            .chain(left_error)
            .filter(|&id| graph.contains(id))
            .collect();
        outcome.run_set = graph
            .transitive_closure(&roots)
            .difference(&errored_now)
            .copied()
            .collect();

        for &id in &errored_now {
            if let Some(cell) = graph.get(id) {
                outcome.invalidate.push((id, cell.defs.clone()));
            }
        }

        // Names held by valid cells that will not re-run stay bound, and so
        // do the names of cells whose errors were pruned.
        for cell in graph.cells_in_order() {
            if !errored_now.contains(&cell.id) && !outcome.run_set.contains(&cell.id) {
                outcome.keep.extend(cell.defs.iter().cloned());
            }
        }

        self.errors = errors;
        tracing::debug!(
            registered = outcome.registered.len(),
            deleted = outcome.deleted.len(),
            errored = self.errors.len(),
            pruned = outcome.pruned.len(),
            run = outcome.run_set.len(),
            "applied mutation batch"
        );
        outcome
    }
}
