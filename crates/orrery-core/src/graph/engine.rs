//! The reactive dependency graph.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, VecDeque};

use petgraph::graphmap::DiGraphMap;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

use super::errors::{CycleEdges, Edge};
use super::types::{Cell, CellId, CellStatus, CodeFingerprint, Name};

static NO_CELLS: BTreeSet<CellId> = BTreeSet::new();

/// Dependency graph over registered cells.
///
/// Edges go from producer to consumer: there is an edge `a -> b` whenever
/// some name defined by `a` is read (or deleted) by `b`. Cells that define
/// the same name are all kept; the conflict is reported by
/// [`check_for_errors`](super::check_for_errors), not rejected here.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Cell records by ID
    cells: FxHashMap<CellId, Cell>,
    /// Producers of each cell
    parents: FxHashMap<CellId, BTreeSet<CellId>>,
    /// Consumers of each cell
    children: FxHashMap<CellId, BTreeSet<CellId>>,
    /// Name to defining cells
    definitions: FxHashMap<Name, BTreeSet<CellId>>,
    /// Name to reading (or deleting) cells
    references: FxHashMap<Name, BTreeSet<CellId>>,
    /// Strongly-connected components found by the last refresh
    cycles: Vec<CycleEdges>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a cell, replacing any cell with the same id.
    ///
    /// Returns the children the replaced cell had, which the caller must
    /// re-run since their inputs changed.
    pub fn register(&mut self, cell: Cell) -> BTreeSet<CellId> {
        let id = cell.id;
        let replaced_children = if self.cells.contains_key(&id) {
            self.delete(id)
        } else {
            BTreeSet::new()
        };

        self.parents.entry(id).or_default();
        self.children.entry(id).or_default();

        for name in &cell.defs {
            self.definitions.entry(name.clone()).or_default().insert(id);
            let readers: Vec<CellId> = self
                .references
                .get(name)
                .map(|r| r.iter().copied().collect())
                .unwrap_or_default();
            for reader in readers {
                self.add_edge(id, reader);
            }
        }

        for name in cell.dependencies() {
            self.references.entry(name.clone()).or_default().insert(id);
            let definers: Vec<CellId> = self
                .definitions
                .get(name)
                .map(|d| d.iter().copied().collect())
                .unwrap_or_default();
            for definer in definers {
                self.add_edge(definer, id);
            }
        }

        let disabled = cell.config.disabled;
        self.cells.insert(id, cell);

        if disabled {
            for descendant in self.descendants(id) {
                if descendant != id {
                    self.set_status(descendant, CellStatus::DisabledTransitively);
                }
            }
        } else if self.has_disabled_ancestor(id) {
            self.set_status(id, CellStatus::DisabledTransitively);
        }

        let affected = self.transitive_closure(&replaced_children);
        self.restore_enabled(&affected);
        self.refresh_cycles();

        tracing::debug!(
            cell = %id,
            parents = self.parents(id).len(),
            children = self.children(id).len(),
            "registered cell"
        );
        replaced_children
    }

    /// Remove a cell, returning the children it had.
    pub fn delete(&mut self, id: CellId) -> BTreeSet<CellId> {
        let Some(cell) = self.cells.remove(&id) else {
            return BTreeSet::new();
        };

        for name in &cell.defs {
            remove_from_index(&mut self.definitions, name, id);
        }
        for name in cell.dependencies() {
            remove_from_index(&mut self.references, name, id);
        }

        let children = self.children.remove(&id).unwrap_or_default();
        let parents = self.parents.remove(&id).unwrap_or_default();
        for child in &children {
            if let Some(p) = self.parents.get_mut(child) {
                p.remove(&id);
            }
        }
        for parent in &parents {
            if let Some(c) = self.children.get_mut(parent) {
                c.remove(&id);
            }
        }

        let mut former_children = children;
        former_children.remove(&id);

        let affected = self.transitive_closure(&former_children);
        self.restore_enabled(&affected);
        self.refresh_cycles();

        tracing::debug!(cell = %id, children = former_children.len(), "deleted cell");
        former_children
    }

    fn add_edge(&mut self, from: CellId, to: CellId) {
        self.children.entry(from).or_default().insert(to);
        self.parents.entry(to).or_default().insert(from);
    }

    /// Get a cell by ID.
    pub fn get(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(&id)
    }

    /// Get a mutable cell by ID.
    pub fn get_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.get_mut(&id)
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.cells.contains_key(&id)
    }

    /// Get the number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// All cell IDs, sorted.
    pub fn cell_ids(&self) -> BTreeSet<CellId> {
        self.cells.keys().copied().collect()
    }

    /// All cells, sorted by ID.
    pub fn cells_in_order(&self) -> Vec<&Cell> {
        let mut cells: Vec<&Cell> = self.cells.values().collect();
        cells.sort_by_key(|c| c.id);
        cells
    }

    /// Whether the cell is registered with exactly this source.
    pub fn is_cached(&self, id: CellId, fingerprint: CodeFingerprint) -> bool {
        self.cells
            .get(&id)
            .is_some_and(|c| c.fingerprint == fingerprint)
    }

    /// Direct producers of a cell.
    pub fn parents(&self, id: CellId) -> &BTreeSet<CellId> {
        self.parents.get(&id).unwrap_or(&NO_CELLS)
    }

    /// Direct consumers of a cell.
    pub fn children(&self, id: CellId) -> &BTreeSet<CellId> {
        self.children.get(&id).unwrap_or(&NO_CELLS)
    }

    /// All cells `id` transitively depends on.
    ///
    /// Includes `id` itself only if it sits on a cycle.
    pub fn ancestors(&self, id: CellId) -> BTreeSet<CellId> {
        self.reachable(id, &self.parents)
    }

    /// All cells that transitively depend on `id`.
    ///
    /// Includes `id` itself only if it sits on a cycle.
    pub fn descendants(&self, id: CellId) -> BTreeSet<CellId> {
        self.reachable(id, &self.children)
    }

    fn reachable(
        &self,
        start: CellId,
        adjacency: &FxHashMap<CellId, BTreeSet<CellId>>,
    ) -> BTreeSet<CellId> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([start]);

        while let Some(cell_id) = queue.pop_front() {
            for &next in adjacency.get(&cell_id).unwrap_or(&NO_CELLS) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        seen
    }

    /// The roots plus every registered descendant of any root.
    ///
    /// Roots that are not registered are dropped.
    pub fn transitive_closure(&self, roots: &BTreeSet<CellId>) -> BTreeSet<CellId> {
        let mut closure: BTreeSet<CellId> = roots
            .iter()
            .copied()
            .filter(|id| self.contains(*id))
            .collect();
        let mut queue: VecDeque<CellId> = closure.iter().copied().collect();

        while let Some(cell_id) = queue.pop_front() {
            for &child in self.children(cell_id) {
                if closure.insert(child) {
                    queue.push_back(child);
                }
            }
        }

        closure
    }

    /// Cells defining `name`.
    pub fn defining_cells(&self, name: &str) -> BTreeSet<CellId> {
        self.definitions.get(name).cloned().unwrap_or_default()
    }

    /// Cells reading or deleting `name`.
    pub fn referring_cells(&self, name: &str) -> BTreeSet<CellId> {
        self.references.get(name).cloned().unwrap_or_default()
    }

    /// Every defined name with its definers, sorted by name.
    pub fn definitions(&self) -> BTreeMap<&Name, &BTreeSet<CellId>> {
        self.definitions.iter().collect()
    }

    /// Names defined by more than one cell, sorted by name.
    pub fn multiply_defined_names(&self) -> Vec<(Name, BTreeSet<CellId>)> {
        let mut names: Vec<(Name, BTreeSet<CellId>)> = self
            .definitions
            .iter()
            .filter(|(_, definers)| definers.len() > 1)
            .map(|(name, definers)| (name.clone(), definers.clone()))
            .collect();
        names.sort();
        names
    }

    /// Cycles found by the last refresh.
    pub fn cycles(&self) -> &[CycleEdges] {
        &self.cycles
    }

    /// Recompute cycles: every strongly-connected component with more than
    /// one cell, plus every self-loop.
    pub fn refresh_cycles(&mut self) {
        use petgraph::algo::kosaraju_scc;

        let mut graph = DiGraphMap::<CellId, ()>::new();
        for &id in self.cells.keys() {
            graph.add_node(id);
        }
        for (&from, targets) in &self.children {
            for &to in targets {
                graph.add_edge(from, to, ());
            }
        }

        let mut cycles = Vec::new();
        for component in kosaraju_scc(&graph) {
            let members: BTreeSet<CellId> = component.into_iter().collect();
            let self_loop = members.iter().any(|&c| self.children(c).contains(&c));
            if members.len() < 2 && !self_loop {
                continue;
            }

            let mut edges = Vec::new();
            for &from in &members {
                for &to in self.children(from) {
                    if members.contains(&to) {
                        edges.push(Edge::new(from, to));
                    }
                }
            }
            cycles.push(CycleEdges::new(edges));
        }

        cycles.sort_by_key(|c| c.cells().into_iter().next());
        if !cycles.is_empty() {
            tracing::debug!(count = cycles.len(), "detected cycles");
        }
        self.cycles = cycles;
    }

    /// Set a cell's runtime status.
    pub fn set_status(&mut self, id: CellId, status: CellStatus) {
        if let Some(cell) = self.cells.get_mut(&id) {
            cell.status = status;
        }
    }

    /// Mark a cell's output as (not) reflecting its inputs.
    pub fn set_stale(&mut self, id: CellId, stale: bool) {
        if let Some(cell) = self.cells.get_mut(&id) {
            cell.stale = stale;
        }
    }

    /// All stale cells, sorted.
    pub fn stale_cells(&self) -> BTreeSet<CellId> {
        self.cells
            .values()
            .filter(|c| c.stale)
            .map(|c| c.id)
            .collect()
    }

    /// Whether any ancestor of the cell is disabled.
    pub fn has_disabled_ancestor(&self, id: CellId) -> bool {
        self.ancestors(id)
            .into_iter()
            .filter(|&a| a != id)
            .any(|a| self.cells.get(&a).is_some_and(|c| c.config.disabled))
    }

    /// Whether the cell is disabled itself or through an ancestor.
    pub fn is_disabled(&self, id: CellId) -> bool {
        self.cells.get(&id).is_some_and(|c| c.config.disabled) || self.has_disabled_ancestor(id)
    }

    /// Disable a cell.
    ///
    /// Returns the descendants that became disabled-transitively.
    pub fn disable(&mut self, id: CellId) -> Result<BTreeSet<CellId>> {
        let cell = self.cells.get_mut(&id).ok_or(Error::CellNotFound(id))?;
        cell.config.disabled = true;

        let mut newly_disabled = BTreeSet::new();
        for descendant in self.descendants(id) {
            if descendant == id {
                continue;
            }
            if let Some(cell) = self.cells.get_mut(&descendant)
                && cell.status != CellStatus::DisabledTransitively
            {
                cell.status = CellStatus::DisabledTransitively;
                newly_disabled.insert(descendant);
            }
        }

        tracing::debug!(cell = %id, descendants = newly_disabled.len(), "disabled cell");
        Ok(newly_disabled)
    }

    /// Enable a cell.
    ///
    /// Returns the cells whose disabled-transitively status was lifted.
    pub fn enable(&mut self, id: CellId) -> Result<BTreeSet<CellId>> {
        let cell = self.cells.get_mut(&id).ok_or(Error::CellNotFound(id))?;
        cell.config.disabled = false;

        let affected = self.transitive_closure(&BTreeSet::from([id]));
        let restored = self.restore_enabled(&affected);
        tracing::debug!(cell = %id, restored = restored.len(), "enabled cell");
        Ok(restored)
    }

    /// Lift disabled-transitively status from candidates with no disabled
    /// ancestor left.
    fn restore_enabled(&mut self, candidates: &BTreeSet<CellId>) -> BTreeSet<CellId> {
        let mut restored = BTreeSet::new();
        for &id in candidates {
            let blocked = self
                .cells
                .get(&id)
                .is_none_or(|c| c.status != CellStatus::DisabledTransitively);
            if blocked || self.is_disabled(id) {
                continue;
            }
            if let Some(cell) = self.cells.get_mut(&id) {
                cell.status = if cell.stale {
                    CellStatus::Stale
                } else {
                    CellStatus::Idle
                };
                restored.insert(id);
            }
        }
        restored
    }

    /// Order `cells` so that every producer comes before its consumers.
    ///
    /// Only edges between members of `cells` are considered. Ties are broken
    /// by cell ID; cells left on a cycle are appended in ID order.
    pub fn topological_sort(&self, cells: &BTreeSet<CellId>) -> Vec<CellId> {
        let mut indegree: BTreeMap<CellId, usize> = cells
            .iter()
            .copied()
            .filter(|&id| self.contains(id))
            .map(|id| {
                let count = self
                    .parents(id)
                    .iter()
                    .filter(|&&p| p != id && cells.contains(&p))
                    .count();
                (id, count)
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<CellId>> = indegree
            .iter()
            .filter(|&(_, &count)| count == 0)
            .map(|(&id, _)| Reverse(id))
            .collect();
        let mut order = Vec::with_capacity(indegree.len());

        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            for &child in self.children(id) {
                if child == id {
                    continue;
                }
                if let Some(count) = indegree.get_mut(&child) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(Reverse(child));
                    }
                }
            }
        }

        if order.len() < indegree.len() {
            let placed: BTreeSet<CellId> = order.iter().copied().collect();
            indegree.retain(|id, _| !placed.contains(id));
            order.extend(indegree.into_keys());
        }

        order
    }
}

fn remove_from_index(index: &mut FxHashMap<Name, BTreeSet<CellId>>, name: &Name, id: CellId) {
    if let Some(cells) = index.get_mut(name) {
        cells.remove(&id);
        if cells.is_empty() {
            index.remove(name);
        }
    }
}
