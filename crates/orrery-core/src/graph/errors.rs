//! Structural errors detected on the dependency graph.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::engine::DependencyGraph;
use super::types::{CellId, Name};

/// A directed dependency edge, from the defining cell to the reading cell.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Edge {
    pub from: CellId,
    pub to: CellId,
}

impl Edge {
    pub fn new(from: CellId, to: CellId) -> Self {
        Self { from, to }
    }

    /// Endpoints with the smaller id first, ignoring direction.
    fn undirected(&self) -> (CellId, CellId) {
        if self.from <= self.to {
            (self.from, self.to)
        } else {
            (self.to, self.from)
        }
    }
}

/// The edges of one strongly-connected component.
///
/// Edges keep their direction and are stored sorted, so every cell in the
/// component reports the same list. Equality ignores direction: two cycles
/// over the same pairs of cells compare equal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleEdges {
    edges: BTreeSet<Edge>,
}

impl CycleEdges {
    pub fn new(edges: impl IntoIterator<Item = Edge>) -> Self {
        Self {
            edges: edges.into_iter().collect(),
        }
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Every cell touched by the cycle.
    pub fn cells(&self) -> BTreeSet<CellId> {
        self.edges.iter().flat_map(|e| [e.from, e.to]).collect()
    }

    pub fn contains_cell(&self, id: CellId) -> bool {
        self.edges.iter().any(|e| e.from == id || e.to == id)
    }

    fn undirected(&self) -> BTreeSet<(CellId, CellId)> {
        self.edges.iter().map(Edge::undirected).collect()
    }
}

impl PartialEq for CycleEdges {
    fn eq(&self, other: &Self) -> bool {
        self.undirected() == other.undirected()
    }
}

impl Eq for CycleEdges {}

impl Hash for CycleEdges {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.undirected().hash(state);
    }
}

/// An error that prevents a cell from being run.
///
/// Structural errors are derived from the graph and disappear on their own
/// once the offending mutation is undone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphError {
    /// The cell is part of a dependency cycle.
    Cycle { edges: CycleEdges },
    /// Another cell defines the same name.
    MultipleDefinition { name: Name, other_cells: Vec<CellId> },
    /// The cell deletes a name that another cell defines.
    DeleteNonlocal { name: Name, defining_cells: Vec<CellId> },
    /// The cell's source could not be analyzed.
    Syntax { message: String },
}

impl GraphError {
    /// Whether this error comes from analysis rather than graph structure.
    pub fn is_syntax(&self) -> bool {
        matches!(self, GraphError::Syntax { .. })
    }

    /// Cells this error points at.
    ///
    /// For a cycle this is every cell on it, the owner included; the other
    /// variants list only the other cells.
    pub fn involved_cells(&self) -> BTreeSet<CellId> {
        match self {
            GraphError::Cycle { edges } => edges.cells(),
            GraphError::MultipleDefinition { other_cells, .. } => {
                other_cells.iter().copied().collect()
            }
            GraphError::DeleteNonlocal { defining_cells, .. } => {
                defining_cells.iter().copied().collect()
            }
            GraphError::Syntax { .. } => BTreeSet::new(),
        }
    }

    /// Short human-readable description.
    pub fn describe(&self) -> String {
        match self {
            GraphError::Cycle { edges } => {
                let path: Vec<String> = edges
                    .edges()
                    .map(|e| format!("{} -> {}", e.from, e.to))
                    .collect();
                format!("cycle: {}", path.join(", "))
            }
            GraphError::MultipleDefinition { name, other_cells } => format!(
                "'{}' is also defined by {}",
                name,
                join_ids(other_cells)
            ),
            GraphError::DeleteNonlocal {
                name,
                defining_cells,
            } => format!(
                "cannot delete '{}', it is defined by {}",
                name,
                join_ids(defining_cells)
            ),
            GraphError::Syntax { message } => format!("syntax error: {}", message),
        }
    }
}

fn join_ids(ids: &[CellId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Compute cycle, multiple-definition and delete-nonlocal errors over the
/// whole graph.
///
/// Uses the cycles recorded by the last [`DependencyGraph::refresh_cycles`].
pub fn check_for_errors(graph: &DependencyGraph) -> BTreeMap<CellId, Vec<GraphError>> {
    let mut errors: BTreeMap<CellId, Vec<GraphError>> = BTreeMap::new();

    for cycle in graph.cycles() {
        for cell_id in cycle.cells() {
            errors.entry(cell_id).or_default().push(GraphError::Cycle {
                edges: cycle.clone(),
            });
        }
    }

    for (name, definers) in graph.multiply_defined_names() {
        for &cell_id in &definers {
            let other_cells = definers.iter().copied().filter(|&c| c != cell_id).collect();
            errors
                .entry(cell_id)
                .or_default()
                .push(GraphError::MultipleDefinition {
                    name: name.clone(),
                    other_cells,
                });
        }
    }

    for cell in graph.cells_in_order() {
        for name in &cell.deleted_refs {
            let defining_cells: Vec<CellId> = graph
                .defining_cells(name)
                .into_iter()
                .filter(|&c| c != cell.id)
                .collect();
            if !defining_cells.is_empty() {
                errors
                    .entry(cell.id)
                    .or_default()
                    .push(GraphError::DeleteNonlocal {
                        name: name.clone(),
                        defining_cells,
                    });
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: usize) -> CellId {
        CellId::new(n)
    }

    #[test]
    fn test_cycle_equality_ignores_direction() {
        let forward = CycleEdges::new([Edge::new(id(0), id(1)), Edge::new(id(1), id(0))]);
        let single = CycleEdges::new([Edge::new(id(1), id(0))]);
        let reversed = CycleEdges::new([Edge::new(id(0), id(1))]);

        assert_eq!(single, reversed);
        assert_eq!(forward, reversed);
        assert_eq!(forward.cells(), BTreeSet::from([id(0), id(1)]));
    }

    #[test]
    fn test_cycle_edges_are_sorted() {
        let edges = CycleEdges::new([Edge::new(id(2), id(0)), Edge::new(id(0), id(2))]);
        let listed: Vec<_> = edges.edges().copied().collect();
        assert_eq!(listed, vec![Edge::new(id(0), id(2)), Edge::new(id(2), id(0))]);
    }

    #[test]
    fn test_involved_cells() {
        let err = GraphError::MultipleDefinition {
            name: "x".into(),
            other_cells: vec![id(4)],
        };
        assert_eq!(err.involved_cells(), BTreeSet::from([id(4)]));
        let cycle = GraphError::Cycle {
            edges: CycleEdges::new([Edge::new(id(0), id(1)), Edge::new(id(1), id(0))]),
        };
        assert_eq!(cycle.involved_cells(), BTreeSet::from([id(0), id(1)]));
        assert!(GraphError::Syntax { message: "bad".into() }
            .involved_cells()
            .is_empty());
    }

    #[test]
    fn test_describe() {
        let err = GraphError::DeleteNonlocal {
            name: "x".into(),
            defining_cells: vec![id(1), id(2)],
        };
        assert_eq!(
            err.describe(),
            "cannot delete 'x', it is defined by cell_1, cell_2"
        );
    }

    #[test]
    fn test_error_serialization_is_tagged() {
        let err = GraphError::Syntax {
            message: "oops".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "syntax");
        assert_eq!(json["message"], "oops");
    }
}
