//! Dependency graph over notebook cells.
//!
//! This module provides:
//! - Cell records built from analyzed source
//! - Edge maintenance from defined/referenced names
//! - Cycle, multiple-definition and delete-nonlocal detection
//! - Transitive closure and topological ordering
//! - Disabled / stale status propagation

mod engine;
mod errors;
mod types;

pub use engine::DependencyGraph;
pub use errors::{CycleEdges, Edge, GraphError, check_for_errors};
pub use types::{Cell, CellConfig, CellId, CellStatus, CodeFingerprint, Name, VariableKind};
