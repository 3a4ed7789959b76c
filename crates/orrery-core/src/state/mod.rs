//! Runtime state for a kernel.
//!
//! This module provides:
//! - The shared namespace cells read from and write to
//! - Reactive state objects with write tracking
//! - UI elements, views, and their name bindings

mod element;
mod namespace;
mod reactive;

use std::collections::BTreeSet;

pub use element::{BindingProvider, Bindings, ElementId, ElementRegistry};
pub use namespace::{Namespace, Value};
pub use reactive::{StateId, StateRegistry, StateWrite, WriteOrigin};

use crate::graph::{CellId, Name};

/// Drop what a cell contributed at runtime: its bindings (except those in
/// `keep`) and every state and UI element it owns.
pub fn release_cell(
    namespace: &mut Namespace,
    states: &mut StateRegistry,
    elements: &mut ElementRegistry,
    cell_id: CellId,
    defs: &BTreeSet<Name>,
    keep: &BTreeSet<Name>,
) {
    let removed = namespace.invalidate(defs, keep);
    let disposed_states = states.dispose(cell_id);
    let disposed_elements = elements.dispose(cell_id);
    if removed > 0 || !disposed_states.is_empty() || !disposed_elements.is_empty() {
        tracing::trace!(
            cell = %cell_id,
            bindings = removed,
            states = disposed_states.len(),
            elements = disposed_elements.len(),
            "released cell"
        );
    }
}
