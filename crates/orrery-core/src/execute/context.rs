//! Execution context for orrery cells.
//!
//! Provides cooperative cancellation and the services cell code may call
//! while it runs: reactive state, UI elements and console output.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::console::{ConsoleHandle, Stream};
use crate::error::Result;
use crate::graph::CellId;
use crate::state::{ElementId, ElementRegistry, StateId, StateRegistry, WriteOrigin};

/// Handle for cooperative interruption of a run pass.
///
/// `InterruptHandle` can be cloned and shared across threads; any clone can
/// trigger the interrupt, which is visible to all other clones. The runner
/// checks it between cells and executors may poll it inside long cells.
/// The kernel clears it when a new request starts.
///
/// # Example
///
/// ```
/// use orrery_core::execute::InterruptHandle;
///
/// let handle = InterruptHandle::new();
/// let handle_clone = handle.clone();
///
/// assert!(!handle.is_interrupted());
///
/// // Trigger from any clone
/// handle_clone.interrupt();
///
/// assert!(handle.is_interrupted());
/// ```
#[derive(Clone, Default, Debug)]
pub struct InterruptHandle {
    interrupted: Arc<AtomicBool>,
}

impl InterruptHandle {
    /// Create a new interrupt handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if an interrupt has been requested.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Request an interrupt.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    /// Clear the interrupt flag.
    ///
    /// Called at the start of every run pass.
    pub fn reset(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }
}

/// Services available to cell code during one execution.
///
/// Every write made through the context is attributed to the running cell.
pub struct RunContext<'a> {
    cell_id: CellId,
    states: &'a mut StateRegistry,
    elements: &'a mut ElementRegistry,
    interrupt: &'a InterruptHandle,
    console: Option<&'a ConsoleHandle>,
    allow_self_loops_by_default: bool,
}

impl<'a> RunContext<'a> {
    pub(crate) fn new(
        cell_id: CellId,
        states: &'a mut StateRegistry,
        elements: &'a mut ElementRegistry,
        interrupt: &'a InterruptHandle,
        console: Option<&'a ConsoleHandle>,
        allow_self_loops_by_default: bool,
    ) -> Self {
        Self {
            cell_id,
            states,
            elements,
            interrupt,
            console,
            allow_self_loops_by_default,
        }
    }

    /// The running cell.
    pub fn cell_id(&self) -> CellId {
        self.cell_id
    }

    /// Whether the current pass has been interrupted.
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_interrupted()
    }

    /// Create a state owned by the running cell, using the kernel's default
    /// self-loop policy.
    pub fn create_state(&mut self, initial: serde_json::Value) -> StateId {
        let allow = self.allow_self_loops_by_default;
        self.create_state_with(initial, allow)
    }

    /// Create a state owned by the running cell.
    pub fn create_state_with(
        &mut self,
        initial: serde_json::Value,
        allow_self_loops: bool,
    ) -> StateId {
        self.states
            .create(Some(self.cell_id), initial, allow_self_loops)
    }

    /// Current value of a state.
    pub fn state_value(&self, id: StateId) -> Result<&serde_json::Value> {
        self.states.value(id)
    }

    /// Write a state on behalf of the running cell.
    pub fn set_state(&mut self, id: StateId, value: serde_json::Value) -> Result<()> {
        self.states
            .set(id, value, WriteOrigin::Cell(self.cell_id))
            .map(|_| ())
    }

    /// Create a UI element owned by the running cell.
    pub fn create_element(&mut self, initial: serde_json::Value) -> ElementId {
        self.elements.create(Some(self.cell_id), initial)
    }

    /// Create a view onto `key` of another element.
    pub fn create_view(&mut self, parent: ElementId, key: impl Into<String>) -> Result<ElementId> {
        self.elements.create_view(Some(self.cell_id), parent, key)
    }

    /// Current value of a UI element.
    pub fn element_value(&self, id: ElementId) -> Result<serde_json::Value> {
        self.elements.value(id)
    }

    /// Write console output tagged with the running cell.
    pub fn print(&self, stream: Stream, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        match self.console {
            Some(console) => console.write(self.cell_id, stream, text),
            None => {
                tracing::debug!(cell = %self.cell_id, ?stream, "{}", text);
                Ok(())
            }
        }
    }
}
