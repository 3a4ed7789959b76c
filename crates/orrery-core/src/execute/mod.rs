//! Execution engine for orrery notebooks.
//!
//! The kernel does not evaluate code itself. An [`Executor`] runs one cell
//! against the shared [`Namespace`]; the [`Runner`] drives executors through
//! a run pass and turns their outcomes into statuses, errors and
//! notifications.
//!
//! # Architecture
//!
//! ```text
//! Kernel
//!     │
//!     └── Runner (one pass, topological order)
//!             │
//!             ├── RunContext (states, elements, console, interrupt)
//!             │
//!             └── Executor::execute → ExecutionOutcome
//!                     │
//!                     ├── Completed → bindings published
//!                     ├── Raised    → descendants cancelled
//!                     ├── Stopped   → descendants cancelled
//!                     └── Interrupted → rest of pass cancelled
//! ```

mod context;
mod outcome;
mod runner;

use std::collections::BTreeSet;

pub use context::{InterruptHandle, RunContext};
pub use outcome::{CellError, Exception, ExecutionError, ExecutionOutcome, Output};
pub use runner::{RunEnv, RunReport, Runner};

use crate::error::Result;
use crate::graph::{CellId, Name};
use crate::state::Namespace;

/// What the runner asks an executor to run.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionRequest<'a> {
    pub cell_id: CellId,
    pub code: &'a str,
    /// Names the cell is expected to bind.
    pub defs: &'a BTreeSet<Name>,
    /// Names the cell reads.
    pub refs: &'a BTreeSet<Name>,
}

/// Runs cell code.
///
/// Cell-level failures (exceptions, stops, interrupts) are reported through
/// [`ExecutionOutcome`]. An `Err` means the executor itself is gone and the
/// kernel cannot continue.
pub trait Executor: Send {
    fn execute(
        &mut self,
        request: &ExecutionRequest<'_>,
        namespace: &mut Namespace,
        ctx: &mut RunContext<'_>,
    ) -> Result<ExecutionOutcome>;
}
