//! Reactive execution core for orrery notebooks.
//!
//! This crate provides:
//! - Dependency graph over cells, built from the names they define and read
//! - Structural error detection (cycles, multiple definitions, deletions)
//! - Mutation batches with conservative error attribution
//! - Run passes with cancellation, stopping and interruption
//! - Reactive state, UI elements and views that re-trigger their readers
//! - Notifications and console routing for front ends
//!
//! Cell code is opaque to the kernel: an [`Analyzer`] extracts names and an
//! [`Executor`] runs it.

pub mod analyze;
pub mod config;
pub mod console;
pub mod error;
pub mod events;
pub mod execute;
pub mod graph;
pub mod kernel;
pub mod mutate;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use analyze::{Analyzer, CellAnalysis, SyntaxError};
pub use config::{KernelConfig, OnCellChange};
pub use console::{ConsoleHandle, ConsoleMessage, ConsoleRouter, Stream};
pub use error::{Error, Result};
pub use events::{
    BroadcastSink, Notification, NotificationSink, NullSink, RecordingSink, VariableDeclaration,
};
pub use execute::{
    CellError, Exception, ExecutionError, ExecutionOutcome, ExecutionRequest, Executor,
    InterruptHandle, Output, RunContext, RunReport,
};
pub use graph::{
    Cell, CellConfig, CellId, CellStatus, CycleEdges, DependencyGraph, Edge, GraphError, Name,
    VariableKind,
};
pub use kernel::Kernel;
pub use mutate::{MutationBatch, MutationOutcome, Orchestrator};
pub use state::{ElementId, Namespace, StateId, Value, WriteOrigin};
