//! Results of running a cell.

use serde::{Deserialize, Serialize};

use crate::graph::{CellId, GraphError};

/// Displayable output of a cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// Plain text representation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Structured representation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
}

impl Output {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            json: None,
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self {
            text: None,
            json: Some(value),
        }
    }
}

/// An uncaught exception raised by cell code.
///
/// Opaque to the kernel beyond its type name and message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exception {
    pub type_name: String,
    pub message: String,
}

impl Exception {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Exception {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.type_name)
        } else {
            write!(f, "{}: {}", self.type_name, self.message)
        }
    }
}

/// How a single cell execution ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Ran to completion.
    Completed(Option<Output>),
    /// Raised an uncaught exception.
    Raised(Exception),
    /// Stopped itself on purpose; descendants must not run.
    Stopped(Option<Output>),
    /// Aborted by an interrupt.
    Interrupted,
}

/// Per-run failure attached to a cell.
///
/// Cleared the next time the cell runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionError {
    /// The cell itself raised.
    ExceptionRaised { exception_type: String, message: String },
    /// The cell was interrupted, or cancelled by an interrupt.
    Interrupted,
    /// An ancestor stopped on purpose.
    AncestorStopped { stopping_cell: CellId },
    /// An ancestor raised.
    AncestorRaised {
        raising_cell: CellId,
        exception_type: String,
    },
}

impl ExecutionError {
    /// Whether the cell was skipped because of another cell.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            ExecutionError::AncestorStopped { .. } | ExecutionError::AncestorRaised { .. }
        )
    }

    pub fn describe(&self) -> String {
        match self {
            ExecutionError::ExceptionRaised {
                exception_type,
                message,
            } if message.is_empty() => exception_type.clone(),
            ExecutionError::ExceptionRaised {
                exception_type,
                message,
            } => format!("{}: {}", exception_type, message),
            ExecutionError::Interrupted => "interrupted".to_string(),
            ExecutionError::AncestorStopped { stopping_cell } => {
                format!("ancestor {} stopped", stopping_cell)
            }
            ExecutionError::AncestorRaised {
                raising_cell,
                exception_type,
            } => format!("ancestor {} raised {}", raising_cell, exception_type),
        }
    }
}

impl From<&Exception> for ExecutionError {
    fn from(exception: &Exception) -> Self {
        ExecutionError::ExceptionRaised {
            exception_type: exception.type_name.clone(),
            message: exception.message.clone(),
        }
    }
}

/// Any error shown on a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellError {
    Graph(GraphError),
    Execution(ExecutionError),
}

impl CellError {
    pub fn describe(&self) -> String {
        match self {
            CellError::Graph(e) => e.describe(),
            CellError::Execution(e) => e.describe(),
        }
    }
}

impl From<GraphError> for CellError {
    fn from(e: GraphError) -> Self {
        CellError::Graph(e)
    }
}

impl From<ExecutionError> for CellError {
    fn from(e: ExecutionError) -> Self {
        CellError::Execution(e)
    }
}
