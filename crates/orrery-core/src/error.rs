//! Error types for orrery-core.

use thiserror::Error;

use crate::graph::CellId;
use crate::state::{ElementId, StateId};

/// Result type for orrery-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in orrery-core.
///
/// Problems with an individual cell (syntax errors, cycles, exceptions) are
/// not `Error`s; they are attached to the cell as
/// [`CellError`](crate::execute::CellError)s and reported to the
/// notification sink.
#[derive(Debug, Error)]
pub enum Error {
    /// Cell not found.
    #[error("cell not found: {0}")]
    CellNotFound(CellId),

    /// The executor can no longer run cells. The kernel must be restarted.
    #[error("executor unavailable: {0}")]
    ExecutorUnavailable(String),

    /// Reactive state not found (already disposed or never created).
    #[error("unknown state: {0}")]
    UnknownState(StateId),

    /// UI element not found (already disposed or never created).
    #[error("unknown UI element: {0}")]
    UnknownElement(ElementId),

    /// The console consumer task has shut down.
    #[error("console channel closed")]
    ConsoleClosed,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid operation (e.g., a view over a non-object value).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl Error {
    /// Whether the kernel can keep serving requests after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ExecutorUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            Error::CellNotFound(CellId::new(2)).to_string(),
            "cell not found: cell_2"
        );
        assert_eq!(
            Error::ExecutorUnavailable("worker exited".into()).to_string(),
            "executor unavailable: worker exited"
        );
        assert_eq!(
            Error::Config("console_capacity must be greater than zero".into()).to_string(),
            "configuration error: console_capacity must be greater than zero"
        );
    }

    #[test]
    fn test_only_executor_loss_is_fatal() {
        assert!(Error::ExecutorUnavailable(String::new()).is_fatal());
        assert!(!Error::ConsoleClosed.is_fatal());
        assert!(!Error::CellNotFound(CellId::new(0)).is_fatal());
    }
}
