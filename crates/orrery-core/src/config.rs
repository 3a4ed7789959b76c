//! Kernel configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default capacity of the console output queue.
pub const DEFAULT_CONSOLE_CAPACITY: usize = 1024;

/// What happens to the descendants of a cell that was edited or triggered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnCellChange {
    /// Re-run every affected descendant.
    #[default]
    Autorun,
    /// Run only the requested cells and mark descendants stale.
    Lazy,
}

/// Runtime options for a [`Kernel`](crate::Kernel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub on_cell_change: OnCellChange,
    /// Pending console writes kept before output is dropped.
    pub console_capacity: usize,
    /// Whether states created without an explicit policy may re-trigger
    /// the cell that set them.
    pub allow_self_loops_by_default: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            on_cell_change: OnCellChange::Autorun,
            console_capacity: DEFAULT_CONSOLE_CAPACITY,
            allow_self_loops_by_default: false,
        }
    }
}

impl KernelConfig {
    pub fn lazy() -> Self {
        Self {
            on_cell_change: OnCellChange::Lazy,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.console_capacity == 0 {
            return Err(Error::Config(
                "console_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_lazy(&self) -> bool {
        self.on_cell_change == OnCellChange::Lazy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KernelConfig::default();
        assert_eq!(config.on_cell_change, OnCellChange::Autorun);
        assert_eq!(config.console_capacity, DEFAULT_CONSOLE_CAPACITY);
        assert!(config.validate().is_ok());
        assert!(!config.is_lazy());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = KernelConfig {
            console_capacity: 0,
            ..KernelConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_partial_deserialization() {
        let config: KernelConfig = serde_json::from_str(r#"{"on_cell_change": "lazy"}"#).unwrap();
        assert!(config.is_lazy());
        assert_eq!(config.console_capacity, DEFAULT_CONSOLE_CAPACITY);
    }
}
