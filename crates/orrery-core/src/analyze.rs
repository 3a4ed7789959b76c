//! Static analysis interface.
//!
//! The kernel never parses cell source itself. An [`Analyzer`] turns source
//! code into the names the cell defines and reads, and the graph is built
//! from that.

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::{Name, VariableKind};

/// Names extracted from a cell's source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellAnalysis {
    /// Names assigned at the cell's top level.
    pub defs: BTreeSet<Name>,
    /// Names read but not defined by the cell.
    pub refs: BTreeSet<Name>,
    /// Names removed from the namespace (e.g. `del x`).
    pub deleted_refs: BTreeSet<Name>,
    /// Kind of each defined name.
    pub variable_kinds: BTreeMap<Name, VariableKind>,
}

impl CellAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add plain variable definitions.
    pub fn with_defs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Name>,
    {
        for name in names {
            let name = name.into();
            self.variable_kinds
                .entry(name.clone())
                .or_insert(VariableKind::Variable);
            self.defs.insert(name);
        }
        self
    }

    /// Add references.
    pub fn with_refs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Name>,
    {
        self.refs.extend(names.into_iter().map(Into::into));
        self
    }

    /// Add deleted names.
    pub fn with_deleted_refs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Name>,
    {
        self.deleted_refs.extend(names.into_iter().map(Into::into));
        self
    }

    /// Record a definition with an explicit kind.
    pub fn define(&mut self, name: impl Into<Name>, kind: VariableKind) {
        let name = name.into();
        self.variable_kinds.insert(name.clone(), kind);
        self.defs.insert(name);
    }
}

/// Source code that could not be analyzed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}{}", line.map(|l| format!(" (line {})", l)).unwrap_or_default())]
pub struct SyntaxError {
    pub message: String,
    /// 1-based line of the offending statement, when known.
    pub line: Option<usize>,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

/// Extracts defs and refs from cell source code.
pub trait Analyzer {
    /// Analyze `code`, or report why it cannot be parsed.
    fn analyze(&self, code: &str) -> Result<CellAnalysis, SyntaxError>;
}

impl<F> Analyzer for F
where
    F: Fn(&str) -> Result<CellAnalysis, SyntaxError>,
{
    fn analyze(&self, code: &str) -> Result<CellAnalysis, SyntaxError> {
        self(code)
    }
}
