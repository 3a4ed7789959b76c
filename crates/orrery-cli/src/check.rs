//! Check command implementation.
//!
//! Analyzes every cell and reports structural errors without running
//! anything.

use std::path::Path;

use orrery_calc::CalcAnalyzer;
use orrery_core::{CellId, DependencyGraph, GraphError, Orchestrator};

use crate::colors;
use crate::notebook::Notebook;

/// Dependency graph and structural errors of a whole notebook.
pub struct Analysis {
    pub graph: DependencyGraph,
    pub orchestrator: Orchestrator,
}

impl Analysis {
    pub fn of(notebook: &Notebook) -> Self {
        let mut graph = DependencyGraph::new();
        let mut orchestrator = Orchestrator::new();
        let outcome = orchestrator.apply(&mut graph, &CalcAnalyzer::new(), notebook.batch());
        tracing::debug!(
            cells = outcome.registered.len(),
            errored = orchestrator.errored_cells().len(),
            "Analyzed notebook"
        );
        Self {
            graph,
            orchestrator,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = (&CellId, &Vec<GraphError>)> {
        self.orchestrator
            .errors()
            .iter()
            .filter(|(_, errors)| !errors.is_empty())
    }
}

pub fn execute(notebook_path: &str) -> anyhow::Result<()> {
    let notebook = Notebook::load(Path::new(notebook_path))?;
    let analysis = Analysis::of(&notebook);

    let mut failing = 0;
    for (id, errors) in analysis.errors() {
        failing += 1;
        let line = notebook.cell(*id).map(|c| c.line).unwrap_or_default();
        for error in errors {
            println!(
                "{}error{} {} (line {}): {}",
                colors::RED,
                colors::RESET,
                id,
                line,
                error.describe()
            );
        }
    }

    if failing > 0 {
        anyhow::bail!(
            "{} of {} cells have structural errors",
            failing,
            notebook.cells.len()
        );
    }

    println!(
        "{}OK{} {} cells, no structural errors",
        colors::GREEN,
        colors::RESET,
        notebook.cells.len()
    );
    Ok(())
}
