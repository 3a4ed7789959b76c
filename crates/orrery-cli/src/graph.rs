//! Graph command implementation.
//!
//! Prints the dependency edges between cells and any cycles.

use std::collections::BTreeSet;
use std::path::Path;

use orrery_core::{CellId, CycleEdges, DependencyGraph, Name};
use serde::Serialize;

use crate::check::Analysis;
use crate::colors;
use crate::notebook::Notebook;

#[derive(Debug, Serialize)]
struct CellView {
    id: CellId,
    line: usize,
    defs: BTreeSet<Name>,
    refs: BTreeSet<Name>,
}

#[derive(Debug, Serialize)]
struct EdgeView {
    from: CellId,
    to: CellId,
    /// Names carried along the edge.
    names: Vec<Name>,
}

#[derive(Debug, Serialize)]
struct GraphView {
    cells: Vec<CellView>,
    edges: Vec<EdgeView>,
    cycles: Vec<CycleEdges>,
}

impl GraphView {
    fn build(graph: &DependencyGraph, notebook: &Notebook) -> Self {
        let cells = graph
            .cells_in_order()
            .into_iter()
            .map(|cell| CellView {
                id: cell.id,
                line: notebook.cell(cell.id).map(|c| c.line).unwrap_or_default(),
                defs: cell.defs.clone(),
                refs: cell.refs.clone(),
            })
            .collect();

        let mut edges = Vec::new();
        for cell in graph.cells_in_order() {
            for &child_id in graph.children(cell.id) {
                let Some(child) = graph.get(child_id) else {
                    continue;
                };
                let names = cell
                    .defs
                    .iter()
                    .filter(|name| child.depends_on(name))
                    .cloned()
                    .collect();
                edges.push(EdgeView {
                    from: cell.id,
                    to: child_id,
                    names,
                });
            }
        }

        Self {
            cells,
            edges,
            cycles: graph.cycles().to_vec(),
        }
    }
}

pub fn execute(notebook_path: &str, json: bool) -> anyhow::Result<()> {
    let notebook = Notebook::load(Path::new(notebook_path))?;
    let analysis = Analysis::of(&notebook);
    let view = GraphView::build(&analysis.graph, &notebook);

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("{}Cells{}", colors::BOLD, colors::RESET);
    println!("{}", colors::rule());
    for cell in &view.cells {
        println!(
            "{} {}(line {}){} defines [{}] reads [{}]",
            cell.id,
            colors::DIM,
            cell.line,
            colors::RESET,
            join(&cell.defs),
            join(&cell.refs)
        );
    }

    println!("\n{}Edges{}", colors::BOLD, colors::RESET);
    println!("{}", colors::rule());
    if view.edges.is_empty() {
        println!("{}(none){}", colors::DIM, colors::RESET);
    }
    for edge in &view.edges {
        println!("{} -> {} ({})", edge.from, edge.to, edge.names.join(", "));
    }

    if !view.cycles.is_empty() {
        println!("\n{}Cycles{}", colors::BOLD, colors::RESET);
        println!("{}", colors::rule());
        for cycle in &view.cycles {
            let path: Vec<String> = cycle
                .edges()
                .map(|e| format!("{} -> {}", e.from, e.to))
                .collect();
            println!("{}{}{}", colors::YELLOW, path.join(", "), colors::RESET);
        }
    }

    Ok(())
}

fn join<'a>(names: impl IntoIterator<Item = &'a Name>) -> String {
    names
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
