//! Notebook files.
//!
//! A notebook is a plain calc file split into cells by `# %%` marker lines.
//! Cells are numbered from zero in file order; empty cells are skipped.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use orrery_core::{CellId, MutationBatch};

const CELL_MARKER: &str = "# %%";

/// One cell of a notebook file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotebookCell {
    pub id: CellId,
    /// 1-based line of the first source line.
    pub line: usize,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct Notebook {
    pub path: PathBuf,
    pub cells: Vec<NotebookCell>,
}

impl Notebook {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            anyhow::bail!("Notebook not found: {}", path.display());
        }
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            cells: split_cells(&source),
        })
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }

    pub fn cell(&self, id: CellId) -> Option<&NotebookCell> {
        self.cells.iter().find(|c| c.id == id)
    }

    /// Every cell registered in one batch.
    pub fn batch(&self) -> MutationBatch {
        self.cells
            .iter()
            .fold(MutationBatch::new(), |batch, cell| {
                batch.register(cell.id, cell.code.clone())
            })
    }
}

fn is_marker(line: &str) -> bool {
    line.trim_start().starts_with(CELL_MARKER)
}

pub fn split_cells(source: &str) -> Vec<NotebookCell> {
    let mut cells = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut start = 1;

    let mut flush = |lines: &mut Vec<&str>, start: usize| {
        let code = lines.join("\n");
        if !code.trim().is_empty() {
            let offset = lines.iter().take_while(|l| l.trim().is_empty()).count();
            cells.push(NotebookCell {
                id: CellId::new(cells.len()),
                line: start + offset,
                code: code.trim().to_string(),
            });
        }
        lines.clear();
    };

    for (index, line) in source.lines().enumerate() {
        if is_marker(line) {
            flush(&mut current, start);
            start = index + 2;
        } else {
            current.push(line);
        }
    }
    flush(&mut current, start);

    cells
}
