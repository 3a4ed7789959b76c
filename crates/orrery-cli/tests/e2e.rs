//! End-to-end tests for the orrery CLI.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin for tests

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

/// A notebook file in its own temporary directory.
struct TestNotebook {
    temp_dir: TempDir,
    notebook_path: PathBuf,
}

impl TestNotebook {
    fn new(source: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let notebook_path = temp_dir.path().join("notebook.calc");
        fs::write(&notebook_path, source).expect("Failed to write notebook");

        Self {
            temp_dir,
            notebook_path,
        }
    }

    fn path(&self) -> &str {
        self.notebook_path.to_str().unwrap()
    }

    fn write_config(&self, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join("config.toml");
        fs::write(&path, contents).expect("Failed to write config");
        path
    }

    /// The binary, isolated from any user configuration.
    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("orrery").expect("Failed to find orrery binary");
        cmd.env("XDG_CONFIG_HOME", self.temp_dir.path());
        cmd
    }
}

const SIMPLE: &str = "x = 1\n# %%\ny = x + 1\n# %%\nz = x + y\nz * 10\n";

// =============================================================================
// run
// =============================================================================

#[test]
fn test_run_nonexistent_notebook() {
    Command::cargo_bin("orrery")
        .unwrap()
        .args(["run", "/nonexistent/notebook.calc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Notebook not found"));
}

#[test]
fn test_run_simple_notebook() {
    let notebook = TestNotebook::new(SIMPLE);

    notebook
        .command()
        .args(["run", notebook.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 cells"))
        .stdout(predicate::str::contains("x = 1"))
        .stdout(predicate::str::contains("y = 2"))
        .stdout(predicate::str::contains("z = 3"))
        .stdout(predicate::str::contains("30"))
        .stdout(predicate::str::contains("Completed"));
}

#[test]
fn test_run_prints_console_output() {
    let notebook = TestNotebook::new("name = \"orrery\"\nprint \"hello \" + name\n");

    notebook
        .command()
        .args(["run", notebook.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello orrery"));
}

#[test]
fn test_run_reports_exceptions_and_cancellations() {
    let notebook = TestNotebook::new("a = 1\n# %%\nb = a / 0\n# %%\nc = b + 1\n# %%\nd = a + 1\n");

    notebook
        .command()
        .args(["run", notebook.path()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("ZeroDivisionError: division by zero"))
        .stdout(predicate::str::contains("ancestor cell_1 raised ZeroDivisionError"))
        .stdout(predicate::str::contains("d = 2"))
        .stderr(predicate::str::contains("2 cells failed"));
}

#[test]
fn test_run_empty_notebook() {
    let notebook = TestNotebook::new("# %%\n\n# %%\n");

    notebook
        .command()
        .args(["run", notebook.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("No cells found"));
}

#[test]
fn test_run_with_config_file() {
    let notebook = TestNotebook::new(SIMPLE);
    let config = notebook.write_config("on_cell_change = \"lazy\"\nconsole_capacity = 4\n");

    notebook
        .command()
        .args(["run", notebook.path(), "--config", config.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("z = 3"));
}

#[test]
fn test_run_with_invalid_config() {
    let notebook = TestNotebook::new(SIMPLE);
    let config = notebook.write_config("console_capacity = 0\n");

    notebook
        .command()
        .args(["run", notebook.path(), "--config", config.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid config"));
}

#[test]
fn test_run_lazy_flag() {
    let notebook = TestNotebook::new(SIMPLE);

    notebook
        .command()
        .args(["run", "--lazy", notebook.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("y = 2"));
}

// =============================================================================
// check
// =============================================================================

#[test]
fn test_check_clean_notebook() {
    let notebook = TestNotebook::new(SIMPLE);

    notebook
        .command()
        .args(["check", notebook.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("no structural errors"));
}

#[test]
fn test_check_multiple_definition() {
    let notebook = TestNotebook::new("x = 1\n# %%\nx = 2\n");

    notebook
        .command()
        .args(["check", notebook.path()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("'x' is also defined by cell_1"))
        .stdout(predicate::str::contains("'x' is also defined by cell_0"))
        .stderr(predicate::str::contains("2 of 2 cells"));
}

#[test]
fn test_check_cycle_and_syntax_error() {
    let notebook = TestNotebook::new("x = y\n# %%\ny = x\n# %%\nz = (\n");

    notebook
        .command()
        .args(["check", notebook.path()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("cycle"))
        .stdout(predicate::str::contains("syntax error"));
}

#[test]
fn test_check_does_not_run_cells() {
    let notebook = TestNotebook::new("print \"side effect\"\n");

    notebook
        .command()
        .args(["check", notebook.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("side effect").not());
}

// =============================================================================
// graph
// =============================================================================

#[test]
fn test_graph_prints_edges() {
    let notebook = TestNotebook::new(SIMPLE);

    notebook
        .command()
        .args(["graph", notebook.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("cell_0 -> cell_1 (x)"))
        .stdout(predicate::str::contains("cell_1 -> cell_2 (y)"));
}

#[test]
fn test_graph_json() {
    let notebook = TestNotebook::new("a = 1\n# %%\nb = a\n# %%\nc = d\n# %%\nd = c\n");

    let output = notebook
        .command()
        .args(["graph", "--json", notebook.path()])
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("graph --json should print JSON");
    assert_eq!(json["cells"].as_array().unwrap().len(), 4);
    assert_eq!(json["edges"][0]["from"], 0);
    assert_eq!(json["edges"][0]["to"], 1);
    assert_eq!(json["edges"][0]["names"][0], "a");
    assert_eq!(json["cycles"].as_array().unwrap().len(), 1);
}
