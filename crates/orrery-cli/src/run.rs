//! Run command implementation.
//!
//! Registers every cell of a notebook in one batch, runs it to completion
//! and prints outputs, variables and errors.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use orrery_core::{
    ConsoleRouter, KernelConfig, Notification, NotificationSink, RecordingSink, RunReport, Stream,
};

use crate::colors;
use crate::notebook::Notebook;

/// Execute a notebook.
pub async fn execute(notebook_path: &str, config: KernelConfig) -> anyhow::Result<()> {
    let start = Instant::now();
    let notebook = Notebook::load(Path::new(notebook_path))?;

    println!(
        "\n{}Running{} {}{}{} ({} cells)",
        colors::BOLD,
        colors::RESET,
        colors::CYAN,
        notebook.name(),
        colors::RESET,
        notebook.cells.len()
    );
    println!("{}", colors::rule());

    if notebook.cells.is_empty() {
        println!("{}No cells found in notebook.{}", colors::YELLOW, colors::RESET);
        println!("Cells are separated by `# %%` lines");
        return Ok(());
    }

    // Console output is printed as it arrives.
    let console_sink: Arc<dyn NotificationSink> = Arc::new(|notification: Notification| {
        if let Notification::ConsoleOutput { stream, text, .. } = notification {
            match stream {
                Stream::Stdout => print!("{}", text),
                Stream::Stderr => eprint!("{}", text),
            }
        }
    });
    let (console, router) = ConsoleRouter::spawn(config.console_capacity, console_sink);

    let sink = Arc::new(RecordingSink::new());
    let mut kernel = orrery_calc::kernel(config, sink.clone())?.with_console(console);

    let interrupt = kernel.interrupt_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt requested");
            interrupt.interrupt();
        }
    });

    let batch = notebook.batch();
    let (kernel, result) = tokio::task::spawn_blocking(move || {
        let result = kernel.run(batch);
        (kernel, result)
    })
    .await?;
    ctrl_c.abort();

    let report = result?;
    let variables = kernel.variables();
    let values: Vec<(String, Option<serde_json::Value>)> = variables
        .iter()
        .map(|v| (v.name.clone(), kernel.value(&v.name)))
        .collect();
    let errors = kernel.errors();
    let stale = kernel.graph().stale_cells();

    // Dropping the kernel closes the console channel so the router drains.
    drop(kernel);
    router.await?;

    print_outputs(&sink, &notebook);

    println!("\n{}Variables:{}", colors::BOLD, colors::RESET);
    println!("{}", colors::rule());
    for (name, value) in &values {
        match value {
            Some(value) => println!("{} = {}", name, value),
            None => println!("{} {}(unbound){}", name, colors::DIM, colors::RESET),
        }
    }

    if !stale.is_empty() {
        let ids: Vec<String> = stale.iter().map(ToString::to_string).collect();
        println!(
            "\n{}Stale:{} {}",
            colors::YELLOW,
            colors::RESET,
            ids.join(", ")
        );
    }

    if !errors.is_empty() {
        println!("\n{}Errors:{}", colors::BOLD, colors::RESET);
        println!("{}", colors::rule());
        for (id, cell_errors) in &errors {
            let line = notebook.cell(*id).map(|c| c.line).unwrap_or_default();
            for error in cell_errors {
                println!(
                    "{}{}{} (line {}): {}",
                    colors::RED,
                    id,
                    colors::RESET,
                    line,
                    error.describe()
                );
            }
        }
    }

    print_summary(&report, errors.len(), start);

    if !errors.is_empty() {
        anyhow::bail!("{} cells failed", errors.len());
    }
    Ok(())
}

fn print_outputs(sink: &RecordingSink, notebook: &Notebook) {
    let outputs: Vec<_> = sink
        .snapshot()
        .into_iter()
        .filter_map(|n| match n {
            Notification::CellOutput { cell_id, output } => Some((cell_id, output)),
            _ => None,
        })
        .collect();
    if outputs.is_empty() {
        return;
    }

    println!("\n{}Outputs:{}", colors::BOLD, colors::RESET);
    println!("{}", colors::rule());
    for (cell_id, output) in outputs {
        let line = notebook.cell(cell_id).map(|c| c.line).unwrap_or_default();
        if let Some(text) = output.text {
            println!("{}[{} line {}]{} {}", colors::DIM, cell_id, line, colors::RESET, text);
        }
    }
}

fn print_summary(report: &RunReport, failed: usize, start: Instant) {
    println!("\n{}", colors::rule());
    let (color, label) = if failed == 0 {
        (colors::GREEN, "Completed")
    } else {
        (colors::RED, "Failed")
    };
    println!(
        "{}{}{} {} cells in {:.2}s ({} cancelled, {} with errors)",
        color,
        label,
        colors::RESET,
        report.ran.len(),
        start.elapsed().as_secs_f64(),
        report.cancelled.len(),
        failed
    );
    if report.interrupted {
        println!("{}Run was interrupted{}", colors::YELLOW, colors::RESET);
    }
}
