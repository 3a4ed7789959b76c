//! Orrery CLI - headless front end for reactive calc notebooks.

mod check;
mod colors;
mod graph;
mod notebook;
mod run;
mod settings;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "orrery")]
#[command(about = "Reactive notebook kernel for calc notebooks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Kernel configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a notebook headlessly
    Run {
        /// Path to the notebook
        notebook: String,

        /// Mark descendants of changed cells stale instead of running them
        #[arg(long)]
        lazy: bool,
    },

    /// Report structural errors without running any cell
    Check {
        /// Path to the notebook
        notebook: String,
    },

    /// Print the dependency graph
    Graph {
        /// Path to the notebook
        notebook: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run { notebook, lazy } => {
            let config = settings::load(cli.config.as_deref())?;
            run::execute(&notebook, settings::with_overrides(config, lazy)).await?;
        }

        Commands::Check { notebook } => check::execute(&notebook)?,

        Commands::Graph { notebook, json } => graph::execute(&notebook, json)?,
    }

    Ok(())
}
