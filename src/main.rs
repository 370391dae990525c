//! Kolosal IDS - Main Entry Point
//!
//! Trains and evaluates the flow classifier from the command line.

use clap::Parser;
use kolosal_ids::cli::{cmd_run, Cli};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kolosal_ids=info".into()),
        )
        .init();

    let cli = Cli::parse();
    cmd_run(&cli)?;

    Ok(())
}
