//! Treedeploy CLI - deployment lifecycle for image-based hosts
//!
//! Entry point for the treedeploy command-line application.

use anyhow::Result;
use clap::Parser;

use treedeploy::cli::output::{display_error, OutputConfig};
use treedeploy::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Flags only: settings may fail to load, and that error must be visible
    OutputConfig::new(cli.quiet, cli.json, cli.verbose).init_tracing();

    // Run the command and handle errors
    match cli.run().await {
        Ok(()) => Ok(()),
        Err(e) => {
            display_error(&e);
            std::process::exit(1);
        }
    }
}
