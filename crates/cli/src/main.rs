//! pagewarp entry point.
//!
//! Walks a site through a navigation session with a headless platform and
//! prints the session summary as JSON on stdout. Logging goes to stderr.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod driver;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = cli::Cli::parse();
    tracing::info!(origin = %cli.origin, paths = cli.paths.len(), "starting pagewarp session");

    let report = driver::run(&cli).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
