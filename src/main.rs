//! # Application Entry Point
//!
//! Parse the CLI, set up tracing, dispatch to the pipeline for the
//! chosen subcommand and map failures to a non-zero exit code.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use pangene::config::{Cli, Command};
use pangene::pipelines;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_and_validate().context("invalid arguments")?;

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match &cli.command {
        Command::Index(args) => pipelines::index::run(args).context("index pipeline failed")?,
        Command::Map(args) => pipelines::map::run(args).context("map pipeline failed")?,
        Command::Compare(args) => {
            pipelines::compare::run(args).context("compare pipeline failed")?
        }
    }
    Ok(())
}
