//! soundlake CLI - run or inspect the star-schema ETL.
//!
//! The main entry point for the `soundlake` binary.

use anyhow::{Context, Result};
use clap::Parser;

use soundlake_cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();
    soundlake_core::init_logging(cli.log_format.into());
    soundlake_etl::metrics::register_metrics();

    let config = cli.config().context("Invalid storage configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async {
        match cli.command {
            Commands::Run(args) => soundlake_cli::commands::run::execute(args, &config).await,
            Commands::Inspect(args) => {
                soundlake_cli::commands::inspect::execute(args, &config).await
            }
        }
    });

    if let Err(e) = &result {
        tracing::error!(error = %format!("{e:#}"), "command failed");
    }
    result
}
