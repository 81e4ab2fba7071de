//! Inspect command - summarize written tables.

use anyhow::{Context, Result};
use clap::Args;
use soundlake_core::StorageLocation;

use crate::{Config, OutputFormat};

/// Arguments for the inspect command.
#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Output root to inspect.
    #[arg(long, env = "SOUNDLAKE_OUTPUT")]
    pub output: String,
}

/// Execute the inspect command.
///
/// # Errors
///
/// Returns an error if the location cannot be opened or a table file cannot
/// be decoded.
pub async fn execute(args: InspectArgs, config: &Config) -> Result<()> {
    let storage = StorageLocation::parse(&args.output)
        .and_then(|location| location.open(&config.storage, false))
        .with_context(|| format!("Failed to open {}", args.output))?;

    let tables = soundlake_etl::inspect::inspect(&storage)
        .await
        .context("Failed to inspect tables")?;

    match config.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&tables).context("Failed to serialize tables")?
            );
        }
        OutputFormat::Text => {
            println!("{}", storage.display());
            println!();
            println!(
                "  {:<10} {:>8} {:>10} {:>8} {:>11}",
                "TABLE", "COMPLETE", "ROWS", "FILES", "PARTITIONS"
            );
            for table in &tables {
                println!(
                    "  {:<10} {:>8} {:>10} {:>8} {:>11}",
                    table.table.name(),
                    if table.complete { "yes" } else { "no" },
                    table.rows,
                    table.files,
                    table.partitions
                );
            }
        }
    }

    Ok(())
}
