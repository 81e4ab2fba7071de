//! Run command - build all tables from the raw sources.

use anyhow::{Context, Result};
use clap::Args;
use soundlake_etl::{EtlConfig, EtlSession};

use crate::{Config, OutputFormat};

/// Arguments for the run command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Root holding `song_data/` and `log_data/`.
    #[arg(long, env = "SOUNDLAKE_INPUT")]
    pub input: String,

    /// Root receiving the `*.parquet` table directories.
    #[arg(long, env = "SOUNDLAKE_OUTPUT")]
    pub output: String,
}

/// Execute the run command.
///
/// # Errors
///
/// Returns an error if a location cannot be opened or any step of the run
/// fails.
pub async fn execute(args: RunArgs, config: &Config) -> Result<()> {
    let etl_config = EtlConfig::new(args.input, args.output).with_storage(config.storage.clone());
    let session = EtlSession::open(&etl_config).context("Failed to open ETL session")?;

    let summary = soundlake_etl::run(&session)
        .await
        .with_context(|| format!("ETL run {} failed", session.run_id()))?;

    match config.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
            );
        }
        OutputFormat::Text => {
            println!("Run {} complete", summary.run_id);
            println!();
            println!("  Catalog records:  {}", summary.song_records);
            println!(
                "  Log events:       {} ({} NextSong)",
                summary.log_events, summary.next_song_events
            );
            println!();
            println!("  {:<10} {:>10} {:>8} {:>11}", "TABLE", "ROWS", "FILES", "PARTITIONS");
            for table in &summary.tables {
                println!(
                    "  {:<10} {:>10} {:>8} {:>11}",
                    table.table.name(),
                    table.rows,
                    table.files,
                    table.partitions
                );
            }
        }
    }

    Ok(())
}
