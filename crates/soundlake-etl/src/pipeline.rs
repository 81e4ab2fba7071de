//! The ETL run: read both sources, build and write the five tables.
//!
//! ## Step order
//!
//! 1. read catalog records
//! 2. `songs`, `artists`
//! 3. read log events
//! 4. `users`, `time`, `songplays`
//!
//! The first failing step aborts the run. Tables written before the failure
//! stay written; there is no cross-table rollback.

use std::time::Instant;

use arrow::record_batch::RecordBatch;
use serde::Serialize;
use soundlake_core::{etl_span, RootedStorage, StorageConfig, StorageLocation};
use tracing::{error, info, Instrument};

use crate::dimensions::{build_artists, build_songs, build_time, build_users, next_song_events};
use crate::error::{EtlError, Result};
use crate::facts::build_songplays;
use crate::metrics;
use crate::model::Table;
use crate::parquet_util::{artists_batch, songplays_batch, songs_batch, time_batch, users_batch};
use crate::source::SourceReader;
use crate::writer::{TableSummary, TableWriter};

/// Everything a run needs: where to read, where to write, how to
/// authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtlConfig {
    /// Root holding `song_data/` and `log_data/`.
    pub input: String,
    /// Root receiving the `*.parquet` table directories.
    pub output: String,
    /// Credentials for S3 locations.
    pub storage: StorageConfig,
}

impl EtlConfig {
    /// Creates a config with default (anonymous/ambient) storage settings.
    #[must_use]
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            storage: StorageConfig::default(),
        }
    }

    /// Replaces the storage settings.
    #[must_use]
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Identifier embedded in every file written by this run.
    pub run_id: String,
    /// Catalog records read.
    pub song_records: usize,
    /// Log events read, all pages.
    pub log_events: usize,
    /// NextSong events among them.
    pub next_song_events: usize,
    /// Per-table results, in write order.
    pub tables: Vec<TableSummary>,
}

impl RunSummary {
    /// Returns the summary for `table`, if it was written.
    #[must_use]
    pub fn table(&self, table: Table) -> Option<&TableSummary> {
        self.tables.iter().find(|t| t.table == table)
    }
}

/// Storage handles for one run.
///
/// Dropping the session releases both roots.
pub struct EtlSession {
    reader: SourceReader,
    writer: TableWriter,
    run_id: String,
}

impl std::fmt::Debug for EtlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtlSession")
            .field("run_id", &self.run_id)
            .field("output", &self.writer.storage().display())
            .finish_non_exhaustive()
    }
}

impl EtlSession {
    /// Opens the input and output roots named by `config`.
    ///
    /// A missing local output directory is created.
    ///
    /// # Errors
    ///
    /// - `SourceRead` if the input location is invalid or cannot be opened
    /// - `Storage` if the output location is invalid or cannot be opened
    pub fn open(config: &EtlConfig) -> Result<Self> {
        let input = StorageLocation::parse(&config.input)
            .and_then(|location| location.open(&config.storage, false))
            .map_err(|e| EtlError::source_read(&config.input, e.to_string()))?;
        let output = StorageLocation::parse(&config.output)?.open(&config.storage, true)?;
        Ok(Self::from_storage(input, output))
    }

    /// Creates a session over already-opened roots.
    #[must_use]
    pub fn from_storage(input: RootedStorage, output: RootedStorage) -> Self {
        let run_id = ulid::Ulid::new().to_string();
        info!(
            run_id = %run_id,
            input = %input.display(),
            output = %output.display(),
            "etl session opened"
        );
        Self {
            reader: SourceReader::new(input),
            writer: TableWriter::new(output, run_id.clone()),
            run_id,
        }
    }

    /// Returns the run identifier.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Returns the output root.
    #[must_use]
    pub fn output(&self) -> &RootedStorage {
        self.writer.storage()
    }

    /// Executes the run.
    ///
    /// # Errors
    ///
    /// Returns the first error of any step; later steps are not attempted.
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let mut tables = Vec::with_capacity(Table::ALL.len());

        let songs = self.reader.read_songs().await?;
        tables.push(
            self.step(Table::Songs, || songs_batch(&build_songs(&songs)))
                .await?,
        );
        tables.push(
            self.step(Table::Artists, || artists_batch(&build_artists(&songs)))
                .await?,
        );

        let events = self.reader.read_logs().await?;
        let plays = next_song_events(&events).count();
        if plays == 0 {
            info!(run_id = %self.run_id, "no NextSong events; writing empty event tables");
        }
        tables.push(
            self.step(Table::Users, || users_batch(&build_users(&events)))
                .await?,
        );
        tables.push(
            self.step(Table::Time, || time_batch(&build_time(&events)?))
                .await?,
        );
        tables.push(
            self.step(Table::Songplays, || {
                songplays_batch(&build_songplays(&events, &songs)?)
            })
            .await?,
        );

        info!(
            run_id = %self.run_id,
            elapsed_ms = started.elapsed().as_millis(),
            "etl run complete"
        );
        Ok(RunSummary {
            run_id: self.run_id.clone(),
            song_records: songs.len(),
            log_events: events.len(),
            next_song_events: plays,
            tables,
        })
    }

    async fn step<F>(&self, table: Table, build: F) -> Result<TableSummary>
    where
        F: FnOnce() -> Result<RecordBatch>,
    {
        let started = Instant::now();
        let result = async {
            let batch = build()?;
            self.writer.write(table, &batch).await
        }
        .instrument(etl_span(table.name(), &self.run_id))
        .await;

        match &result {
            Ok(summary) => metrics::record_table_written(
                table.name(),
                summary.rows,
                summary.files,
                summary.bytes,
                started.elapsed().as_secs_f64(),
            ),
            Err(e) => {
                metrics::record_table_error(table.name());
                error!(table = %table, run_id = %self.run_id, error = %e, "table step failed");
            }
        }
        result
    }
}

impl Drop for EtlSession {
    fn drop(&mut self) {
        info!(run_id = %self.run_id, "etl session closed");
    }
}

/// Runs the job over an open session.
///
/// # Errors
///
/// See [`EtlSession::run`].
pub async fn run(session: &EtlSession) -> Result<RunSummary> {
    session.run().await
}

/// Opens a session for `config`, runs the job, and closes the session.
///
/// # Errors
///
/// See [`EtlSession::open`] and [`EtlSession::run`].
pub async fn run_with_config(config: &EtlConfig) -> Result<RunSummary> {
    let session = EtlSession::open(config)?;
    session.run().await
}
