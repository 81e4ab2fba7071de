//! # soundlake-etl
//!
//! Batch ETL from a music-streaming catalog and its playback logs to a
//! star schema stored as partitioned Parquet.
//!
//! - **Sources**: nested catalog JSON files and JSON-lines activity logs
//! - **Dimensions**: `songs`, `artists`, `users`, `time`
//! - **Facts**: `songplays`, matched to the catalog by artist name, title and
//!   duration
//! - **Writer**: Hive-partitioned, snappy-compressed Parquet with a
//!   `_SUCCESS` marker per table
//!
//! ## Output Layout
//!
//! ```text
//! {output_root}/
//! ├── songs.parquet/year=*/artist_id=*/part-*.snappy.parquet
//! ├── artists.parquet/part-*.snappy.parquet
//! ├── users.parquet/part-*.snappy.parquet
//! ├── time.parquet/year=*/month=*/part-*.snappy.parquet
//! └── songplays.parquet/year=*/month=*/part-*.snappy.parquet
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use soundlake_etl::{EtlConfig, EtlSession};
//!
//! let config = EtlConfig::new("s3a://udacity-dend/", "s3a://my-lake/");
//! let session = EtlSession::open(&config)?;
//! let summary = session.run().await?;
//! println!("wrote {} songplays", summary.tables[4].rows);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod dimensions;
pub mod error;
pub mod facts;
pub mod inspect;
pub mod metrics;
pub mod model;
pub mod parquet_util;
pub mod pipeline;
pub mod source;
pub mod writer;

pub use error::{EtlError, Result};
pub use model::{LogEvent, SongRecord, Table};
pub use pipeline::{run, run_with_config, EtlConfig, EtlSession, RunSummary};
pub use writer::{TableSummary, TableWriter};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{EtlError, Result};
    pub use crate::model::{
        ArtistRow, LogEvent, SongRecord, SongRow, SongplayRow, Table, TimeRow, UserRow,
    };
    pub use crate::pipeline::{EtlConfig, EtlSession, RunSummary};
    pub use crate::source::{SourceFile, SourceReader};
    pub use crate::writer::{TableSummary, TableWriter};
}
