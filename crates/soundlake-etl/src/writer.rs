//! Hive-partitioned Parquet table writer.
//!
//! A table lands under `<table>.parquet/` in the output root:
//!
//! ```text
//! songplays.parquet/
//! ├── year=2018/month=11/part-00000-<run_id>.snappy.parquet
//! └── _SUCCESS
//! ```
//!
//! Partition columns are encoded in the directory names only. Each write
//! replaces the table wholesale: all files are encoded in memory first, then
//! the old directory is cleared, the new files are uploaded, and `_SUCCESS`
//! is written last. A reader that sees `_SUCCESS` sees a complete table.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use arrow::array::{Array, UInt32Array};
use arrow::compute::take_record_batch;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use bytes::Bytes;
use serde::Serialize;
use soundlake_core::RootedStorage;
use tracing::{debug, info};

use crate::error::{EtlError, Result};
use crate::model::Table;
use crate::parquet_util::{self, column_index};

/// Marker written after every data file of a table.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Directory name used for null or empty partition values.
pub const DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Outcome of one table write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    /// Table written.
    pub table: Table,
    /// Rows written across all files.
    pub rows: usize,
    /// Data files written.
    pub files: usize,
    /// Distinct partition directories (0 for unpartitioned tables).
    pub partitions: usize,
    /// Total encoded bytes.
    pub bytes: u64,
    /// Objects removed from the previous run.
    pub replaced: usize,
}

/// Writes tables into an output root.
#[derive(Debug, Clone)]
pub struct TableWriter {
    storage: RootedStorage,
    run_id: String,
}

struct PlannedFile {
    path: String,
    data: Bytes,
    rows: usize,
}

impl TableWriter {
    /// Creates a writer; `run_id` is embedded in every data file name.
    #[must_use]
    pub fn new(storage: RootedStorage, run_id: impl Into<String>) -> Self {
        Self {
            storage,
            run_id: run_id.into(),
        }
    }

    /// Returns the output storage.
    #[must_use]
    pub fn storage(&self) -> &RootedStorage {
        &self.storage
    }

    /// Writes `batch` as `table`, replacing any previous contents.
    ///
    /// # Errors
    ///
    /// Returns `Write` for `table` if the batch does not match the table
    /// schema, encoding fails, or any storage operation fails. A failure
    /// after the old directory was cleared leaves the table without a
    /// `_SUCCESS` marker.
    pub async fn write(&self, table: Table, batch: &RecordBatch) -> Result<TableSummary> {
        if !parquet_util::conforms(table, batch) {
            return Err(EtlError::write(
                table.name(),
                format!("batch schema does not match table: {}", batch.schema()),
            ));
        }

        let (files, partitions) = self.plan(table, batch)?;
        let dir = table.directory();
        let storage_err = |e: soundlake_core::Error| EtlError::write(table.name(), e.to_string());

        let replaced = self
            .storage
            .delete_prefix(&format!("{dir}/"))
            .await
            .map_err(storage_err)?;
        if replaced > 0 {
            debug!(table = %table, objects = replaced, "cleared previous output");
        }

        let mut bytes = 0_u64;
        let mut rows = 0_usize;
        for file in &files {
            bytes += u64::try_from(file.data.len()).unwrap_or(u64::MAX);
            rows += file.rows;
            self.storage
                .put(&format!("{dir}/{}", file.path), file.data.clone())
                .await
                .map_err(storage_err)?;
        }
        self.storage
            .put(&format!("{dir}/{SUCCESS_MARKER}"), Bytes::new())
            .await
            .map_err(storage_err)?;

        let summary = TableSummary {
            table,
            rows,
            files: files.len(),
            partitions,
            bytes,
            replaced,
        };
        info!(
            table = %table,
            rows = summary.rows,
            files = summary.files,
            partitions = summary.partitions,
            bytes = summary.bytes,
            "table written"
        );
        Ok(summary)
    }

    /// Splits the batch by partition key and encodes each part.
    fn plan(&self, table: Table, batch: &RecordBatch) -> Result<(Vec<PlannedFile>, usize)> {
        let partition_columns = table.partition_columns();
        if partition_columns.is_empty() {
            let file = self.encode(table, 0, String::new(), batch)?;
            return Ok((vec![file], 0));
        }

        let key_indices = partition_columns
            .iter()
            .map(|name| column_index(table, batch, name))
            .collect::<Result<Vec<_>>>()?;
        let data_indices: Vec<usize> = (0..batch.num_columns())
            .filter(|i| !key_indices.contains(i))
            .collect();
        let data = batch
            .project(&data_indices)
            .map_err(|e| EtlError::write(table.name(), format!("projection failed: {e}")))?;

        if batch.num_rows() == 0 {
            let file = self.encode(table, 0, String::new(), &data)?;
            return Ok((vec![file], 0));
        }

        let mut groups: BTreeMap<Vec<Option<String>>, Vec<u32>> = BTreeMap::new();
        for row in 0..batch.num_rows() {
            let key = key_indices
                .iter()
                .map(|&i| partition_value(table, batch.column(i).as_ref(), row))
                .collect::<Result<Vec<_>>>()?;
            let row = u32::try_from(row)
                .map_err(|_| EtlError::write(table.name(), "batch exceeds u32 rows"))?;
            groups.entry(key).or_default().push(row);
        }

        let partitions = groups.len();
        let mut files = Vec::with_capacity(partitions);
        for (index, (key, rows)) in groups.into_iter().enumerate() {
            let part = take_record_batch(&data, &UInt32Array::from(rows))
                .map_err(|e| EtlError::write(table.name(), format!("partition split failed: {e}")))?;
            let dir = partition_path(partition_columns, &key);
            files.push(self.encode(table, index, dir, &part)?);
        }
        Ok((files, partitions))
    }

    fn encode(
        &self,
        table: Table,
        index: usize,
        partition_dir: String,
        batch: &RecordBatch,
    ) -> Result<PlannedFile> {
        let mut path = partition_dir;
        let _ = write!(path, "part-{index:05}-{}.snappy.parquet", self.run_id);
        Ok(PlannedFile {
            path,
            data: parquet_util::write_single_batch(table, batch)?,
            rows: batch.num_rows(),
        })
    }
}

fn partition_value(table: Table, column: &dyn Array, row: usize) -> Result<Option<String>> {
    if column.is_null(row) {
        return Ok(None);
    }
    array_value_to_string(column, row)
        .map(Some)
        .map_err(|e| EtlError::write(table.name(), format!("partition value failed: {e}")))
}

/// Builds `col=value/` directories for one partition key, with a trailing
/// slash.
#[must_use]
pub fn partition_path(columns: &[&str], values: &[Option<String>]) -> String {
    let mut path = String::new();
    for (column, value) in columns.iter().zip(values) {
        let value = match value.as_deref() {
            None | Some("") => DEFAULT_PARTITION.to_string(),
            Some(v) => escape_partition_value(v),
        };
        let _ = write!(path, "{column}={value}/");
    }
    path
}

fn needs_escape(c: char) -> bool {
    c.is_control()
        || matches!(
            c,
            '"' | '#' | '%' | '\'' | '*' | '/' | ':' | '=' | '?' | '\\' | '{' | '[' | ']' | '^'
        )
}

/// Percent-escapes characters that are unsafe in a partition directory name.
#[must_use]
pub fn escape_partition_value(value: &str) -> String {
    if value == "." || value == ".." {
        return value.replace('.', "%2E");
    }
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if needs_escape(c) {
            let mut buf = [0_u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                let _ = write!(out, "%{byte:02X}");
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Reverses [`escape_partition_value`]; malformed escapes are kept verbatim.
#[must_use]
pub fn unescape_partition_value(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_digit(b: u8) -> Option<u8> {
    char::from(b)
        .to_digit(16)
        .and_then(|d| u8::try_from(d).ok())
}
