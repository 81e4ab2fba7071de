//! Read-back of written tables.
//!
//! Used by `soundlake inspect` and by tests to verify an output root without
//! a query engine. Partition values are recovered from the `col=value`
//! directory names.

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use soundlake_core::RootedStorage;

use crate::error::{EtlError, Result};
use crate::model::Table;
use crate::parquet_util::{read_batches, read_schema};
use crate::writer::{unescape_partition_value, DEFAULT_PARTITION, SUCCESS_MARKER};

/// One data file of a written table.
#[derive(Debug, Clone)]
pub struct TableFile {
    /// Key relative to the output root.
    pub path: String,
    /// Partition `(column, value)` pairs, outermost first; `None` for the
    /// default partition.
    pub partition: Vec<(String, Option<String>)>,
    /// Schema stored in the file (partition columns excluded).
    pub schema: SchemaRef,
    /// Decoded record batches.
    pub batches: Vec<RecordBatch>,
}

impl TableFile {
    /// Rows in this file.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Returns the partition value for `column`, if this file has one.
    #[must_use]
    pub fn partition_value(&self, column: &str) -> Option<&str> {
        self.partition
            .iter()
            .find(|(c, _)| c == column)
            .and_then(|(_, v)| v.as_deref())
    }
}

/// Summary of one table directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInspection {
    /// Table inspected.
    pub table: Table,
    /// Whether `_SUCCESS` is present.
    pub complete: bool,
    /// Data files found.
    pub files: usize,
    /// Rows across all data files.
    pub rows: usize,
    /// Distinct partition directories.
    pub partitions: usize,
    /// Column names stored inside the data files.
    pub columns: Vec<String>,
}

/// Reads every data file of `table`, in path order.
///
/// # Errors
///
/// Returns `Read` for `table` if listing fails, or naming the file key if
/// decoding fails.
pub async fn read_table(storage: &RootedStorage, table: Table) -> Result<Vec<TableFile>> {
    let dir = table.directory();
    let prefix = format!("{dir}/");
    let keys = storage
        .list(&prefix)
        .await
        .map_err(|e| EtlError::read(table.name(), dir, e.to_string()))?;

    let mut files = Vec::new();
    for key in keys {
        let Some(relative) = key.strip_prefix(&prefix) else {
            continue;
        };
        if !relative.ends_with(".parquet") {
            continue;
        }
        let bytes = storage
            .get(&key)
            .await
            .map_err(|e| EtlError::read(table.name(), key.as_str(), e.to_string()))?;
        files.push(TableFile {
            partition: parse_partition(relative),
            schema: read_schema(table, &key, &bytes)?,
            batches: read_batches(table, &key, &bytes)?,
            path: key,
        });
    }
    Ok(files)
}

fn parse_partition(relative: &str) -> Vec<(String, Option<String>)> {
    let mut segments: Vec<&str> = relative.split('/').collect();
    segments.pop();
    segments
        .into_iter()
        .filter_map(|segment| segment.split_once('='))
        .map(|(column, value)| {
            let value = (value != DEFAULT_PARTITION).then(|| unescape_partition_value(value));
            (column.to_string(), value)
        })
        .collect()
}

/// Summarizes one table directory.
///
/// # Errors
///
/// See [`read_table`].
pub async fn inspect_table(storage: &RootedStorage, table: Table) -> Result<TableInspection> {
    let files = read_table(storage, table).await?;
    let complete = storage
        .head(&format!("{}/{SUCCESS_MARKER}", table.directory()))
        .await
        .map_err(|e| EtlError::read(table.name(), table.directory(), e.to_string()))?
        .is_some();

    let mut partitions: Vec<&[(String, Option<String>)]> = files
        .iter()
        .map(|f| f.partition.as_slice())
        .filter(|p| !p.is_empty())
        .collect();
    partitions.sort();
    partitions.dedup();

    let columns = files
        .first()
        .map(|f| f.schema.fields().iter().map(|c| c.name().clone()).collect())
        .unwrap_or_default();

    Ok(TableInspection {
        table,
        complete,
        files: files.len(),
        rows: files.iter().map(TableFile::num_rows).sum(),
        partitions: partitions.len(),
        columns,
    })
}

/// Summarizes all five tables.
///
/// # Errors
///
/// See [`read_table`].
pub async fn inspect(storage: &RootedStorage) -> Result<Vec<TableInspection>> {
    let mut out = Vec::with_capacity(Table::ALL.len());
    for table in Table::ALL {
        out.push(inspect_table(storage, table).await?);
    }
    Ok(out)
}
