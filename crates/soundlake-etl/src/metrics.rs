//! ETL metrics.
//!
//! Counters and histograms for source reads and table writes. These
//! complement the structured logs emitted per table span; with no recorder
//! installed every call is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram};

// ============================================================================
// Source Metrics
// ============================================================================

/// Raw records decoded from source files.
pub const SOURCE_ROWS_READ: &str = "soundlake_source_rows_read_total";

// ============================================================================
// Table Metrics
// ============================================================================

/// Rows written per table.
pub const TABLE_ROWS_WRITTEN: &str = "soundlake_table_rows_written_total";

/// Parquet files written per table.
pub const TABLE_FILES_WRITTEN: &str = "soundlake_table_files_written_total";

/// Encoded bytes written per table.
pub const TABLE_BYTES_WRITTEN: &str = "soundlake_table_bytes_written_total";

/// Wall time to build and write one table.
pub const TABLE_WRITE_DURATION: &str = "soundlake_table_write_duration_seconds";

/// Failed table steps.
pub const TABLE_ERRORS: &str = "soundlake_table_errors_total";

// ============================================================================
// Metric Registration
// ============================================================================

/// Registers all ETL metric descriptions.
///
/// Call this once at startup after installing a metrics recorder.
pub fn register_metrics() {
    describe_counter!(SOURCE_ROWS_READ, "Total raw records decoded from source files");
    describe_counter!(TABLE_ROWS_WRITTEN, "Total rows written per output table");
    describe_counter!(TABLE_FILES_WRITTEN, "Total Parquet files written per output table");
    describe_counter!(TABLE_BYTES_WRITTEN, "Total encoded bytes written per output table");
    describe_histogram!(TABLE_WRITE_DURATION, "Duration of table build and write in seconds");
    describe_counter!(TABLE_ERRORS, "Total failed table steps");
}

// ============================================================================
// Recording
// ============================================================================

/// Records decoded source records.
pub fn record_rows_read(source: &str, rows: usize) {
    counter!(SOURCE_ROWS_READ, "source" => source.to_string()).increment(as_u64(rows));
}

/// Records a completed table write.
pub fn record_table_written(table: &str, rows: usize, files: usize, bytes: u64, duration_secs: f64) {
    let labels = [("table", table.to_string())];

    counter!(TABLE_ROWS_WRITTEN, &labels).increment(as_u64(rows));
    counter!(TABLE_FILES_WRITTEN, &labels).increment(as_u64(files));
    counter!(TABLE_BYTES_WRITTEN, &labels).increment(bytes);
    histogram!(TABLE_WRITE_DURATION, &labels).record(duration_secs);
}

/// Records a failed table step.
pub fn record_table_error(table: &str) {
    counter!(TABLE_ERRORS, "table" => table.to_string()).increment(1);
}

fn as_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}
