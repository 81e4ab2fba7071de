//! Parquet encoding/decoding helpers for the star-schema tables.
//!
//! This module defines the canonical Arrow schemas of the five output tables
//! and converts built rows into record batches. `start_time` columns are
//! stored as UTC millisecond timestamps so query engines read them as
//! instants rather than bare integers.

use std::io::Cursor;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Float64Array, Int32Array, Int64Array, StringArray,
    TimestampMillisecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;

use crate::error::{EtlError, Result};
use crate::model::{ArtistRow, SongRow, SongplayRow, Table, TimeRow, UserRow};

/// Timezone attached to `start_time` columns.
pub const TIMESTAMP_TZ: &str = "+00:00";

fn start_time_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, Some(TIMESTAMP_TZ.into()))
}

fn songs_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("song_id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("year", DataType::Int32, false),
        Field::new("duration", DataType::Float64, false),
    ]))
}

fn artists_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("location", DataType::Utf8, true),
        Field::new("latitude", DataType::Float64, true),
        Field::new("longitude", DataType::Float64, true),
    ]))
}

fn users_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("user_id", DataType::Utf8, true),
        Field::new("first_name", DataType::Utf8, true),
        Field::new("last_name", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, true),
    ]))
}

fn time_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("start_time", start_time_type(), false),
        Field::new("hour", DataType::Int32, false),
        Field::new("day", DataType::Int32, false),
        Field::new("week", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
        Field::new("year", DataType::Int32, false),
        Field::new("weekday", DataType::Int32, false),
    ]))
}

fn songplays_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("songplay_id", DataType::Int64, false),
        Field::new("start_time", start_time_type(), false),
        Field::new("user_id", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, true),
        Field::new("song_id", DataType::Utf8, true),
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("session_id", DataType::Int64, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("user_agent", DataType::Utf8, true),
        Field::new("year", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
    ]))
}

/// Returns the full schema of `table`, partition columns included.
#[must_use]
pub fn schema(table: Table) -> SchemaRef {
    match table {
        Table::Songs => songs_schema(),
        Table::Artists => artists_schema(),
        Table::Users => users_schema(),
        Table::Time => time_schema(),
        Table::Songplays => songplays_schema(),
    }
}

fn writer_properties() -> WriterProperties {
    let created_by = KeyValue {
        key: "created_by".to_string(),
        value: Some("soundlake".to_string()),
    };
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_key_value_metadata(Some(vec![created_by]))
        .build()
}

/// Encodes one record batch as a complete Parquet file.
///
/// # Errors
///
/// Returns `Write` for `table` if the Parquet writer fails.
pub fn write_single_batch(table: Table, batch: &RecordBatch) -> Result<Bytes> {
    let mut cursor = Cursor::new(Vec::<u8>::new());
    let props = writer_properties();
    let mut writer = ArrowWriter::try_new(&mut cursor, batch.schema(), Some(props))
        .map_err(|e| EtlError::write(table.name(), format!("parquet writer init failed: {e}")))?;
    writer
        .write(batch)
        .map_err(|e| EtlError::write(table.name(), format!("parquet write failed: {e}")))?;
    writer
        .close()
        .map_err(|e| EtlError::write(table.name(), format!("parquet close failed: {e}")))?;
    Ok(Bytes::from(cursor.into_inner()))
}

/// Decodes every record batch of a Parquet file.
///
/// # Errors
///
/// Returns `Read` for `table` at `path` if the payload is not valid Parquet.
pub fn read_batches(table: Table, path: &str, bytes: &Bytes) -> Result<Vec<RecordBatch>> {
    let fail = |message: String| EtlError::read(table.name(), path, message);
    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes.clone())
        .map_err(|e| fail(format!("parquet reader init failed: {e}")))?
        .build()
        .map_err(|e| fail(format!("parquet reader build failed: {e}")))?;

    let mut batches = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| fail(format!("parquet read batch failed: {e}")))?;
        batches.push(batch);
    }
    Ok(batches)
}

/// Returns the Arrow schema stored in a Parquet file.
///
/// # Errors
///
/// Returns `Read` for `table` at `path` if the payload is not valid Parquet.
pub fn read_schema(table: Table, path: &str, bytes: &Bytes) -> Result<SchemaRef> {
    ParquetRecordBatchReaderBuilder::try_new(bytes.clone())
        .map(|builder| builder.schema().clone())
        .map_err(|e| {
            EtlError::read(table.name(), path, format!("parquet reader init failed: {e}"))
        })
}

fn build_batch(table: Table, columns: Vec<ArrayRef>) -> Result<RecordBatch> {
    RecordBatch::try_new(schema(table), columns)
        .map_err(|e| EtlError::write(table.name(), format!("record batch build failed: {e}")))
}

fn strings<'a, I>(values: I) -> ArrayRef
where
    I: Iterator<Item = Option<&'a str>>,
{
    Arc::new(StringArray::from(values.collect::<Vec<_>>()))
}

fn timestamps<I: Iterator<Item = i64>>(seconds: I) -> ArrayRef {
    let millis: Vec<i64> = seconds.map(|s| s.saturating_mul(1000)).collect();
    Arc::new(TimestampMillisecondArray::from(millis).with_timezone(TIMESTAMP_TZ))
}

/// Converts `songs` rows to a record batch.
///
/// # Errors
///
/// Returns `Write` if the columns do not fit the schema.
pub fn songs_batch(rows: &[SongRow]) -> Result<RecordBatch> {
    build_batch(
        Table::Songs,
        vec![
            strings(rows.iter().map(|r| Some(r.song_id.as_str()))),
            strings(rows.iter().map(|r| Some(r.title.as_str()))),
            strings(rows.iter().map(|r| Some(r.artist_id.as_str()))),
            Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.year))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.duration))),
        ],
    )
}

/// Converts `artists` rows to a record batch.
///
/// # Errors
///
/// Returns `Write` if the columns do not fit the schema.
pub fn artists_batch(rows: &[ArtistRow]) -> Result<RecordBatch> {
    build_batch(
        Table::Artists,
        vec![
            strings(rows.iter().map(|r| Some(r.artist_id.as_str()))),
            strings(rows.iter().map(|r| Some(r.name.as_str()))),
            strings(rows.iter().map(|r| r.location.as_deref())),
            Arc::new(Float64Array::from(
                rows.iter().map(|r| r.latitude).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                rows.iter().map(|r| r.longitude).collect::<Vec<_>>(),
            )),
        ],
    )
}

/// Converts `users` rows to a record batch.
///
/// # Errors
///
/// Returns `Write` if the columns do not fit the schema.
pub fn users_batch(rows: &[UserRow]) -> Result<RecordBatch> {
    build_batch(
        Table::Users,
        vec![
            strings(rows.iter().map(|r| r.user_id.as_deref())),
            strings(rows.iter().map(|r| r.first_name.as_deref())),
            strings(rows.iter().map(|r| r.last_name.as_deref())),
            strings(rows.iter().map(|r| r.gender.as_deref())),
            strings(rows.iter().map(|r| r.level.as_deref())),
        ],
    )
}

/// Converts `time` rows to a record batch.
///
/// # Errors
///
/// Returns `Write` if the columns do not fit the schema.
pub fn time_batch(rows: &[TimeRow]) -> Result<RecordBatch> {
    let ints = |f: fn(&TimeRow) -> i32| -> ArrayRef {
        Arc::new(Int32Array::from_iter_values(rows.iter().map(f)))
    };
    build_batch(
        Table::Time,
        vec![
            timestamps(rows.iter().map(|r| r.start_time)),
            ints(|r| r.hour),
            ints(|r| r.day),
            ints(|r| r.week),
            ints(|r| r.month),
            ints(|r| r.year),
            ints(|r| r.weekday),
        ],
    )
}

/// Converts `songplays` rows to a record batch.
///
/// # Errors
///
/// Returns `Write` if the columns do not fit the schema.
pub fn songplays_batch(rows: &[SongplayRow]) -> Result<RecordBatch> {
    build_batch(
        Table::Songplays,
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.songplay_id))),
            timestamps(rows.iter().map(|r| r.start_time)),
            strings(rows.iter().map(|r| r.user_id.as_deref())),
            strings(rows.iter().map(|r| r.level.as_deref())),
            strings(rows.iter().map(|r| r.song_id.as_deref())),
            strings(rows.iter().map(|r| r.artist_id.as_deref())),
            Arc::new(Int64Array::from(
                rows.iter().map(|r| r.session_id).collect::<Vec<_>>(),
            )),
            strings(rows.iter().map(|r| r.location.as_deref())),
            strings(rows.iter().map(|r| r.user_agent.as_deref())),
            Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.year))),
            Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.month))),
        ],
    )
}

/// Returns the index of a required column, or a `Write` error naming it.
///
/// # Errors
///
/// Returns `Write` for `table` if the batch has no such column.
pub fn column_index(table: Table, batch: &RecordBatch, name: &str) -> Result<usize> {
    batch
        .schema()
        .index_of(name)
        .map_err(|e| EtlError::write(table.name(), format!("missing column '{name}': {e}")))
}

/// Returns true if every column of `batch` is present in `table`'s schema
/// with the same type.
#[must_use]
pub fn conforms(table: Table, batch: &RecordBatch) -> bool {
    let expected = schema(table);
    batch.schema().fields().iter().all(|field| {
        expected
            .field_with_name(field.name())
            .is_ok_and(|f| f.data_type() == field.data_type())
    }) && batch.columns().iter().all(|c| c.len() == batch.num_rows())
}

#[cfg(test)]
mod tests {
    use arrow::array::AsArray;
    use arrow::datatypes::TimestampMillisecondType;

    use super::*;

    #[test]
    fn songplays_round_trip_through_parquet() {
        let rows = vec![SongplayRow {
            songplay_id: 0,
            start_time: 1_541_106_106,
            user_id: Some("8".into()),
            level: Some("free".into()),
            song_id: None,
            artist_id: None,
            session_id: Some(139),
            location: None,
            user_agent: Some("Mozilla/5.0".into()),
            year: 2018,
            month: 11,
        }];
        let batch = songplays_batch(&rows).unwrap();
        let bytes = write_single_batch(Table::Songplays, &batch).unwrap();
        let batches = read_batches(Table::Songplays, "songplays.parquet/part-0", &bytes).unwrap();

        assert_eq!(batches.len(), 1);
        let read = &batches[0];
        assert_eq!(read.num_rows(), 1);
        let start = read
            .column(column_index(Table::Songplays, read, "start_time").unwrap())
            .as_primitive::<TimestampMillisecondType>();
        assert_eq!(start.value(0), 1_541_106_106_000);
        assert_eq!(start.timezone(), Some(TIMESTAMP_TZ));
        assert!(read.column(4).is_null(0));
    }

    #[test]
    fn empty_batch_keeps_schema() {
        let batch = users_batch(&[]).unwrap();
        let bytes = write_single_batch(Table::Users, &batch).unwrap();
        let batches = read_batches(Table::Users, "users.parquet/part-0", &bytes).unwrap();

        let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
        assert_eq!(rows, 0);
        let schema = read_schema(Table::Users, "users.parquet/part-0", &bytes).unwrap();
        assert_eq!(schema.fields().len(), 5);
    }

    #[test]
    fn files_carry_created_by_metadata_and_snappy() {
        let batch = time_batch(&[TimeRow::from_start_time(0).unwrap()]).unwrap();
        let bytes = write_single_batch(Table::Time, &batch).unwrap();
        let builder = ParquetRecordBatchReaderBuilder::try_new(bytes).unwrap();
        let metadata = builder.metadata();

        let kv = metadata.file_metadata().key_value_metadata().unwrap();
        assert!(kv
            .iter()
            .any(|e| e.key == "created_by" && e.value.as_deref() == Some("soundlake")));
        assert_eq!(metadata.row_group(0).column(0).compression(), Compression::SNAPPY);
    }

    #[test]
    fn batches_conform_to_their_schema() {
        let batch = artists_batch(&[ArtistRow {
            artist_id: "AR1".into(),
            name: "Name".into(),
            location: None,
            latitude: Some(1.0),
            longitude: None,
        }])
        .unwrap();
        assert!(conforms(Table::Artists, &batch));
        assert!(!conforms(Table::Songs, &batch));
    }
}
