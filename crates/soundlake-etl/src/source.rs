//! Source readers for the raw catalog and activity-log files.
//!
//! Catalog files are nested three levels deep under `song_data/` (one JSON
//! object per file); log files are flat under `log_data/` (one JSON object per
//! line). Both are decoded with the same streaming JSON reader, which accepts
//! any sequence of whitespace-separated JSON values.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::de::SliceRead;
use serde_json::error::Category;
use serde_json::StreamDeserializer;
use soundlake_core::{GlobPattern, RootedStorage};
use tracing::{debug, info};

use crate::error::{EtlError, Result};
use crate::metrics;
use crate::model::{LogEvent, SongRecord};

/// Catalog layout: `song_data/<A>/<B>/<C>/<TRACK>.json`.
pub const SONG_DATA_PATTERN: &str = "song_data/*/*/*/*.json";

/// Log layout: `log_data/<YYYY-MM-DD>-events.json`.
pub const LOG_DATA_PATTERN: &str = "log_data/*.json";

/// Lazily decodes the JSON values of one file.
///
/// Yields one item per value. After the first error the iterator is fused,
/// since the decoder cannot resynchronize after broken syntax.
pub struct JsonRecords<'a, T> {
    location: &'a str,
    inner: StreamDeserializer<'a, SliceRead<'a>, T>,
    record: usize,
    failed: bool,
}

impl<'a, T: DeserializeOwned> JsonRecords<'a, T> {
    /// Creates a decoder over `bytes`, attributing errors to `location`.
    #[must_use]
    pub fn new(location: &'a str, bytes: &'a [u8]) -> Self {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        Self {
            location,
            inner: serde_json::Deserializer::from_slice(bytes).into_iter::<T>(),
            record: 0,
            failed: false,
        }
    }
}

impl<T: DeserializeOwned> Iterator for JsonRecords<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.inner.next()?;
        self.record += 1;
        match item {
            Ok(value) => Some(Ok(value)),
            Err(err) => {
                self.failed = true;
                Some(Err(classify(self.location, self.record, &err)))
            }
        }
    }
}

fn classify(location: &str, record: usize, err: &serde_json::Error) -> EtlError {
    match err.classify() {
        Category::Data => EtlError::Schema {
            location: location.to_string(),
            record,
            message: err.to_string(),
        },
        Category::Io | Category::Syntax | Category::Eof => EtlError::source_read(
            location,
            format!("malformed JSON in record {record}: {err}"),
        ),
    }
}

/// One fetched input file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    location: String,
    bytes: Bytes,
}

impl SourceFile {
    /// Display location used in errors.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Decodes the file's records one at a time.
    #[must_use]
    pub fn records<T: DeserializeOwned>(&self) -> JsonRecords<'_, T> {
        JsonRecords::new(&self.location, &self.bytes)
    }
}

/// Reads typed records from an input root.
#[derive(Debug, Clone)]
pub struct SourceReader {
    storage: RootedStorage,
}

impl SourceReader {
    /// Creates a reader over the input root.
    #[must_use]
    pub fn new(storage: RootedStorage) -> Self {
        Self { storage }
    }

    /// Reads every catalog record under `song_data/`.
    ///
    /// # Errors
    ///
    /// See [`SourceReader::read`].
    pub async fn read_songs(&self) -> Result<Vec<SongRecord>> {
        let records = self.read(SONG_DATA_PATTERN).await?;
        metrics::record_rows_read("song_data", records.len());
        Ok(records)
    }

    /// Reads every log event under `log_data/`, all pages included.
    ///
    /// # Errors
    ///
    /// See [`SourceReader::read`].
    pub async fn read_logs(&self) -> Result<Vec<LogEvent>> {
        let records = self.read(LOG_DATA_PATTERN).await?;
        metrics::record_rows_read("log_data", records.len());
        Ok(records)
    }

    /// Reads every record from the files matching `pattern`, in path order.
    ///
    /// Records are collected: the builders sort and deduplicate over the
    /// whole input. Use [`SourceReader::files`] and [`SourceReader::open`]
    /// to consume one file at a time instead.
    ///
    /// # Errors
    ///
    /// - `SourceRead` if the pattern is invalid, matches nothing, a file
    ///   cannot be fetched, or contains malformed JSON
    /// - `Schema` if a record misses a required field or has a wrong type
    pub async fn read<T: DeserializeOwned>(&self, pattern: &str) -> Result<Vec<T>> {
        let files = self.files(pattern).await?;

        let mut records = Vec::new();
        for file in &files {
            let source = self.open(file).await?;
            let before = records.len();
            for record in source.records::<T>() {
                records.push(record?);
            }
            debug!(file = %source.location(), records = records.len() - before, "decoded file");
        }

        info!(
            pattern = %self.location_of(pattern),
            files = files.len(),
            records = records.len(),
            "source read complete"
        );
        Ok(records)
    }

    /// Lists the files matching `pattern`, in path order.
    ///
    /// # Errors
    ///
    /// Returns `SourceRead` if the pattern is invalid, listing fails, or no
    /// file matches.
    pub async fn files(&self, pattern: &str) -> Result<Vec<String>> {
        let location = self.location_of(pattern);
        let glob = GlobPattern::new(pattern)
            .map_err(|e| EtlError::source_read(&location, e.to_string()))?;
        let files = self
            .storage
            .glob(&glob)
            .await
            .map_err(|e| EtlError::source_read(&location, e.to_string()))?;

        if files.is_empty() {
            return Err(EtlError::source_read(location, "no files match pattern"));
        }
        Ok(files)
    }

    /// Fetches one input file for lazy decoding.
    ///
    /// # Errors
    ///
    /// Returns `SourceRead` if the file cannot be fetched.
    pub async fn open(&self, file: &str) -> Result<SourceFile> {
        Ok(SourceFile {
            bytes: self.fetch(file).await?,
            location: self.location_of(file),
        })
    }

    async fn fetch(&self, file: &str) -> Result<Bytes> {
        self.storage
            .get(file)
            .await
            .map_err(|e| EtlError::source_read(self.location_of(file), e.to_string()))
    }

    fn location_of(&self, path: &str) -> String {
        let root = self.storage.display().trim_end_matches('/');
        if root.is_empty() {
            path.to_string()
        } else {
            format!("{root}/{path}")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use soundlake_core::MemoryBackend;

    use super::*;

    async fn reader_with(files: &[(&str, &str)]) -> SourceReader {
        let backend = Arc::new(MemoryBackend::new());
        let storage = RootedStorage::new(backend, "input").unwrap();
        for (path, body) in files {
            storage
                .put(path, Bytes::from((*body).to_string()))
                .await
                .unwrap();
        }
        SourceReader::new(storage)
    }

    const SONG: &str = r#"{"num_songs": 1, "artist_id": "AR1", "artist_latitude": 35.1,
        "artist_longitude": -90.0, "artist_location": "Memphis, TN", "artist_name": "Artist One",
        "song_id": "SO1", "title": "Track One", "duration": 180.0, "year": 1999}"#;

    #[tokio::test]
    async fn reads_nested_catalog_files() {
        let reader = reader_with(&[
            ("song_data/A/A/A/TRAAA.json", SONG),
            ("song_data/A/A/B/TRAAB.json", &SONG.replace("SO1", "SO2")),
            ("song_data/A/A/readme.txt", "not json"),
        ])
        .await;

        let songs = reader.read_songs().await.unwrap();
        assert_eq!(songs.len(), 2);
        assert_eq!(songs[0].song_id, "SO1");
        assert_eq!(songs[1].song_id, "SO2");
    }

    #[tokio::test]
    async fn reads_json_lines_logs_including_all_pages() {
        let log = concat!(
            r#"{"page":"Home","ts":1541105830796,"userId":""}"#,
            "\n",
            r#"{"page":"NextSong","ts":1541106106796,"userId":"8","artist":"A","song":"S","length":1.5}"#,
            "\n\n"
        );
        let reader = reader_with(&[("log_data/2018-11-01-events.json", log)]).await;

        let events = reader.read_logs().await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(!events[0].is_next_song());
        assert!(events[1].is_next_song());
    }

    #[tokio::test]
    async fn no_matching_files_is_source_read_error() {
        let reader = reader_with(&[("log_data/nested/x.json", "{}")]).await;

        let err = reader.read_logs().await.unwrap_err();
        match err {
            EtlError::SourceRead { location, message } => {
                assert_eq!(location, "input/log_data/*.json");
                assert!(message.contains("no files"));
            }
            other => panic!("expected SourceRead, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_required_field_is_schema_error() {
        let log = concat!(
            r#"{"page":"NextSong","ts":1}"#,
            "\n",
            r#"{"page":"NextSong","userId":"8"}"#,
            "\n"
        );
        let reader = reader_with(&[("log_data/day.json", log)]).await;

        match reader.read_logs().await.unwrap_err() {
            EtlError::Schema {
                location, record, ..
            } => {
                assert_eq!(location, "input/log_data/day.json");
                assert_eq!(record, 2);
            }
            other => panic!("expected Schema, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_type_is_schema_error() {
        let bad = SONG.replace("180.0", "\"three minutes\"");
        let reader = reader_with(&[("song_data/A/B/C/x.json", &bad)]).await;

        assert!(matches!(
            reader.read_songs().await.unwrap_err(),
            EtlError::Schema { record: 1, .. }
        ));
    }

    #[tokio::test]
    async fn broken_syntax_is_source_read_error() {
        let reader = reader_with(&[("log_data/day.json", r#"{"page":"NextSong","ts":"#)]).await;

        assert!(matches!(
            reader.read_logs().await.unwrap_err(),
            EtlError::SourceRead { .. }
        ));
    }

    #[test]
    fn decoder_fuses_after_error() {
        let mut records = JsonRecords::<LogEvent>::new("mem", b"{oops} {\"page\":\"x\",\"ts\":1}");
        assert!(records.next().unwrap().is_err());
        assert!(records.next().is_none());
    }

    #[tokio::test]
    async fn opened_file_yields_records_before_a_later_failure() {
        let log = concat!(
            r#"{"page":"NextSong","ts":1}"#,
            "\n",
            r#"{"page":"Home","ts":2}"#,
            "\n",
            r#"{"page":"NextSong"}"#,
            "\n"
        );
        let reader = reader_with(&[
            ("log_data/b.json", log),
            ("log_data/a.json", r#"{"page":"Home","ts":0}"#),
        ])
        .await;

        let files = reader.files(LOG_DATA_PATTERN).await.unwrap();
        assert_eq!(files, vec!["log_data/a.json", "log_data/b.json"]);

        let source = reader.open(&files[1]).await.unwrap();
        assert_eq!(source.location(), "input/log_data/b.json");
        let mut records = source.records::<LogEvent>();
        assert_eq!(records.next().unwrap().unwrap().ts, 1);
        assert_eq!(records.next().unwrap().unwrap().page, "Home");
        assert!(matches!(
            records.next().unwrap(),
            Err(EtlError::Schema { record: 3, .. })
        ));
        assert!(records.next().is_none());
    }
}
