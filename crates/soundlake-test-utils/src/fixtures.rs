//! Pre-built test fixtures for common test scenarios.
//!
//! Provides factory functions to create raw source records with sensible
//! defaults, and a [`RawDataset`] that lays them out the way the real input
//! bucket does.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use soundlake_core::RootedStorage;
use soundlake_etl::model::{LogEvent, SongRecord, NEXT_SONG_PAGE};
use soundlake_etl::EtlSession;

use crate::storage::TracingMemoryBackend;

/// 2018-11-01T21:01:46.796Z, the first event of the reference log set.
pub const BASE_TS: i64 = 1_541_106_106_796;

/// Test context with a shared tracing backend and `input/`, `output/` roots.
pub struct TestContext {
    /// Shared storage backend.
    pub backend: Arc<TracingMemoryBackend>,
    /// Input root.
    pub input: RootedStorage,
    /// Output root.
    pub output: RootedStorage,
}

impl TestContext {
    /// Creates a new test context over an empty backend.
    #[must_use]
    pub fn new() -> Self {
        let backend = Arc::new(TracingMemoryBackend::new());
        let input = RootedStorage::new(backend.clone(), "input")
            .expect("valid root")
            .with_display("memory://input");
        let output = RootedStorage::new(backend.clone(), "output")
            .expect("valid root")
            .with_display("memory://output");
        Self {
            backend,
            input,
            output,
        }
    }

    /// Opens a session over the context's roots.
    #[must_use]
    pub fn session(&self) -> EtlSession {
        EtlSession::from_storage(self.input.clone(), self.output.clone())
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates a catalog record without location or coordinates, released in
/// 2000.
#[must_use]
pub fn song(
    song_id: &str,
    artist_id: &str,
    artist_name: &str,
    title: &str,
    duration: f64,
) -> SongRecord {
    SongRecord {
        song_id: song_id.to_string(),
        title: title.to_string(),
        artist_id: artist_id.to_string(),
        artist_name: artist_name.to_string(),
        artist_location: None,
        artist_latitude: None,
        artist_longitude: None,
        year: 2000,
        duration,
    }
}

/// Creates a NextSong event for a free-tier user.
#[must_use]
pub fn next_song(user_id: &str, ts: i64, artist: &str, title: &str, length: f64) -> LogEvent {
    LogEvent {
        artist: Some(artist.to_string()),
        song: Some(title.to_string()),
        length: Some(length),
        ..page_event(NEXT_SONG_PAGE, Some(user_id), ts)
    }
}

/// Creates a non-playback event (or a playback event without track fields).
#[must_use]
pub fn page_event(page: &str, user_id: Option<&str>, ts: i64) -> LogEvent {
    LogEvent {
        user_id: user_id.map(str::to_string),
        first_name: user_id.map(|id| format!("First{id}")),
        last_name: user_id.map(|id| format!("Last{id}")),
        gender: user_id.map(|_| "F".to_string()),
        level: Some("free".to_string()),
        page: page.to_string(),
        ts,
        session_id: Some(1),
        location: Some("Portland-South Portland, ME".to_string()),
        user_agent: Some("Mozilla/5.0 (X11; Linux x86_64)".to_string()),
        artist: None,
        song: None,
        length: None,
    }
}

/// Raw input files to be written under an input root.
#[derive(Debug, Clone, Default)]
pub struct RawDataset {
    songs: Vec<SongRecord>,
    logs: BTreeMap<String, Vec<LogEvent>>,
    extra: Vec<(String, String)>,
}

impl RawDataset {
    /// Creates an empty dataset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one catalog file.
    #[must_use]
    pub fn with_song(mut self, record: SongRecord) -> Self {
        self.songs.push(record);
        self
    }

    /// Appends events to the daily log file `name` (e.g. `2018-11-01`).
    #[must_use]
    pub fn with_events(mut self, name: &str, events: impl IntoIterator<Item = LogEvent>) -> Self {
        self.logs.entry(name.to_string()).or_default().extend(events);
        self
    }

    /// Adds an arbitrary file, e.g. a malformed one.
    #[must_use]
    pub fn with_raw_file(mut self, path: &str, body: &str) -> Self {
        self.extra.push((path.to_string(), body.to_string()));
        self
    }

    /// Writes the dataset: one JSON object per catalog file under
    /// `song_data/A/B/<x>/`, JSON lines under `log_data/`.
    pub async fn write_to(&self, input: &RootedStorage) {
        for (i, record) in self.songs.iter().enumerate() {
            let shard = char::from(b'A' + u8::try_from(i % 26).expect("shard"));
            let path = format!("song_data/A/B/{shard}/TR{i:06}.json");
            let body = serde_json::to_string(record).expect("serialize song");
            input.put(&path, Bytes::from(body)).await.expect("put song");
        }
        for (name, events) in &self.logs {
            let mut body = String::new();
            for event in events {
                body.push_str(&serde_json::to_string(event).expect("serialize event"));
                body.push('\n');
            }
            input
                .put(&format!("log_data/{name}-events.json"), Bytes::from(body))
                .await
                .expect("put log");
        }
        for (path, body) in &self.extra {
            input
                .put(path, Bytes::from(body.clone()))
                .await
                .expect("put raw file");
        }
    }
}
