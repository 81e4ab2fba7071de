//! Songplays fact builder.
//!
//! Playback events carry no catalog keys, only what the player displayed:
//! artist name, track title and track length. Each NextSong event is matched
//! against the catalog on all three; events without a match keep null song
//! and artist references rather than being dropped.

use std::collections::HashMap;

use crate::dimensions::{next_song_events, start_time_secs, time_row};
use crate::error::Result;
use crate::model::{LogEvent, SongRecord, SongplayRow, Table};

type MatchKey<'a> = (&'a str, &'a str, u64);

/// Lookup from displayed `(artist, title, length)` to catalog identifiers.
#[derive(Debug, Default)]
pub struct SongIndex<'a> {
    entries: HashMap<MatchKey<'a>, (&'a str, &'a str)>,
}

impl<'a> SongIndex<'a> {
    /// Indexes the catalog.
    ///
    /// If several records share a key, the smallest `(song_id, artist_id)`
    /// is kept so the join result does not depend on record order.
    #[must_use]
    pub fn new(records: &'a [SongRecord]) -> Self {
        let mut entries: HashMap<MatchKey<'a>, (&'a str, &'a str)> = HashMap::new();
        for record in records {
            let key = (
                record.artist_name.as_str(),
                record.title.as_str(),
                duration_bits(record.duration),
            );
            let ids = (record.song_id.as_str(), record.artist_id.as_str());
            entries
                .entry(key)
                .and_modify(|current| {
                    if ids < *current {
                        *current = ids;
                    }
                })
                .or_insert(ids);
        }
        Self { entries }
    }

    /// Returns `(song_id, artist_id)` for an exact match.
    #[must_use]
    pub fn lookup(&self, artist: &str, title: &str, length: f64) -> Option<(&'a str, &'a str)> {
        self.entries
            .get(&(artist, title, duration_bits(length)))
            .copied()
    }

    /// Number of distinct match keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the catalog was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Equality on bit patterns, with -0.0 folded into 0.0.
fn duration_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0_f64.to_bits()
    } else {
        value.to_bits()
    }
}

/// Builds the `songplays` fact table: one row per NextSong event.
///
/// `songplay_id` counts from 0 in event order.
///
/// # Errors
///
/// Returns `Transform` for table `songplays` if an event timestamp cannot be represented as a
/// calendar date (needed for the `year`/`month` partition columns).
pub fn build_songplays(events: &[LogEvent], songs: &[SongRecord]) -> Result<Vec<SongplayRow>> {
    let index = SongIndex::new(songs);
    let mut rows = Vec::new();

    for (songplay_id, event) in (0_i64..).zip(next_song_events(events)) {
        let start_time = start_time_secs(event.ts);
        let calendar = time_row(Table::Songplays, start_time, event.ts)?;
        let matched = match (&event.artist, &event.song, event.length) {
            (Some(artist), Some(song), Some(length)) => index.lookup(artist, song, length),
            _ => None,
        };

        rows.push(SongplayRow {
            songplay_id,
            start_time,
            user_id: event.user_id.clone(),
            level: event.level.clone(),
            song_id: matched.map(|(song_id, _)| song_id.to_string()),
            artist_id: matched.map(|(_, artist_id)| artist_id.to_string()),
            session_id: event.session_id,
            location: event.location.clone(),
            user_agent: event.user_agent.clone(),
            year: calendar.year,
            month: calendar.month,
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(song_id: &str, artist_id: &str, artist: &str, title: &str, duration: f64) -> SongRecord {
        SongRecord {
            song_id: song_id.into(),
            title: title.into(),
            artist_id: artist_id.into(),
            artist_name: artist.into(),
            artist_location: None,
            artist_latitude: None,
            artist_longitude: None,
            year: 1999,
            duration,
        }
    }

    fn play(artist: Option<&str>, title: Option<&str>, length: Option<f64>, ts: i64) -> LogEvent {
        LogEvent {
            user_id: Some("8".into()),
            first_name: None,
            last_name: None,
            gender: None,
            level: Some("free".into()),
            page: "NextSong".into(),
            ts,
            session_id: Some(139),
            location: Some("Phoenix-Mesa-Scottsdale, AZ".into()),
            user_agent: None,
            artist: artist.map(str::to_string),
            song: title.map(str::to_string),
            length,
        }
    }

    #[test]
    fn matches_on_artist_title_and_duration() {
        let songs = vec![song("SO1", "AR1", "Artist One", "Track One", 180.0)];
        let events = vec![
            play(Some("Artist One"), Some("Track One"), Some(180.0), 1_541_106_106_796),
            play(Some("Artist One"), Some("Track One"), Some(180.5), 1_541_106_496_796),
        ];

        let rows = build_songplays(&events, &songs).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].song_id.as_deref(), Some("SO1"));
        assert_eq!(rows[0].artist_id.as_deref(), Some("AR1"));
        assert_eq!(rows[0].start_time, 1_541_106_106);
        assert_eq!((rows[0].year, rows[0].month), (2018, 11));
        assert_eq!(rows[1].song_id, None);
        assert_eq!(rows[1].artist_id, None);
    }

    #[test]
    fn non_next_song_events_are_skipped_and_ids_increase() {
        let mut home = play(None, None, None, 1_000);
        home.page = "Home".into();
        let events = vec![
            play(None, None, None, 3_000),
            home,
            play(Some("X"), Some("Y"), Some(1.0), 2_000),
        ];

        let rows = build_songplays(&events, &[]).unwrap();

        let ids: Vec<i64> = rows.iter().map(|r| r.songplay_id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert!(rows.iter().all(|r| r.song_id.is_none()));
    }

    #[test]
    fn missing_join_attribute_never_matches() {
        let songs = vec![song("SO1", "AR1", "A", "T", 0.0)];
        let events = vec![play(Some("A"), Some("T"), None, 0)];

        let rows = build_songplays(&events, &songs).unwrap();
        assert_eq!(rows[0].song_id, None);
    }

    #[test]
    fn duplicate_catalog_matches_pick_smallest_ids() {
        let songs = vec![
            song("SO9", "AR1", "A", "T", 200.0),
            song("SO2", "AR7", "A", "T", 200.0),
            song("SO2", "AR3", "A", "T", 200.0),
        ];
        let mut reversed = songs.clone();
        reversed.reverse();
        let events = vec![play(Some("A"), Some("T"), Some(200.0), 0)];

        for catalog in [&songs, &reversed] {
            let rows = build_songplays(&events, catalog).unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].song_id.as_deref(), Some("SO2"));
            assert_eq!(rows[0].artist_id.as_deref(), Some("AR3"));
        }
    }

    #[test]
    fn negative_zero_length_matches_zero_duration() {
        let songs = vec![song("SO1", "AR1", "A", "T", 0.0)];
        let index = SongIndex::new(&songs);
        assert_eq!(index.lookup("A", "T", -0.0), Some(("SO1", "AR1")));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn unrepresentable_timestamp_fails_as_songplays() {
        let events = vec![play(Some("A"), Some("T"), Some(1.0), i64::MIN)];

        let err = build_songplays(&events, &[]).unwrap_err();

        assert_eq!(err.table(), Some("songplays"));
        assert!(err.to_string().contains("outside the representable date range"));
    }
}
