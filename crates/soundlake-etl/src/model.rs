//! Raw source records and star-schema row types.
//!
//! ## Raw sources
//!
//! - [`SongRecord`]: one JSON object per catalog file, snake_case keys.
//! - [`LogEvent`]: one JSON object per line of a daily log file, camelCase keys.
//!
//! ## Star schema
//!
//! ```text
//!                 songs (song_id)      artists (artist_id)
//!                        \                 /
//!   users (user_id) -- songplays (songplay_id) -- time (start_time)
//! ```
//!
//! `songplays.song_id` and `songplays.artist_id` are nullable: an event whose
//! (artist, title, duration) triple has no catalog match keeps nulls.

use std::cmp::Ordering;

use serde::{Deserialize, Deserializer, Serialize};

/// Page value marking an actual playback event.
pub const NEXT_SONG_PAGE: &str = "NextSong";

/// One catalog record describing a song and its artist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongRecord {
    /// Catalog song identifier.
    pub song_id: String,
    /// Track title.
    pub title: String,
    /// Catalog artist identifier.
    pub artist_id: String,
    /// Artist display name.
    pub artist_name: String,
    /// Free-text artist location.
    #[serde(default)]
    pub artist_location: Option<String>,
    /// Artist latitude.
    #[serde(default)]
    pub artist_latitude: Option<f64>,
    /// Artist longitude.
    #[serde(default)]
    pub artist_longitude: Option<f64>,
    /// Release year (`0` when unknown).
    pub year: i32,
    /// Track duration in seconds.
    pub duration: f64,
}

/// One application activity log event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    /// User identifier; logs carry it as a string or a number, and use an
    /// empty string for logged-out traffic.
    #[serde(default, deserialize_with = "deserialize_user_id")]
    pub user_id: Option<String>,
    /// User first name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// User last name.
    #[serde(default)]
    pub last_name: Option<String>,
    /// User gender.
    #[serde(default)]
    pub gender: Option<String>,
    /// Subscription level (`free` / `paid`).
    #[serde(default)]
    pub level: Option<String>,
    /// Application page the event was emitted from.
    pub page: String,
    /// Event time, epoch milliseconds.
    pub ts: i64,
    /// Session identifier.
    #[serde(default)]
    pub session_id: Option<i64>,
    /// User location.
    #[serde(default)]
    pub location: Option<String>,
    /// Client user agent.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Artist name as displayed by the player.
    #[serde(default)]
    pub artist: Option<String>,
    /// Track title as displayed by the player.
    #[serde(default)]
    pub song: Option<String>,
    /// Track length in seconds.
    #[serde(default)]
    pub length: Option<f64>,
}

impl LogEvent {
    /// Returns true if the event is an actual playback.
    #[must_use]
    pub fn is_next_song(&self) -> bool {
        self.page == NEXT_SONG_PAGE
    }
}

fn deserialize_user_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawUserId {
        Text(String),
        Number(i64),
    }

    Ok(match Option::<RawUserId>::deserialize(deserializer)? {
        None => None,
        Some(RawUserId::Number(n)) => Some(n.to_string()),
        Some(RawUserId::Text(s)) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
    })
}

/// The five output tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    /// Song dimension.
    Songs,
    /// Artist dimension.
    Artists,
    /// User dimension.
    Users,
    /// Time dimension.
    Time,
    /// Songplay fact table.
    Songplays,
}

impl Table {
    /// All tables, in run order.
    pub const ALL: [Self; 5] = [
        Self::Songs,
        Self::Artists,
        Self::Users,
        Self::Time,
        Self::Songplays,
    ];

    /// Table name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Songs => "songs",
            Self::Artists => "artists",
            Self::Users => "users",
            Self::Time => "time",
            Self::Songplays => "songplays",
        }
    }

    /// Destination directory under the output root.
    #[must_use]
    pub fn directory(self) -> String {
        format!("{}.parquet", self.name())
    }

    /// Hive partition columns, outermost first.
    #[must_use]
    pub const fn partition_columns(self) -> &'static [&'static str] {
        match self {
            Self::Songs => &["year", "artist_id"],
            Self::Time | Self::Songplays => &["year", "month"],
            Self::Artists | Self::Users => &[],
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Row of the `songs` table.
#[derive(Debug, Clone, PartialEq)]
pub struct SongRow {
    /// Song identifier.
    pub song_id: String,
    /// Track title.
    pub title: String,
    /// Artist identifier.
    pub artist_id: String,
    /// Release year.
    pub year: i32,
    /// Duration in seconds.
    pub duration: f64,
}

impl SongRow {
    /// Total order over all columns; durations compare by `f64::total_cmp`.
    #[must_use]
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        self.song_id
            .cmp(&other.song_id)
            .then_with(|| self.title.cmp(&other.title))
            .then_with(|| self.artist_id.cmp(&other.artist_id))
            .then_with(|| self.year.cmp(&other.year))
            .then_with(|| self.duration.total_cmp(&other.duration))
    }
}

/// Row of the `artists` table.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtistRow {
    /// Artist identifier.
    pub artist_id: String,
    /// Artist name.
    pub name: String,
    /// Free-text location.
    pub location: Option<String>,
    /// Latitude.
    pub latitude: Option<f64>,
    /// Longitude.
    pub longitude: Option<f64>,
}

/// Row of the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserRow {
    /// User identifier.
    pub user_id: Option<String>,
    /// First name.
    pub first_name: Option<String>,
    /// Last name.
    pub last_name: Option<String>,
    /// Gender.
    pub gender: Option<String>,
    /// Subscription level at the time of the observed events.
    pub level: Option<String>,
}

/// Row of the `time` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeRow {
    /// Epoch seconds, UTC.
    pub start_time: i64,
    /// Hour of day, 0-23.
    pub hour: i32,
    /// Day of month, 1-31.
    pub day: i32,
    /// ISO-8601 week of year, 1-53.
    pub week: i32,
    /// Month, 1-12.
    pub month: i32,
    /// Calendar year.
    pub year: i32,
    /// ISO-8601 weekday, Monday = 1 ... Sunday = 7.
    pub weekday: i32,
}

/// Row of the `songplays` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongplayRow {
    /// Synthetic, unique, increasing identifier.
    pub songplay_id: i64,
    /// Epoch seconds, UTC.
    pub start_time: i64,
    /// User identifier.
    pub user_id: Option<String>,
    /// Subscription level at play time.
    pub level: Option<String>,
    /// Matched catalog song, if any.
    pub song_id: Option<String>,
    /// Matched catalog artist, if any.
    pub artist_id: Option<String>,
    /// Session identifier.
    pub session_id: Option<i64>,
    /// User location.
    pub location: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
    /// Partition column derived from `start_time`.
    pub year: i32,
    /// Partition column derived from `start_time`.
    pub month: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_catalog_record_with_nulls() {
        let json = r#"{"num_songs": 1, "artist_id": "ARJIE2Y1187B994AB7", "artist_latitude": null,
            "artist_longitude": null, "artist_location": "", "artist_name": "Line Renaud",
            "song_id": "SOUPIRU12A6D4FA1E1", "title": "Der Kleine Dompfaff",
            "duration": 152.92036, "year": 0}"#;
        let record: SongRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.song_id, "SOUPIRU12A6D4FA1E1");
        assert_eq!(record.artist_location.as_deref(), Some(""));
        assert_eq!(record.artist_latitude, None);
        assert_eq!(record.year, 0);
    }

    #[test]
    fn parses_log_event_camel_case() {
        let json = r#"{"artist":"Harmonia","auth":"Logged In","firstName":"Ryan","gender":"M",
            "itemInSession":0,"lastName":"Smith","length":655.77751,"level":"free",
            "location":"San Jose-Sunnyvale-Santa Clara, CA","method":"PUT","page":"NextSong",
            "registration":1541016707796.0,"sessionId":583,"song":"Sehr kosmisch","status":200,
            "ts":1542241826796,"userAgent":"Mozilla/5.0","userId":"26"}"#;
        let event: LogEvent = serde_json::from_str(json).unwrap();

        assert!(event.is_next_song());
        assert_eq!(event.user_id.as_deref(), Some("26"));
        assert_eq!(event.session_id, Some(583));
        assert_eq!(event.length, Some(655.777_51));
    }

    #[test]
    fn user_id_accepts_numbers_and_blanks() {
        let numeric: LogEvent =
            serde_json::from_str(r#"{"page":"NextSong","ts":0,"userId":39}"#).unwrap();
        assert_eq!(numeric.user_id.as_deref(), Some("39"));

        let blank: LogEvent =
            serde_json::from_str(r#"{"page":"Home","ts":0,"userId":""}"#).unwrap();
        assert_eq!(blank.user_id, None);

        let missing: LogEvent = serde_json::from_str(r#"{"page":"Home","ts":0}"#).unwrap();
        assert_eq!(missing.user_id, None);
    }

    #[test]
    fn log_event_requires_ts() {
        let err = serde_json::from_str::<LogEvent>(r#"{"page":"NextSong"}"#).unwrap_err();
        assert!(err.is_data());
    }

    #[test]
    fn partition_layout_per_table() {
        assert_eq!(Table::Songs.partition_columns(), &["year", "artist_id"]);
        assert_eq!(Table::Time.partition_columns(), &["year", "month"]);
        assert!(Table::Artists.partition_columns().is_empty());
        assert_eq!(Table::Songplays.directory(), "songplays.parquet");
    }
}
