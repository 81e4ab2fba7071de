//! Dimension table builders.
//!
//! All builders are pure functions over the decoded source records. Output
//! order is deterministic regardless of input order, so identical inputs
//! always produce identical files.

use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::error::{EtlError, Result};
use crate::model::{ArtistRow, LogEvent, SongRecord, SongRow, Table, TimeRow, UserRow};

/// Builds the `songs` dimension: distinct catalog projections.
///
/// Two records sharing a `song_id` but differing in any other column both
/// survive.
#[must_use]
pub fn build_songs(records: &[SongRecord]) -> Vec<SongRow> {
    let mut rows: Vec<SongRow> = records
        .iter()
        .map(|r| SongRow {
            song_id: r.song_id.clone(),
            title: r.title.clone(),
            artist_id: r.artist_id.clone(),
            year: r.year,
            duration: r.duration,
        })
        .collect();
    rows.sort_by(SongRow::total_cmp);
    rows.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
    rows
}

/// Builds the `artists` dimension: exactly one row per `artist_id`.
///
/// When the catalog disagrees about an artist, the candidate with the most
/// populated optional attributes wins; ties fall to the smallest
/// `(name, location, latitude, longitude)`.
#[must_use]
pub fn build_artists(records: &[SongRecord]) -> Vec<ArtistRow> {
    let mut by_id: BTreeMap<&str, ArtistRow> = BTreeMap::new();
    for record in records {
        let candidate = ArtistRow {
            artist_id: record.artist_id.clone(),
            name: record.artist_name.clone(),
            location: record.artist_location.clone(),
            latitude: record.artist_latitude,
            longitude: record.artist_longitude,
        };
        match by_id.entry(record.artist_id.as_str()) {
            Entry::Vacant(slot) => {
                slot.insert(candidate);
            }
            Entry::Occupied(mut slot) => {
                if prefer_artist(&candidate, slot.get()) == Ordering::Less {
                    slot.insert(candidate);
                }
            }
        }
    }
    by_id.into_values().collect()
}

fn populated(row: &ArtistRow) -> usize {
    usize::from(row.location.as_deref().is_some_and(|l| !l.is_empty()))
        + usize::from(row.latitude.is_some())
        + usize::from(row.longitude.is_some())
}

/// `Less` means `a` is the better representative.
fn prefer_artist(a: &ArtistRow, b: &ArtistRow) -> Ordering {
    populated(b)
        .cmp(&populated(a))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.location.cmp(&b.location))
        .then_with(|| cmp_opt_f64(a.latitude, b.latitude))
        .then_with(|| cmp_opt_f64(a.longitude, b.longitude))
}

fn cmp_opt_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.total_cmp(&b),
    }
}

/// Returns the playback events, in input order.
pub fn next_song_events(events: &[LogEvent]) -> impl Iterator<Item = &LogEvent> {
    events.iter().filter(|e| e.is_next_song())
}

/// Builds the `users` dimension from NextSong events.
///
/// A user who changed level appears once per observed level.
#[must_use]
pub fn build_users(events: &[LogEvent]) -> Vec<UserRow> {
    let mut rows: Vec<UserRow> = next_song_events(events)
        .map(|e| UserRow {
            user_id: e.user_id.clone(),
            first_name: e.first_name.clone(),
            last_name: e.last_name.clone(),
            gender: e.gender.clone(),
            level: e.level.clone(),
        })
        .collect();
    rows.sort();
    rows.dedup();
    rows
}

/// Converts a millisecond event timestamp to whole epoch seconds.
///
/// Rounds toward negative infinity so pre-epoch timestamps stay ordered.
#[must_use]
pub const fn start_time_secs(ts_millis: i64) -> i64 {
    ts_millis.div_euclid(1000)
}

impl TimeRow {
    /// Decomposes epoch seconds into UTC calendar fields.
    ///
    /// Returns `None` if the instant is outside chrono's representable range.
    #[must_use]
    pub fn from_start_time(start_time: i64) -> Option<Self> {
        let dt: DateTime<Utc> = DateTime::from_timestamp(start_time, 0)?;
        Some(Self {
            start_time,
            hour: to_i32(dt.hour()),
            day: to_i32(dt.day()),
            week: to_i32(dt.iso_week().week()),
            month: to_i32(dt.month()),
            year: dt.year(),
            weekday: to_i32(dt.weekday().number_from_monday()),
        })
    }
}

// Calendar components are all below 60.
#[allow(clippy::cast_possible_wrap)]
const fn to_i32(v: u32) -> i32 {
    v as i32
}

/// Builds the `time` dimension: one row per distinct `start_time`.
///
/// # Errors
///
/// Returns `Transform` for table `time` if an event timestamp cannot be
/// represented as a calendar date.
pub fn build_time(events: &[LogEvent]) -> Result<Vec<TimeRow>> {
    let mut rows = BTreeMap::new();
    for event in next_song_events(events) {
        let start_time = start_time_secs(event.ts);
        if let Entry::Vacant(slot) = rows.entry(start_time) {
            slot.insert(time_row(Table::Time, start_time, event.ts)?);
        }
    }
    Ok(rows.into_values().collect())
}

/// Calendar fields for `start_time`, failing on behalf of `table`.
pub(crate) fn time_row(table: Table, start_time: i64, ts: i64) -> Result<TimeRow> {
    TimeRow::from_start_time(start_time).ok_or_else(|| {
        EtlError::transform(
            table.name(),
            format!("timestamp {ts} ms is outside the representable date range"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(song_id: &str, artist_id: &str, duration: f64) -> SongRecord {
        SongRecord {
            song_id: song_id.into(),
            title: format!("title {song_id}"),
            artist_id: artist_id.into(),
            artist_name: format!("name {artist_id}"),
            artist_location: None,
            artist_latitude: None,
            artist_longitude: None,
            year: 2000,
            duration,
        }
    }

    fn event(page: &str, ts: i64, user: Option<&str>, level: &str) -> LogEvent {
        LogEvent {
            user_id: user.map(str::to_string),
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            gender: Some("F".into()),
            level: Some(level.into()),
            page: page.into(),
            ts,
            session_id: Some(1),
            location: None,
            user_agent: None,
            artist: None,
            song: None,
            length: None,
        }
    }

    #[test]
    fn songs_are_distinct_by_full_row() {
        let records = vec![
            song("SO2", "AR1", 100.0),
            song("SO1", "AR1", 100.0),
            song("SO1", "AR1", 100.0),
            song("SO1", "AR1", 101.5),
        ];
        let rows = build_songs(&records);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].song_id, "SO1");
        assert!((rows[0].duration - 100.0).abs() < f64::EPSILON);
        assert!((rows[1].duration - 101.5).abs() < f64::EPSILON);
        assert_eq!(rows[2].song_id, "SO2");
    }

    #[test]
    fn artists_keep_one_row_preferring_populated_attributes() {
        let mut sparse = song("SO1", "AR1", 1.0);
        sparse.artist_location = Some(String::new());
        let mut rich = song("SO2", "AR1", 1.0);
        rich.artist_location = Some("Oslo".into());
        rich.artist_latitude = Some(59.9);
        let other = song("SO3", "AR0", 1.0);

        let rows = build_artists(&[sparse, rich.clone(), other]);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].artist_id, "AR0");
        assert_eq!(rows[1].location.as_deref(), Some("Oslo"));
        assert_eq!(rows[1].latitude, rich.artist_latitude);
    }

    #[test]
    fn artist_ties_fall_to_smallest_name() {
        let mut a = song("SO1", "AR1", 1.0);
        a.artist_name = "Zed".into();
        let mut b = song("SO2", "AR1", 1.0);
        b.artist_name = "Abe".into();

        let forward = build_artists(&[a.clone(), b.clone()]);
        let backward = build_artists(&[b, a]);

        assert_eq!(forward, backward);
        assert_eq!(forward[0].name, "Abe");
    }

    #[test]
    fn users_only_from_next_song_and_one_row_per_level() {
        let events = vec![
            event("Home", 1_000, Some("7"), "free"),
            event("NextSong", 2_000, Some("8"), "free"),
            event("NextSong", 3_000, Some("8"), "free"),
            event("NextSong", 4_000, Some("8"), "paid"),
        ];
        let users = build_users(&events);

        assert_eq!(users.len(), 2);
        assert!(users.iter().all(|u| u.user_id.as_deref() == Some("8")));
        assert_eq!(users[0].level.as_deref(), Some("free"));
        assert_eq!(users[1].level.as_deref(), Some("paid"));
    }

    #[test]
    fn start_time_truncates_milliseconds() {
        assert_eq!(start_time_secs(1_541_106_106_796), 1_541_106_106);
        assert_eq!(start_time_secs(999), 0);
        assert_eq!(start_time_secs(-1), -1);
    }

    #[test]
    fn time_row_decomposes_in_utc() {
        // 2018-11-15T00:30:26Z, a Thursday in ISO week 46.
        let row = TimeRow::from_start_time(1_542_241_826).unwrap();
        assert_eq!(
            row,
            TimeRow {
                start_time: 1_542_241_826,
                hour: 0,
                day: 15,
                week: 46,
                month: 11,
                year: 2018,
                weekday: 4,
            }
        );
    }

    #[test]
    fn weekday_is_iso_monday_one_sunday_seven() {
        // 2018-11-04 was a Sunday, 2018-11-05 a Monday.
        assert_eq!(TimeRow::from_start_time(1_541_289_600).unwrap().weekday, 7);
        assert_eq!(TimeRow::from_start_time(1_541_376_000).unwrap().weekday, 1);
    }

    #[test]
    fn iso_week_can_belong_to_previous_year() {
        // 2021-01-01 is in ISO week 53 of 2020; the year column stays 2021.
        let row = TimeRow::from_start_time(1_609_459_200).unwrap();
        assert_eq!(row.week, 53);
        assert_eq!(row.year, 2021);
    }

    #[test]
    fn time_is_distinct_by_start_time_and_sorted() {
        let events = vec![
            event("NextSong", 5_500, None, "free"),
            event("NextSong", 5_100, None, "free"),
            event("NextSong", 2_000, None, "free"),
            event("Logout", 9_000, None, "free"),
        ];
        let rows = build_time(&events).unwrap();

        let starts: Vec<i64> = rows.iter().map(|r| r.start_time).collect();
        assert_eq!(starts, vec![2, 5]);
    }

    #[test]
    fn unrepresentable_timestamp_is_transform_error() {
        let events = vec![event("NextSong", i64::MAX, None, "free")];
        let err = build_time(&events).unwrap_err();
        assert_eq!(err.table(), Some("time"));
    }

    mod proptests {
        use std::collections::{BTreeSet, HashSet};

        use chrono::TimeZone;
        use proptest::prelude::*;

        use super::*;

        // 1900-01-01 through 2100-01-01.
        const EARLIEST: i64 = -2_208_988_800;
        const LATEST: i64 = 4_102_444_800;

        fn arb_song() -> impl Strategy<Value = SongRecord> {
            (
                "SO[0-3]",
                "AR[0-2]",
                1998..2001_i32,
                prop::sample::select(vec![100.0, 100.5, 200.0, 0.0]),
            )
                .prop_map(|(song_id, artist_id, year, duration)| {
                    let mut record = song(&song_id, &artist_id, duration);
                    record.year = year;
                    record
                })
        }

        fn arb_event() -> impl Strategy<Value = LogEvent> {
            (
                prop::sample::select(vec!["NextSong", "Home", "Logout"]),
                prop::option::of("[1-4]"),
                prop::sample::select(vec!["free", "paid"]),
                prop::option::of(prop::sample::select(vec!["Ada", "Grace"])),
            )
                .prop_map(|(page, user, level, first_name)| {
                    let mut e = event(page, 0, user.as_deref(), level);
                    e.first_name = first_name.map(str::to_string);
                    e
                })
        }

        proptest! {
            #[test]
            fn calendar_fields_survive_reconstruction(start_time in EARLIEST..LATEST) {
                let row = TimeRow::from_start_time(start_time).unwrap();

                let hour_start = Utc
                    .with_ymd_and_hms(
                        row.year,
                        u32::try_from(row.month).unwrap(),
                        u32::try_from(row.day).unwrap(),
                        u32::try_from(row.hour).unwrap(),
                        0,
                        0,
                    )
                    .single()
                    .unwrap()
                    .timestamp();
                prop_assert!(hour_start <= start_time && start_time < hour_start + 3600);

                let again = TimeRow::from_start_time(hour_start).unwrap();
                prop_assert_eq!(
                    (again.hour, again.day, again.week, again.month, again.year, again.weekday),
                    (row.hour, row.day, row.week, row.month, row.year, row.weekday)
                );
                prop_assert!((1..=7).contains(&row.weekday));
                prop_assert!((1..=53).contains(&row.week));
            }

            #[test]
            fn songs_are_distinct_and_keep_every_song_id(
                records in prop::collection::vec(arb_song(), 0..40)
            ) {
                let rows = build_songs(&records);

                for pair in rows.windows(2) {
                    prop_assert_eq!(pair[0].total_cmp(&pair[1]), Ordering::Less);
                }
                let input_ids: HashSet<&str> = records.iter().map(|r| r.song_id.as_str()).collect();
                let output_ids: HashSet<&str> = rows.iter().map(|r| r.song_id.as_str()).collect();
                prop_assert_eq!(input_ids, output_ids);
                prop_assert!(rows.len() <= records.len());
            }

            #[test]
            fn users_are_the_distinct_next_song_tuples(
                events in prop::collection::vec(arb_event(), 0..40)
            ) {
                let expected: BTreeSet<UserRow> = events
                    .iter()
                    .filter(|e| e.page == "NextSong")
                    .map(|e| UserRow {
                        user_id: e.user_id.clone(),
                        first_name: e.first_name.clone(),
                        last_name: e.last_name.clone(),
                        gender: e.gender.clone(),
                        level: e.level.clone(),
                    })
                    .collect();

                let users = build_users(&events);

                prop_assert_eq!(users, expected.into_iter().collect::<Vec<_>>());
            }
        }
    }
}
