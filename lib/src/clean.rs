use crate::{
    error::Error,
    playlog::{string_values, PlayEvent, PlayLog},
    schema::*,
    Result,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use itertools::izip;
use polars::prelude::*;

const TIMESTAMP_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Placeholders and exclusion markers applied while loading.
///
/// Markers match as case-sensitive substrings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleaningRules {
    pub unknown_artist: String,
    pub unknown_song: String,
    pub excluded_artist_markers: Vec<String>,
    pub excluded_song_markers: Vec<String>,
}

impl CleaningRules {
    /// The station's own idents and promo spots are dropped.
    pub fn wmw() -> Self {
        Self {
            excluded_artist_markers: vec!["The WMW Radio Network".to_string()],
            excluded_song_markers: vec!["Promo".to_string()],
            ..Self::none()
        }
    }

    /// Placeholders only; nothing is excluded.
    pub fn none() -> Self {
        Self {
            unknown_artist: "Unknown Artist".to_string(),
            unknown_song: "Unknown Song".to_string(),
            excluded_artist_markers: Vec::new(),
            excluded_song_markers: Vec::new(),
        }
    }

    pub fn exclude_artist(mut self, marker: &str) -> Self {
        self.excluded_artist_markers.push(marker.to_string());
        self
    }

    pub fn exclude_song(mut self, marker: &str) -> Self {
        self.excluded_song_markers.push(marker.to_string());
        self
    }

    pub fn is_excluded(&self, artist: &str, song: &str) -> bool {
        self.excluded_artist_markers
            .iter()
            .any(|m| artist.contains(m.as_str()))
            || self
                .excluded_song_markers
                .iter()
                .any(|m| song.contains(m.as_str()))
    }

    fn artist_or_placeholder(&self, artist: Option<String>) -> String {
        non_blank(artist).unwrap_or_else(|| self.unknown_artist.clone())
    }

    fn song_or_placeholder(&self, song: Option<String>) -> String {
        non_blank(song).unwrap_or_else(|| self.unknown_song.clone())
    }
}

impl Default for CleaningRules {
    fn default() -> Self {
        Self::wmw()
    }
}

/// What happened to the raw rows during cleaning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub rows_read: usize,
    pub unparseable_timestamps: usize,
    pub excluded: usize,
    pub retained: usize,
}

/// Parses the ISO-8601 shapes seen in play exports. A timestamp with an offset
/// keeps its wall-clock time, so hours and dates stay in the station's local time.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.naive_local());
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| Error::InvalidTimestamp(value.to_string()))
}

pub(crate) fn clean(raw: &DataFrame, rules: &CleaningRules) -> Result<(PlayLog, LoadReport)> {
    for name in REQUIRED {
        if raw.column(name).is_err() {
            return Err(Error::MissingColumn(name.to_string()));
        }
    }

    let height = raw.height();
    let timestamps = string_values(raw, TIMESTAMP)?;
    let artists = string_values(raw, ARTIST)?;
    let songs = string_values(raw, SONG)?;
    let pick_ids = optional_values(raw, PICK_ID)?;
    let artwork = optional_values(raw, ARTWORK_LARGE)?;

    let mut report = LoadReport {
        rows_read: height,
        ..Default::default()
    };
    let mut events = Vec::with_capacity(height);

    for (row, (timestamp, artist, song, pick_id, artwork_large)) in
        izip!(timestamps, artists, songs, pick_ids, artwork).enumerate()
    {
        let parsed = timestamp
            .as_deref()
            .ok_or_else(|| Error::InvalidTimestamp(String::new()))
            .and_then(parse_timestamp);
        let timestamp = match parsed {
            Ok(ts) => ts,
            Err(e) => {
                log::trace!("row {}: {}", row, e);
                report.unparseable_timestamps += 1;
                continue;
            }
        };

        let artist = rules.artist_or_placeholder(artist);
        let song = rules.song_or_placeholder(song);
        if rules.is_excluded(&artist, &song) {
            report.excluded += 1;
            continue;
        }

        events.push(PlayEvent {
            pick_id: non_blank(pick_id),
            timestamp,
            artist,
            song,
            artwork_large: non_blank(artwork_large),
        });
    }
    report.retained = events.len();

    if report.unparseable_timestamps > 0 {
        log::warn!(
            "dropped {} rows with missing or unparseable timestamps",
            report.unparseable_timestamps
        );
    }
    log::debug!(
        "{} rows read, {} excluded, {} retained",
        report.rows_read,
        report.excluded,
        report.retained
    );

    Ok((PlayLog::from_events(&events)?, report))
}

/// Values of an optional column, or all-null when the column is absent.
fn optional_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    match df.column(name) {
        Ok(_) => string_values(df, name),
        Err(_) => Ok(vec![None; df.height()]),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(csv: &str) -> Result<(PlayLog, LoadReport)> {
        PlayLog::from_csv_bytes(csv.as_bytes().to_vec(), &CleaningRules::default())
    }

    #[test]
    fn timestamp_shapes() {
        let expected = NaiveDate::from_ymd_opt(2025, 2, 6)
            .unwrap()
            .and_hms_micro_opt(0, 38, 5, 950_755)
            .unwrap();
        assert_eq!(parse_timestamp("2025-02-06T00:38:05.950755").unwrap(), expected);
        assert_eq!(parse_timestamp("2025-02-06 00:38:05.950755").unwrap(), expected);
        assert_eq!(
            parse_timestamp(" 2025-02-06T00:38:05.950755-05:00 ").unwrap(),
            expected
        );
        assert_eq!(
            parse_timestamp("2024-01-01T10:00").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(10, 0, 0).unwrap()
        );
        assert_eq!(
            parse_timestamp("2024-01-01").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(Error::InvalidTimestamp(v)) if v == "yesterday"
        ));
    }

    #[test]
    fn offset_timestamps_keep_local_hour_and_date() {
        let csv = "\
timestamp,artist,song
2025-02-06T01:38:05+01:00,A,X
2025-02-06T23:30:00-05:00,A,Y
";
        let (log, _) = load(csv).unwrap();
        let events = log.events().unwrap();
        assert_eq!(events[0].hour(), 1);
        assert_eq!(events[1].hour(), 23);
        assert_eq!(events[1].date(), NaiveDate::from_ymd_opt(2025, 2, 6).unwrap());
        assert_eq!(log.hour_of_day().unwrap().keys().copied().collect::<Vec<_>>(), vec![1, 23]);
    }

    #[test]
    fn network_and_promo_rows_are_excluded() {
        let csv = "\
pick_id,timestamp,artist,song,artwork_large
1,2025-02-06T00:38:05.950755,The WMW Radio Network,Daily Rewind (w/Chris),https://example.com/a.jpg
2,2025-02-06T01:01:01.504661,Moby,Bodyrock,https://example.com/b.jpg
3,2025-02-06T01:02:00,Someone,Station Promo 3,
4,2025-02-06T01:03:00,Someone,promo (lowercase stays),
";
        let (log, report) = load(csv).unwrap();
        assert_eq!(report.excluded, 2);
        assert_eq!(report.retained, 2);
        assert_eq!(log.artists().unwrap(), vec!["Moby", "Someone"]);
    }

    #[test]
    fn missing_names_get_placeholders() {
        let csv = "\
timestamp,artist,song
2024-01-01T10:00:00,,Song
2024-01-01T11:00:00,Artist,
2024-01-01T12:00:00,  ,
";
        let (log, report) = load(csv).unwrap();
        assert_eq!(report.retained, 3);
        let events = log.events().unwrap();
        assert_eq!(events[0].artist, "Unknown Artist");
        assert_eq!(events[1].song, "Unknown Song");
        assert_eq!(events[2].artist, "Unknown Artist");
        assert_eq!(events[2].song, "Unknown Song");
        assert!(events.iter().all(|e| e.pick_id.is_none() && e.artwork_large.is_none()));
    }

    #[test]
    fn unparseable_timestamps_are_dropped_and_counted() {
        let csv = "\
timestamp,artist,song
2024-01-01T10:00:00,A,X
not a date,A,X
,A,X
";
        let (log, report) = load(csv).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(report.rows_read, 3);
        assert_eq!(report.unparseable_timestamps, 2);
    }

    #[test]
    fn missing_required_column_fails() {
        let csv = "pick_id,timestamp,artist\n1,2024-01-01T10:00:00,A\n";
        assert!(matches!(load(csv), Err(Error::MissingColumn(c)) if c == "song"));
    }

    #[test]
    fn custom_markers() {
        let rules = CleaningRules::none().exclude_artist("Jingle").exclude_song("Ad Break");
        assert!(rules.is_excluded("Jingle Crew", "x"));
        assert!(rules.is_excluded("x", "Big Ad Break"));
        assert!(!rules.is_excluded("The WMW Radio Network", "Promo"));
        assert!(CleaningRules::default().is_excluded("The WMW Radio Network", "x"));
    }
}
