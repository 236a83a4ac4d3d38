use crate::{
    clean::{self, CleaningRules, LoadReport},
    schema::*,
    source::Source,
    Result,
};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use derive_deref::Deref;
use itertools::{izip, Itertools};
use polars::prelude::*;
use serde::Serialize;
use std::io::Write;

/// Days between 0001-01-01 (CE day 1) and 1970-01-01.
const UNIX_EPOCH_FROM_CE: i32 = 719_163;

const EXPORT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// One song play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayEvent {
    pub pick_id: Option<String>,
    pub timestamp: NaiveDateTime,
    pub artist: String,
    pub song: String,
    pub artwork_large: Option<String>,
}

impl PlayEvent {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }

    pub fn day_name(&self) -> String {
        self.timestamp.format("%A").to_string()
    }

    pub fn month_name(&self) -> String {
        self.timestamp.format("%B").to_string()
    }

    pub fn year(&self) -> i32 {
        self.timestamp.year()
    }
}

/// Immutable, cleaned play history for one session.
///
/// Every row has a timestamp, an artist and a song. Derived calendar columns
/// (`date`, `hour`, `weekday`, `month`, `year`) ride along for grouping.
#[derive(Clone, Deref)]
pub struct PlayLog(DataFrame);

impl PlayLog {
    /// Reads and cleans a source with the default rules.
    pub fn load(source: &Source) -> Result<Self> {
        let (log, _) = Self::load_with(source, &CleaningRules::default())?;
        Ok(log)
    }

    pub fn load_with(source: &Source, rules: &CleaningRules) -> Result<(Self, LoadReport)> {
        let bytes = source.read()?;
        log::debug!("read {} bytes from {}", bytes.len(), source);
        Self::from_csv_bytes(bytes, rules)
    }

    pub fn from_csv_bytes(bytes: Vec<u8>, rules: &CleaningRules) -> Result<(Self, LoadReport)> {
        let raw = crate::read_csv_strings(bytes)?;
        clean::clean(&raw, rules)
    }

    /// Builds a log from events that are already clean. No exclusion rules apply.
    pub fn from_events(events: &[PlayEvent]) -> Result<Self> {
        let micros: Vec<i64> = events
            .iter()
            .map(|e| e.timestamp.and_utc().timestamp_micros())
            .collect();
        let days: Vec<i32> = events.iter().map(|e| date_to_days(e.date())).collect();

        let df = DataFrame::new(vec![
            Series::new(
                PICK_ID,
                events.iter().map(|e| e.pick_id.clone()).collect::<Vec<_>>(),
            ),
            Series::new(TIMESTAMP, micros)
                .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?,
            Series::new(
                ARTIST,
                events.iter().map(|e| e.artist.clone()).collect::<Vec<_>>(),
            ),
            Series::new(
                SONG,
                events.iter().map(|e| e.song.clone()).collect::<Vec<_>>(),
            ),
            Series::new(
                ARTWORK_LARGE,
                events
                    .iter()
                    .map(|e| e.artwork_large.clone())
                    .collect::<Vec<_>>(),
            ),
            Series::new(DATE, days).cast(&DataType::Date)?,
            Series::new(HOUR, events.iter().map(|e| e.hour()).collect::<Vec<u32>>()),
            Series::new(
                WEEKDAY,
                events
                    .iter()
                    .map(|e| e.timestamp.weekday().num_days_from_monday())
                    .collect::<Vec<u32>>(),
            ),
            Series::new(
                MONTH,
                events.iter().map(|e| e.timestamp.month()).collect::<Vec<u32>>(),
            ),
            Series::new(YEAR, events.iter().map(|e| e.year()).collect::<Vec<i32>>()),
        ])?;
        Ok(PlayLog(df))
    }

    pub fn len(&self) -> usize {
        self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0
    }

    pub(crate) fn lazy_frame(&self) -> LazyFrame {
        self.0.clone().lazy()
    }

    /// Order-preserving selection. An empty result is a valid log.
    pub fn filter(&self, filter: Expr) -> Result<Self> {
        let df = self.lazy_frame().filter(filter).collect()?;
        log::debug!("{} of {} plays match filter", df.height(), self.height());
        Ok(PlayLog(df))
    }

    /// Materialises the rows in log order.
    ///
    /// Every row of a log built by loading or [`PlayLog::from_events`] has a
    /// timestamp, artist and song, and [`PlayLog::filter`] only removes rows,
    /// so one event comes back per row. A row missing any of the three would be
    /// skipped.
    pub fn events(&self) -> Result<Vec<PlayEvent>> {
        let pick_ids = string_values(&self.0, PICK_ID)?;
        let artists = string_values(&self.0, ARTIST)?;
        let songs = string_values(&self.0, SONG)?;
        let artwork = string_values(&self.0, ARTWORK_LARGE)?;
        let micros = self.column(TIMESTAMP)?.cast(&DataType::Int64)?;

        let events = izip!(pick_ids, micros.i64()?, artists, songs, artwork)
            .filter_map(|(pick_id, micros, artist, song, artwork_large)| {
                Some(PlayEvent {
                    pick_id,
                    timestamp: micros_to_datetime(micros?)?,
                    artist: artist?,
                    song: song?,
                    artwork_large,
                })
            })
            .collect();
        Ok(events)
    }

    /// Earliest and latest calendar dates, or `None` for an empty log.
    pub fn date_range(&self) -> Result<Option<(NaiveDate, NaiveDate)>> {
        let days = self.column(DATE)?.cast(&DataType::Int32)?;
        let days = days.i32()?;
        let range = match (days.min(), days.max()) {
            (Some(min), Some(max)) => days_to_date(min).zip(days_to_date(max)),
            _ => None,
        };
        Ok(range)
    }

    /// Distinct artists, sorted, for selection widgets.
    pub fn artists(&self) -> Result<Vec<String>> {
        distinct_sorted(&self.0, ARTIST)
    }

    /// Distinct songs, sorted.
    pub fn songs(&self) -> Result<Vec<String>> {
        distinct_sorted(&self.0, SONG)
    }

    /// Distinct songs played by `artist`, sorted. `None` lists every song.
    pub fn songs_for_artist(&self, artist: Option<&str>) -> Result<Vec<String>> {
        match artist {
            Some(artist) => {
                let df = self
                    .lazy_frame()
                    .filter(col(ARTIST).eq(lit(artist)))
                    .collect()?;
                distinct_sorted(&df, SONG)
            }
            None => self.songs(),
        }
    }

    /// Most recent plays first; plays sharing a timestamp keep log order.
    pub fn recent_plays(&self, limit: usize) -> Result<Vec<PlayEvent>> {
        let mut events = self.events()?;
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(limit);
        Ok(events)
    }

    /// Writes the source columns as UTF-8 CSV with a header row.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let micros = self.column(TIMESTAMP)?.cast(&DataType::Int64)?;
        let timestamps: Vec<Option<String>> = micros
            .i64()?
            .into_iter()
            .map(|m| {
                m.and_then(micros_to_datetime)
                    .map(|ts| ts.format(EXPORT_TIMESTAMP_FORMAT).to_string())
            })
            .collect();

        let mut out = DataFrame::new(vec![
            self.column(PICK_ID)?.clone(),
            Series::new(TIMESTAMP, timestamps),
            self.column(ARTIST)?.clone(),
            self.column(SONG)?.clone(),
            self.column(ARTWORK_LARGE)?.clone(),
        ])?;
        CsvWriter::new(writer)
            .include_header(true)
            .finish(&mut out)?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

pub(crate) fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_FROM_CE
}

pub(crate) fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_FROM_CE)
}

pub(crate) fn micros_to_datetime(micros: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_micros(micros).map(|dt| dt.naive_utc())
}

/// Reads a column as owned strings, casting non-string columns first.
pub(crate) fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let s = df.column(name)?.cast(&DataType::String)?;
    let values = s.str()?.into_iter().map(|v| v.map(str::to_string)).collect();
    Ok(values)
}

fn distinct_sorted(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let values = df
        .column(name)?
        .str()?
        .into_iter()
        .flatten()
        .unique()
        .sorted()
        .map(str::to_string)
        .collect();
    Ok(values)
}
