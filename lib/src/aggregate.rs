//! Group-and-count queries over a [`PlayLog`].

use crate::{
    playlog::{date_to_days, days_to_date, string_values, PlayLog},
    schema::*,
    Granularity, Result,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use parse_display::{Display, FromStr};
use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Columns a top-N chart can group on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, FromStr)]
#[display(style = "lowercase")]
pub enum GroupKey {
    Artist,
    Song,
    Artwork,
}

impl GroupKey {
    pub fn column(self) -> &'static str {
        match self {
            GroupKey::Artist => ARTIST,
            GroupKey::Song => SONG,
            GroupKey::Artwork => ARTWORK_LARGE,
        }
    }
}

/// Play count for one distinct combination of group keys, in key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub keys: Vec<Option<String>>,
    pub plays: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BucketCount {
    pub start: NaiveDate,
    pub plays: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtistTrend {
    pub artist: String,
    pub buckets: Vec<BucketCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimelineSummary {
    pub total_plays: usize,
    pub first_played: Option<NaiveDateTime>,
    pub last_played: Option<NaiveDateTime>,
}

/// One dot on the timeline scatter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelinePoint {
    pub date: NaiveDate,
    pub time_of_day: NaiveTime,
    pub artist: String,
    pub song: String,
}

impl PlayLog {
    /// The `n` largest groups by play count. Groups with equal counts keep the
    /// order in which they first appear in the log. Rows with a null in any key
    /// column belong to no group, so a song without artwork never shows up in an
    /// artwork chart.
    pub fn top_n(&self, keys: &[GroupKey], n: usize) -> Result<Vec<GroupCount>> {
        if keys.is_empty() {
            let all = GroupCount {
                keys: Vec::new(),
                plays: self.height() as u32,
            };
            return Ok(if self.is_empty() || n == 0 { vec![] } else { vec![all] });
        }

        let by: Vec<Expr> = keys.iter().map(|k| col(k.column())).collect();
        let has_keys = by
            .iter()
            .map(|k| k.clone().is_not_null())
            .reduce(|acc, e| acc.and(e))
            .unwrap_or(lit(true));
        let grouped = self
            .lazy_frame()
            .filter(has_keys)
            .group_by_stable(by)
            .agg([len().alias(PLAYS)])
            .collect()?;

        let key_values = keys
            .iter()
            .map(|k| string_values(&grouped, k.column()))
            .collect::<Result<Vec<_>>>()?;
        let plays = play_counts(&grouped)?;

        let mut counts: Vec<GroupCount> = plays
            .into_iter()
            .enumerate()
            .map(|(i, plays)| GroupCount {
                keys: key_values.iter().map(|column| column[i].clone()).collect(),
                plays,
            })
            .collect();
        // stable: ties stay in first-seen order
        counts.sort_by(|a, b| b.plays.cmp(&a.plays));
        counts.truncate(n);

        log::debug!("top {} of {} groups by {:?}", counts.len(), grouped.height(), keys);
        Ok(counts)
    }

    /// The `n` most played artists, most played first.
    pub fn top_artists(&self, n: usize) -> Result<Vec<String>> {
        let artists = self
            .top_n(&[GroupKey::Artist], n)?
            .into_iter()
            .filter_map(|count| count.keys.into_iter().next().flatten())
            .collect();
        Ok(artists)
    }

    /// Plays per interval, oldest first. Intervals without plays are omitted.
    pub fn time_buckets(&self, granularity: Granularity) -> Result<Vec<BucketCount>> {
        let frame = DataFrame::new(vec![self.bucket_series(granularity)?])?;
        let mut buckets = count_by(frame.lazy(), BUCKET)?
            .into_iter()
            .filter_map(|(days, plays)| Some(BucketCount { start: days_to_date(days)?, plays }))
            .collect::<Vec<_>>();
        buckets.sort_by_key(|b| b.start);
        Ok(buckets)
    }

    /// Plays per hour of day, for the hours that have any.
    pub fn hour_of_day(&self) -> Result<BTreeMap<u32, u32>> {
        let counts = count_by(self.lazy_frame(), HOUR)?
            .into_iter()
            .map(|(hour, plays)| (hour as u32, plays))
            .collect();
        Ok(counts)
    }

    /// Plays per weekday, always Monday through Sunday.
    pub fn day_of_week(&self) -> Result<Vec<(Weekday, u32)>> {
        let mut totals = [0u32; 7];
        for (day, plays) in count_by(self.lazy_frame(), WEEKDAY)? {
            if let Some(slot) = totals.get_mut(day as usize) {
                *slot += plays;
            }
        }
        Ok(WEEK.into_iter().zip(totals).collect())
    }

    /// Per-artist bucket counts for the selected artists, in selection order.
    /// Artists without plays come back with no buckets.
    pub fn artist_trends<S: AsRef<str>>(
        &self,
        artists: &[S],
        granularity: Granularity,
    ) -> Result<Vec<ArtistTrend>> {
        let frame = DataFrame::new(vec![
            self.column(ARTIST)?.clone(),
            self.bucket_series(granularity)?,
        ])?;
        let grouped = frame
            .lazy()
            .group_by_stable([col(ARTIST), col(BUCKET)])
            .agg([len().alias(PLAYS)])
            .collect()?;

        let names = string_values(&grouped, ARTIST)?;
        let bucket_days = grouped.column(BUCKET)?.cast(&DataType::Int32)?;
        let plays = play_counts(&grouped)?;

        let mut by_artist: BTreeMap<String, Vec<BucketCount>> = BTreeMap::new();
        for ((name, days), plays) in names.into_iter().zip(bucket_days.i32()?).zip(plays) {
            if let (Some(name), Some(start)) = (name, days.and_then(days_to_date)) {
                by_artist.entry(name).or_default().push(BucketCount { start, plays });
            }
        }

        let trends = artists
            .iter()
            .map(|artist| {
                let artist = artist.as_ref().to_string();
                let mut buckets = by_artist.get(&artist).cloned().unwrap_or_default();
                buckets.sort_by_key(|b| b.start);
                ArtistTrend { artist, buckets }
            })
            .collect();
        Ok(trends)
    }

    pub fn timeline_summary(&self) -> Result<TimelineSummary> {
        let events = self.events()?;
        Ok(TimelineSummary {
            total_plays: events.len(),
            first_played: events.iter().map(|e| e.timestamp).min(),
            last_played: events.iter().map(|e| e.timestamp).max(),
        })
    }

    pub fn timeline_points(&self) -> Result<Vec<TimelinePoint>> {
        let points = self
            .events()?
            .into_iter()
            .map(|e| TimelinePoint {
                date: e.timestamp.date(),
                time_of_day: e.timestamp.time(),
                artist: e.artist,
                song: e.song,
            })
            .collect();
        Ok(points)
    }

    /// Artwork of the first play of `song` by `artist` that carries one.
    pub fn artwork_for(&self, artist: &str, song: &str) -> Result<Option<String>> {
        let matches = self
            .lazy_frame()
            .filter(
                col(ARTIST)
                    .eq(lit(artist))
                    .and(col(SONG).eq(lit(song)))
                    .and(col(ARTWORK_LARGE).is_not_null()),
            )
            .collect()?;
        Ok(string_values(&matches, ARTWORK_LARGE)?.into_iter().flatten().next())
    }

    /// Bucket start of every row, as a date column.
    fn bucket_series(&self, granularity: Granularity) -> Result<Series> {
        let days = self.column(DATE)?.cast(&DataType::Int32)?;
        let buckets: Vec<Option<i32>> = days
            .i32()?
            .into_iter()
            .map(|d| {
                d.and_then(days_to_date)
                    .map(|date| date_to_days(granularity.bucket_start(date)))
            })
            .collect();
        Ok(Series::new(BUCKET, buckets).cast(&DataType::Date)?)
    }
}

/// Rows per distinct value of an integer-like column, in first-seen order.
fn count_by(frame: LazyFrame, column: &str) -> Result<Vec<(i32, u32)>> {
    let grouped = frame
        .group_by_stable([col(column)])
        .agg([len().alias(PLAYS)])
        .collect()?;
    let keys = grouped.column(column)?.cast(&DataType::Int32)?;
    let plays = play_counts(&grouped)?;

    let counts = keys
        .i32()?
        .into_iter()
        .zip(plays)
        .filter_map(|(key, plays)| Some((key?, plays)))
        .collect();
    Ok(counts)
}

fn play_counts(grouped: &DataFrame) -> Result<Vec<u32>> {
    let plays = grouped.column(PLAYS)?.cast(&DataType::UInt32)?;
    let counts = plays.u32()?.into_iter().map(|p| p.unwrap_or(0)).collect();
    Ok(counts)
}
