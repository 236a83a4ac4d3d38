use chrono::{Datelike, Duration, NaiveDate};
use parse_display::{Display, FromStr};
use polars::prelude::*;
use std::io::Cursor;

pub mod aggregate;
pub mod cache;
pub mod clean;
mod error;
pub mod filter;
pub mod page;
pub mod playlog;
pub mod schema;
pub mod source;

pub use clean::{CleaningRules, LoadReport};
pub use error::Error;
pub use playlog::{PlayEvent, PlayLog};
pub use source::Source;

type Result<T> = std::result::Result<T, error::Error>;

/// Width of the intervals used for trend charts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, FromStr)]
#[display(style = "lowercase")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    /// First day of the bucket containing `date`. Weeks start on Monday.
    pub fn bucket_start(self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Daily => date,
            Granularity::Weekly => {
                date - Duration::days(date.weekday().num_days_from_monday() as i64)
            }
            Granularity::Monthly => date.with_day(1).unwrap_or(date),
        }
    }
}

/// Reads CSV bytes into a frame with every column typed as a string.
/// Header names are trimmed.
pub fn read_csv_strings(bytes: Vec<u8>) -> Result<DataFrame> {
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;

    let trimmed: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|c| c.trim().to_string())
        .collect();
    df.set_column_names(trimmed.as_slice())?;
    Ok(df)
}
