use crate::schema::*;
use chrono::NaiveDate;
use polars::prelude::*;

/// Builds the sidebar predicate: date range, artist and song selections.
/// Unset parts leave the log unconstrained.
#[derive(Clone, Default)]
pub struct PlayFilter {
    filter_expr: Option<Expr>,
}

impl PlayFilter {
    pub fn new() -> Self {
        Self { filter_expr: None }
    }

    // Inclusive on both ends, compared on calendar date
    pub fn date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        let expr = col(DATE).is_between(lit(start), lit(end), ClosedInterval::Both);
        self.extend_filter(expr)
    }

    pub fn since(mut self, start: NaiveDate) -> Self {
        let expr = col(DATE).gt_eq(lit(start));
        self.extend_filter(expr)
    }

    pub fn until(mut self, end: NaiveDate) -> Self {
        let expr = col(DATE).lt_eq(lit(end));
        self.extend_filter(expr)
    }

    pub fn artist(mut self, artist: &str) -> Self {
        let expr = col(ARTIST).eq(lit(artist));
        self.extend_filter(expr)
    }

    pub fn song(mut self, song: &str) -> Self {
        let expr = col(SONG).eq(lit(song));
        self.extend_filter(expr)
    }

    // Multi-select: matches any of the given artists, nothing when empty
    pub fn any_artist<S: AsRef<str>>(mut self, artists: &[S]) -> Self {
        let expr = any_of(ARTIST, artists);
        self.extend_filter(expr)
    }

    pub fn any_song<S: AsRef<str>>(mut self, songs: &[S]) -> Self {
        let expr = any_of(SONG, songs);
        self.extend_filter(expr)
    }

    // Combines the current filter with a new one using AND logic
    fn extend_filter(&mut self, new_expr: Expr) -> Self {
        self.filter_expr = match self.filter_expr.take() {
            Some(existing_expr) => Some(existing_expr.and(new_expr)),
            None => Some(new_expr),
        };
        self.clone()
    }

    // Builds the final filter expression
    pub fn build(self) -> Expr {
        self.filter_expr.unwrap_or_else(|| lit(true))
    }
}

fn any_of<S: AsRef<str>>(column: &str, values: &[S]) -> Expr {
    values
        .iter()
        .map(|v| col(column).eq(lit(v.as_ref())))
        .reduce(|acc, expr| acc.or(expr))
        .unwrap_or_else(|| lit(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlog::tests::{play, scenario_log};
    use crate::playlog::PlayLog;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn songs(log: &PlayLog) -> Vec<String> {
        log.events().unwrap().into_iter().map(|e| e.song).collect()
    }

    #[test]
    fn unconstrained_filter_keeps_everything() {
        let log = scenario_log();
        let once = log.filter(PlayFilter::new().build()).unwrap();
        let twice = once.filter(PlayFilter::new().build()).unwrap();
        assert_eq!(once.events().unwrap(), log.events().unwrap());
        assert_eq!(twice.events().unwrap(), log.events().unwrap());
    }

    #[test]
    fn date_range_is_inclusive() {
        let log = PlayLog::from_events(&[
            play("2024-01-01T23:59", "A", "d1"),
            play("2024-01-02T00:00", "A", "d2"),
            play("2024-01-03T23:59", "A", "d3"),
            play("2024-01-04T00:00", "A", "d4"),
        ])
        .unwrap();

        let filter = PlayFilter::new().date_range(date(2024, 1, 2), date(2024, 1, 3));
        assert_eq!(songs(&log.filter(filter.build()).unwrap()), vec!["d2", "d3"]);

        let open_ended = PlayFilter::new().since(date(2024, 1, 3));
        assert_eq!(songs(&log.filter(open_ended.build()).unwrap()), vec!["d3", "d4"]);

        let upper = PlayFilter::new().until(date(2024, 1, 1));
        assert_eq!(songs(&log.filter(upper.build()).unwrap()), vec!["d1"]);
    }

    #[test]
    fn artist_and_song_combine_with_and() {
        let log = PlayLog::from_events(&[
            play("2024-01-01T10:00", "A", "X"),
            play("2024-01-01T11:00", "A", "Y"),
            play("2024-01-01T12:00", "B", "X"),
        ])
        .unwrap();

        let filtered = log
            .filter(PlayFilter::new().artist("A").song("X").build())
            .unwrap();
        assert_eq!(filtered.len(), 1);

        let none = log.filter(PlayFilter::new().artist("C").build()).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn multi_select() {
        let log = PlayLog::from_events(&[
            play("2024-01-01T10:00", "A", "1"),
            play("2024-01-01T11:00", "B", "2"),
            play("2024-01-01T12:00", "C", "3"),
        ])
        .unwrap();

        let picked = log.filter(PlayFilter::new().any_artist(&["C", "A"]).build()).unwrap();
        assert_eq!(songs(&picked), vec!["1", "3"]);

        let nothing: [&str; 0] = [];
        let empty = log.filter(PlayFilter::new().any_song(&nothing).build()).unwrap();
        assert!(empty.is_empty());
    }
}
