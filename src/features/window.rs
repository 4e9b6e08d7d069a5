//! Trailing time window over match history

use chrono::{Duration, NaiveDateTime};

use crate::MatchRecord;

/// Length of a window "month"
pub const DAYS_PER_MONTH: i64 = 30;

/// Earliest timestamp still inside a window ending at `as_of`
pub fn window_start(as_of: NaiveDateTime, months: u32) -> NaiveDateTime {
    as_of - Duration::days(i64::from(months) * DAYS_PER_MONTH)
}

/// Records inside the trailing window, in their original order
///
/// The window runs from `window_start` through `as_of`, both inclusive, so
/// results after `as_of` never leak into a backtest. When no record carries a
/// timestamp the whole set is returned unfiltered. Undated records are
/// excluded whenever any record is dated.
pub fn within_window(
    records: &[MatchRecord],
    as_of: NaiveDateTime,
    months: u32,
) -> Vec<&MatchRecord> {
    if !records.iter().any(|r| r.played_at.is_some()) {
        log::warn!(
            "No match timestamps available, using all {} records unfiltered",
            records.len()
        );
        return records.iter().collect();
    }

    let start = window_start(as_of, months);
    let recent: Vec<&MatchRecord> = records
        .iter()
        .filter(|r| r.played_at.is_some_and(|ts| ts >= start && ts <= as_of))
        .collect();

    log::info!(
        "{} of {} matches fall in the last {} months (since {})",
        recent.len(),
        records.len(),
        months,
        start.date()
    );

    recent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Side;
    use chrono::NaiveDate;

    fn at(month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, month, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn record(played_at: Option<NaiveDateTime>) -> MatchRecord {
        let mut r = MatchRecord::new("A", "B", 13, 5, Side::One).unwrap();
        r.played_at = played_at;
        r
    }

    #[test]
    fn test_window_start() {
        assert_eq!(window_start(at(4, 30), 3), at(1, 31));
    }

    #[test]
    fn test_filters_old_and_undated() {
        let records = vec![
            record(Some(at(1, 1))),
            record(None),
            record(Some(at(3, 15))),
            record(Some(at(4, 29))),
        ];
        let recent = within_window(&records, at(4, 30), 3);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].played_at, Some(at(3, 15)));
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let as_of = at(4, 30);
        let records = vec![record(Some(window_start(as_of, 3)))];
        assert_eq!(within_window(&records, as_of, 3).len(), 1);
    }

    #[test]
    fn test_matches_after_as_of_are_excluded() {
        let as_of = at(4, 30);
        let records = vec![
            record(Some(at(4, 1))),
            record(Some(as_of)),
            record(Some(at(5, 1))),
            record(Some(at(6, 15))),
        ];
        let recent = within_window(&records, as_of, 3);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].played_at, Some(as_of));
    }

    #[test]
    fn test_no_timestamps_uses_everything() {
        let records = vec![record(None), record(None)];
        assert_eq!(within_window(&records, at(4, 30), 3).len(), 2);
    }
}
