//! Pure timestamp arithmetic: elapsed seconds and report window bounds.
//! Everything here is deterministic; the caller supplies the reference date,
//! and windows are computed on the UTC timeline.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};

/// Whole seconds between two instants, truncated (floor for `end >= start`).
pub fn elapsed_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_seconds()
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).unwrap().and_utc()
}

/// Last representable millisecond of the day; windows are inclusive on both
/// ends, so a timestamp at 23:59:59.999 still falls inside.
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_milli_opt(23, 59, 59, 999).unwrap().and_utc()
}

pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    (start_of_day(date), end_of_day(date))
}

/// The Sunday on or before the given date.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.weekday().num_days_from_sunday()))
}

/// Sunday-start 7-day window containing the given date.
pub fn week_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = week_start(date);
    (start_of_day(start), end_of_day(start + Days::new(6)))
}

/// First through last calendar day of the date's month.
pub fn month_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let first = date.with_day(1).unwrap();
    let last = first + Months::new(1) - Days::new(1);
    (start_of_day(first), end_of_day(last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn elapsed_is_zero_for_equal_instants() {
        let t = start_of_day(date(2026, 8, 7));
        assert_eq!(elapsed_seconds(t, t), 0);
    }

    #[test]
    fn elapsed_truncates_subsecond_remainder() {
        let start = date(2026, 8, 7).and_hms_milli_opt(10, 0, 0, 0).unwrap().and_utc();
        let end = date(2026, 8, 7).and_hms_milli_opt(10, 1, 30, 900).unwrap().and_utc();
        assert_eq!(elapsed_seconds(start, end), 90);
    }

    #[test]
    fn day_bounds_are_inclusive_of_last_millisecond() {
        let (start, end) = day_bounds(date(2026, 8, 7));
        let last_ms = date(2026, 8, 7).and_hms_milli_opt(23, 59, 59, 999).unwrap().and_utc();
        let next_day = date(2026, 8, 8).and_hms_milli_opt(0, 0, 0, 0).unwrap().and_utc();

        assert!(last_ms >= start && last_ms <= end);
        assert!(next_day > end);
    }

    #[test]
    fn week_starts_on_sunday() {
        // 2026-08-07 is a Friday; its week began on Sunday the 2nd.
        let start = week_start(date(2026, 8, 7));
        assert_eq!(start, date(2026, 8, 2));
        assert_eq!(start.weekday(), Weekday::Sun);

        // A Sunday is its own week start.
        assert_eq!(week_start(date(2026, 8, 2)), date(2026, 8, 2));
    }

    #[test]
    fn week_bounds_span_seven_days() {
        let (start, end) = week_bounds(date(2026, 8, 7));
        assert_eq!(start, start_of_day(date(2026, 8, 2)));
        assert_eq!(end, end_of_day(date(2026, 8, 8)));
    }

    #[test]
    fn month_bounds_handle_leap_february() {
        let (start, end) = month_bounds(date(2024, 2, 15));
        assert_eq!(start, start_of_day(date(2024, 2, 1)));
        assert_eq!(end, end_of_day(date(2024, 2, 29)));
    }

    #[test]
    fn month_bounds_handle_year_end() {
        let (start, end) = month_bounds(date(2025, 12, 31));
        assert_eq!(start, start_of_day(date(2025, 12, 1)));
        assert_eq!(end, end_of_day(date(2025, 12, 31)));
    }
}
