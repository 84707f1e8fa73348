//! Date and duration helpers

use chrono::{DateTime, Utc};

/// Truncate a datetime to the start of its UTC day.
///
/// Upstream date filters operate at day granularity, so the fetch watermark
/// is floored before being passed along.
#[must_use]
pub fn day_floor(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive()
        .and_hms_opt(0, 0, 0)
        .map_or(ts, |naive| naive.and_utc())
}

/// Format a duration in seconds as `HH:MM:SS` for `itunes:duration`.
///
/// Negative values are clamped to zero.
#[must_use]
pub fn format_itunes_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let (mins, sec) = (seconds / 60, seconds % 60);
    let (hr, mins) = (mins / 60, mins % 60);
    format!("{hr:02}:{mins:02}:{sec:02}")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use test_case::test_case;

    use super::*;

    #[test]
    fn floors_to_midnight_utc() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 15, 18, 42, 7).unwrap();
        let floored = day_floor(ts);
        assert_eq!(
            floored,
            Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap()
        );
    }

    #[test_case(0, "00:00:00")]
    #[test_case(59, "00:00:59")]
    #[test_case(620, "00:10:20")]
    #[test_case(3600, "01:00:00")]
    #[test_case(86399, "23:59:59")]
    #[test_case(-5, "00:00:00"; "negative clamps to zero")]
    fn formats_durations(seconds: i64, expected: &str) {
        assert_eq!(format_itunes_duration(seconds), expected);
    }
}
