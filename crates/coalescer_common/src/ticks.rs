//! 100-nanosecond tick arithmetic.
//!
//! Wake timer due times and waitable timer fire times are both counted in
//! FILETIME units: 100 ns ticks. Absolute values count from 1601-01-01 UTC.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Ticks in one millisecond
pub const TICKS_PER_MILLI: u64 = 10_000;

/// Ticks in one second
pub const TICKS_PER_SECOND: u64 = 1_000 * TICKS_PER_MILLI;

/// Ticks in one hour
pub const TICKS_PER_HOUR: u64 = 3_600 * TICKS_PER_SECOND;

/// Seconds between the FILETIME epoch (1601) and the Unix epoch (1970)
pub const FILETIME_UNIX_OFFSET_SECS: i64 = 11_644_473_600;

/// Whole hours in a tick span, rounded down.
pub fn whole_hours(span: u64) -> u64 {
    span / TICKS_PER_HOUR
}

/// Lead time for a span, in ticks.
///
/// The span is measured in 1/10000 hour steps, so a span of exactly N hours
/// yields exactly `N * lead_ms_per_hour` milliseconds.
pub fn lead_for_span(span: u64, lead_ms_per_hour: u32) -> u64 {
    (span / (TICKS_PER_HOUR / TICKS_PER_MILLI)).saturating_mul(u64::from(lead_ms_per_hour))
}

/// Tick span as a `Duration`.
pub fn to_duration(span: u64) -> Duration {
    Duration::new(
        span / TICKS_PER_SECOND,
        ((span % TICKS_PER_SECOND) * 100) as u32,
    )
}

/// Absolute FILETIME as a UTC timestamp, if it falls in chrono's range.
pub fn filetime_to_utc(filetime: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(filetime / TICKS_PER_SECOND).ok()? - FILETIME_UNIX_OFFSET_SECS;
    let nanos = ((filetime % TICKS_PER_SECOND) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_whole_hours_rounds_down() {
        assert_eq!(whole_hours(0), 0);
        assert_eq!(whole_hours(TICKS_PER_HOUR - 1), 0);
        assert_eq!(whole_hours(3 * TICKS_PER_HOUR + 59 * 60 * TICKS_PER_SECOND), 3);
    }

    #[test]
    fn test_lead_for_whole_hours_is_exact() {
        for hours in 0..48u64 {
            assert_eq!(
                lead_for_span(hours * TICKS_PER_HOUR, 25_000),
                hours * 25_000 * TICKS_PER_MILLI
            );
        }
    }

    #[test]
    fn test_lead_for_fractional_hours() {
        // 1.5 hours at 1000 ms/h is 1.5 s
        let span = TICKS_PER_HOUR + TICKS_PER_HOUR / 2;
        assert_eq!(lead_for_span(span, 1_000), 1_500 * TICKS_PER_MILLI);
    }

    #[test]
    fn test_lead_saturates() {
        assert_eq!(lead_for_span(u64::MAX, u32::MAX), u64::MAX);
    }

    #[test]
    fn test_to_duration() {
        assert_eq!(to_duration(TICKS_PER_SECOND * 2 + 5), Duration::new(2, 500));
        assert_eq!(to_duration(3 * TICKS_PER_MILLI), Duration::from_millis(3));
    }

    #[test]
    fn test_filetime_unix_epoch() {
        let epoch = FILETIME_UNIX_OFFSET_SECS as u64 * TICKS_PER_SECOND;
        assert_eq!(filetime_to_utc(epoch), Some(Utc.timestamp_opt(0, 0).unwrap()));
    }

    #[test]
    fn test_filetime_known_date() {
        let time = Utc.with_ymd_and_hms(2026, 10, 19, 3, 30, 0).unwrap();
        assert_eq!(filetime_to_utc(134_368_542_000_000_000), Some(time));
        // Sub-second ticks carry through as nanoseconds
        let later = filetime_to_utc(134_368_542_000_000_005).unwrap();
        assert_eq!(later.timestamp_subsec_nanos(), 500);
    }
}
