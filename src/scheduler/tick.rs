//! When the next pass should start.

use std::time::Duration;

use chrono::{DateTime, Utc};

const SECS_PER_HOUR: i64 = 3600;

/// Computes the next wake-up instant for a job loop.
pub trait TickPolicy: Send + Sync {
    /// The next instant strictly after `now` at which a pass should run.
    fn next_tick(&self, now: DateTime<Utc>) -> DateTime<Utc>;
}

/// Wakes at the top of every hour.
#[derive(Debug, Clone, Copy, Default)]
pub struct HourlyTick;

impl TickPolicy for HourlyTick {
    fn next_tick(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let secs = now.timestamp();
        let next = secs - secs.rem_euclid(SECS_PER_HOUR) + SECS_PER_HOUR;
        DateTime::from_timestamp(next, 0).unwrap_or(now + chrono::Duration::hours(1))
    }
}

/// Wakes a fixed interval after `now`.
///
/// The scheduler asks for the next tick once a pass has finished, so the
/// interval is measured from the end of the previous pass.
#[derive(Debug, Clone, Copy)]
pub struct IntervalTick(pub Duration);

impl TickPolicy for IntervalTick {
    fn next_tick(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let interval =
            chrono::Duration::from_std(self.0).unwrap_or_else(|_| chrono::Duration::hours(1));
        now + interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_hourly_tick_truncates_then_adds_hour() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 13, 27, 45).unwrap();
        let next = HourlyTick.next_tick(now);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 1, 14, 0, 0).unwrap());
    }

    #[test]
    fn test_hourly_tick_on_boundary_moves_forward() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 14, 0, 0).unwrap();
        let next = HourlyTick.next_tick(now);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 1, 15, 0, 0).unwrap());
    }

    #[test]
    fn test_hourly_tick_crosses_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        let next = HourlyTick.next_tick(now);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_interval_tick() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 13, 27, 45).unwrap();
        let next = IntervalTick(Duration::from_secs(90)).next_tick(now);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 1, 13, 29, 15).unwrap());
    }
}
