//! Next-fire-time computation for schedule cadences.
//!
//! Pure chrono math over UTC, separated from the control loop so the
//! calendar rules are testable without time mocking.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Timelike, Utc, Weekday};

use crate::settings::Cadence;

/// The first instant strictly after `after` at which the cadence fires.
///
/// Returns `None` only for a `CustomDays` cadence with an empty day list
/// (nothing to fire on).
pub fn next_fire(cadence: &Cadence, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match cadence {
        Cadence::Hourly => Some(next_top_of_hour(after)),
        Cadence::Daily { at } => next_matching_day(after, *at, |_| true),
        Cadence::Weekly { day, at } => next_matching_day(after, *at, |d| d == *day),
        Cadence::CustomDays { days, at } => {
            if days.is_empty() {
                return None;
            }
            next_matching_day(after, *at, |d| days.contains(&d))
        }
    }
}

fn next_top_of_hour(after: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = after
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(after);
    truncated + Duration::hours(1)
}

fn next_matching_day(
    after: DateTime<Utc>,
    at: NaiveTime,
    matches: impl Fn(Weekday) -> bool,
) -> Option<DateTime<Utc>> {
    // Today might still fire (time-of-day not reached), so the scan starts
    // at offset 0 and covers a full week.
    for offset in 0..=7 {
        let date = after.date_naive() + Duration::days(offset);
        if !matches(date.weekday()) {
            continue;
        }
        let candidate = Utc.from_utc_datetime(&date.and_time(at));
        if candidate > after {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).single().unwrap()
    }

    fn tod(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // ── hourly ───────────────────────────────────────────────────────────

    #[test]
    fn hourly_fires_on_the_next_hour() {
        // 2026-08-07 is a Friday.
        let next = next_fire(&Cadence::Hourly, utc(2026, 8, 7, 10, 17, 3)).unwrap();
        assert_eq!(next, utc(2026, 8, 7, 11, 0, 0));
    }

    #[test]
    fn hourly_on_the_hour_fires_the_following_hour() {
        let next = next_fire(&Cadence::Hourly, utc(2026, 8, 7, 10, 0, 0)).unwrap();
        assert_eq!(next, utc(2026, 8, 7, 11, 0, 0));
    }

    #[test]
    fn hourly_crosses_midnight() {
        let next = next_fire(&Cadence::Hourly, utc(2026, 8, 7, 23, 59, 59)).unwrap();
        assert_eq!(next, utc(2026, 8, 8, 0, 0, 0));
    }

    // ── daily ────────────────────────────────────────────────────────────

    #[test]
    fn daily_fires_today_if_time_not_reached() {
        let cadence = Cadence::Daily { at: tod(15, 30) };
        let next = next_fire(&cadence, utc(2026, 8, 7, 10, 0, 0)).unwrap();
        assert_eq!(next, utc(2026, 8, 7, 15, 30, 0));
    }

    #[test]
    fn daily_rolls_to_tomorrow_once_passed() {
        let cadence = Cadence::Daily { at: tod(15, 30) };
        let next = next_fire(&cadence, utc(2026, 8, 7, 15, 30, 0)).unwrap();
        assert_eq!(next, utc(2026, 8, 8, 15, 30, 0));
    }

    // ── weekly ───────────────────────────────────────────────────────────

    #[test]
    fn weekly_fires_on_the_configured_day() {
        let cadence = Cadence::Weekly {
            day: Weekday::Sat,
            at: tod(6, 0),
        };
        // Friday → next day.
        let next = next_fire(&cadence, utc(2026, 8, 7, 12, 0, 0)).unwrap();
        assert_eq!(next, utc(2026, 8, 8, 6, 0, 0));
    }

    #[test]
    fn weekly_same_day_past_time_waits_a_week() {
        let cadence = Cadence::Weekly {
            day: Weekday::Fri,
            at: tod(6, 0),
        };
        let next = next_fire(&cadence, utc(2026, 8, 7, 12, 0, 0)).unwrap();
        assert_eq!(next, utc(2026, 8, 14, 6, 0, 0));
    }

    // ── custom days ──────────────────────────────────────────────────────

    #[test]
    fn custom_days_picks_the_nearest_listed_day() {
        let cadence = Cadence::CustomDays {
            days: vec![Weekday::Mon, Weekday::Thu],
            at: tod(3, 0),
        };
        // Friday → Monday.
        let next = next_fire(&cadence, utc(2026, 8, 7, 12, 0, 0)).unwrap();
        assert_eq!(next, utc(2026, 8, 10, 3, 0, 0));
    }

    #[test]
    fn custom_days_can_fire_later_today() {
        let cadence = Cadence::CustomDays {
            days: vec![Weekday::Fri],
            at: tod(23, 0),
        };
        let next = next_fire(&cadence, utc(2026, 8, 7, 12, 0, 0)).unwrap();
        assert_eq!(next, utc(2026, 8, 7, 23, 0, 0));
    }

    #[test]
    fn empty_custom_days_never_fires() {
        let cadence = Cadence::CustomDays {
            days: vec![],
            at: tod(3, 0),
        };
        assert_eq!(next_fire(&cadence, utc(2026, 8, 7, 12, 0, 0)), None);
    }

    #[test]
    fn next_fire_is_always_strictly_in_the_future() {
        let after = utc(2026, 8, 7, 0, 0, 0);
        for cadence in [
            Cadence::Hourly,
            Cadence::Daily { at: tod(0, 0) },
            Cadence::Weekly {
                day: Weekday::Fri,
                at: tod(0, 0),
            },
        ] {
            let next = next_fire(&cadence, after).unwrap();
            assert!(next > after, "{:?} fired at or before 'after'", cadence);
        }
    }
}
