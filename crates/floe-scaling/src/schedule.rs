//! Cron schedule matching at minute resolution.
//!
//! A schedule "fires" for an evaluation tick when the tick instant,
//! truncated to the minute in the schedule's own timezone, matches the
//! cron expression. The engine remembers the last fired minute per
//! schedule so an expression matches at most once per minute regardless of
//! the evaluation cadence.

use std::fmt;

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use croner::Cron;

use floe_schemas::ScalingSchedule;

// ---------------------------------------------------------------------------
// ScheduleError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The stored cron expression does not parse.
    Cron(String),
    /// The stored timezone is not a known IANA name.
    Timezone(String),
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::Cron(msg) => write!(f, "invalid cron expression: {msg}"),
            ScheduleError::Timezone(name) => write!(f, "unknown timezone '{name}'"),
        }
    }
}

impl std::error::Error for ScheduleError {}

// ---------------------------------------------------------------------------
// matches_minute
// ---------------------------------------------------------------------------

/// Returns the UTC minute bucket when `schedule` matches `now`, `None`
/// otherwise.
pub fn matches_minute(
    schedule: &ScalingSchedule,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ScheduleError> {
    let tz: Tz = schedule
        .timezone
        .parse()
        .map_err(|_| ScheduleError::Timezone(schedule.timezone.clone()))?;

    let cron = Cron::new(&schedule.cron)
        .parse()
        .map_err(|e| ScheduleError::Cron(e.to_string()))?;

    let local = now.with_timezone(&tz);
    let bucket = local
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(local);

    let matched = cron
        .is_time_matching(&bucket)
        .map_err(|e| ScheduleError::Cron(e.to_string()))?;

    Ok(matched.then(|| bucket.with_timezone(&Utc)))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn schedule(cron: &str, tz: &str) -> ScalingSchedule {
        ScalingSchedule {
            id: Uuid::new_v4(),
            policy_id: Uuid::new_v4(),
            cron: cron.to_string(),
            desired_replicas: 4,
            timezone: tz.to_string(),
            enabled: true,
        }
    }

    #[test]
    fn every_minute_matches_any_tick() {
        let s = schedule("* * * * *", "UTC");
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 17).unwrap();
        let bucket = matches_minute(&s, now).unwrap().unwrap();
        assert_eq!(bucket, Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap());
    }

    #[test]
    fn ticks_in_the_same_minute_share_a_bucket() {
        let s = schedule("* * * * *", "UTC");
        let a = matches_minute(&s, Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 5).unwrap())
            .unwrap()
            .unwrap();
        let b = matches_minute(&s, Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 55).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(a, b, "same minute must bucket identically");
    }

    #[test]
    fn fixed_time_matches_only_that_minute() {
        let s = schedule("0 18 * * *", "UTC");
        let hit = Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 30).unwrap();
        let miss = Utc.with_ymd_and_hms(2026, 3, 2, 18, 1, 0).unwrap();
        assert!(matches_minute(&s, hit).unwrap().is_some());
        assert!(matches_minute(&s, miss).unwrap().is_none());
    }

    #[test]
    fn timezone_shifts_the_match() {
        // 18:00 in Berlin is 17:00 UTC during winter.
        let s = schedule("0 18 * * *", "Europe/Berlin");
        let utc_17 = Utc.with_ymd_and_hms(2026, 1, 15, 17, 0, 10).unwrap();
        let utc_18 = Utc.with_ymd_and_hms(2026, 1, 15, 18, 0, 10).unwrap();
        assert!(matches_minute(&s, utc_17).unwrap().is_some());
        assert!(matches_minute(&s, utc_18).unwrap().is_none());
    }

    #[test]
    fn bad_cron_and_bad_timezone_are_errors() {
        let now = Utc::now();
        assert!(matches!(
            matches_minute(&schedule("not a cron", "UTC"), now),
            Err(ScheduleError::Cron(_))
        ));
        assert!(matches!(
            matches_minute(&schedule("* * * * *", "Mars/Olympus"), now),
            Err(ScheduleError::Timezone(_))
        ));
    }
}
