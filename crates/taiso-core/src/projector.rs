//! Streaks and calendar projection
//!
//! Records are placed on the calendar by local date:
//! - aware records by the wall clock they were recorded at
//! - legacy records by their `timestamp` in the target zone
//! - anything else by its stored `date`

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use taiso_api::{CalendarDate, ExerciseRecord, RecordStats};
use taiso_tz::{TimezoneError, TimezoneResolver, TzResult};
use taiso_util::{MILLIS_PER_DAY, format_date, parse_date, utc_date_string, utc_from_millis};
use tracing::{debug, warn};

/// Date arithmetic over record collections
pub struct DateProjector {
    resolver: Arc<TimezoneResolver>,
}

impl DateProjector {
    pub fn new(resolver: Arc<TimezoneResolver>) -> Self {
        Self { resolver }
    }

    // Streaks

    /// Consecutive local days with a record, ending today
    pub fn current_streak(&self, records: &[ExerciseRecord]) -> u32 {
        self.current_streak_at(records, taiso_util::now())
    }

    /// [`current_streak`](Self::current_streak) with an explicit "now"
    pub fn current_streak_at(&self, records: &[ExerciseRecord], now: DateTime<Utc>) -> u32 {
        if records.is_empty() {
            return 0;
        }

        match self.try_current_streak(records, now) {
            Ok(streak) => streak,
            Err(e) => {
                self.report_failure(&e, "current_streak");
                simple_streak(records, now)
            }
        }
    }

    fn try_current_streak(&self, records: &[ExerciseRecord], now: DateTime<Utc>) -> TzResult<u32> {
        let timezone = self.resolver.current_timezone();
        let today = TimezoneResolver::try_local_date(&now, &timezone)?;
        let dates = local_dates(records, &timezone)?;

        let mut streak = 0;
        let mut expected = today;
        for date in dates.iter().rev() {
            if *date > today {
                continue;
            }
            if *date == expected {
                streak += 1;
                match expected.pred_opt() {
                    Some(previous) => expected = previous,
                    None => break,
                }
            } else if *date < expected {
                break;
            }
        }

        debug!(streak, today = %today, timezone = %timezone, "Streak computed");
        Ok(streak)
    }

    /// Longest run of consecutive local days in `timezone` (default: ambient)
    pub fn longest_streak(&self, records: &[ExerciseRecord], timezone: Option<&str>) -> u32 {
        if records.is_empty() {
            return 0;
        }

        let dates = self
            .target_timezone(timezone)
            .and_then(|tz| local_dates(records, &tz))
            .unwrap_or_else(|e| {
                self.report_failure(&e, "longest_streak");
                records.iter().filter_map(|r| parse_date(&r.date)).collect()
            });

        longest_run(&dates)
    }

    /// Totals, streaks and date range for `records`
    pub fn stats(&self, records: &[ExerciseRecord]) -> RecordStats {
        RecordStats {
            total_records: records.len(),
            current_streak: self.current_streak(records),
            longest_streak: self.longest_streak(records, None),
            first_record_date: records.iter().map(|r| &r.date).min().cloned(),
            last_record_date: records.iter().map(|r| &r.date).max().cloned(),
        }
    }

    // Calendar

    /// Group records into calendar days in `display_timezone`.
    ///
    /// Days come out in ascending order; records keep their input order
    /// within a day. An invalid zone groups by the stored `date` instead.
    pub fn convert_for_calendar(
        &self,
        records: &[ExerciseRecord],
        display_timezone: &str,
    ) -> Vec<CalendarDate> {
        match group_by_local_date(records, display_timezone) {
            Ok(groups) => into_calendar(groups),
            Err(e) => {
                self.report_failure(&e, "convert_for_calendar");
                let mut groups: BTreeMap<String, Vec<ExerciseRecord>> = BTreeMap::new();
                for record in records {
                    groups.entry(record.date.clone()).or_default().push(record.clone());
                }
                into_calendar(groups)
            }
        }
    }

    // Helpers

    /// Whether two instants fall on the same local date in `timezone`
    pub fn is_same_local_date(&self, a: &DateTime<Utc>, b: &DateTime<Utc>, timezone: &str) -> bool {
        let same = TimezoneResolver::try_format_local_date_string(a, timezone).and_then(|a| {
            TimezoneResolver::try_format_local_date_string(b, timezone).map(|b| a == b)
        });
        match same {
            Ok(same) => same,
            Err(e) => {
                self.report_failure(&e, "is_same_local_date");
                a.date_naive() == b.date_naive()
            }
        }
    }

    /// Whether `instant` falls on today's local date
    pub fn is_today(&self, instant: &DateTime<Utc>, timezone: Option<&str>) -> bool {
        let now = taiso_util::now();
        match self.target_timezone(timezone) {
            Ok(tz) => self.is_same_local_date(instant, &now, &tz),
            Err(e) => {
                self.report_failure(&e, "is_today");
                instant.date_naive() == now.date_naive()
            }
        }
    }

    /// Whole local days between two instants, absolute and rounded up
    pub fn days_between(&self, a: &DateTime<Utc>, b: &DateTime<Utc>, timezone: Option<&str>) -> i64 {
        let days = self.target_timezone(timezone).and_then(|tz| {
            let a = TimezoneResolver::try_local_date(a, &tz)?;
            let b = TimezoneResolver::try_local_date(b, &tz)?;
            Ok((b - a).num_days().abs())
        });
        match days {
            Ok(days) => days,
            Err(e) => {
                self.report_failure(&e, "days_between");
                let millis = (b.timestamp_millis() - a.timestamp_millis()).abs();
                (millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
            }
        }
    }

    /// Local midnight of the most recent Sunday on or before `instant`
    pub fn week_start(&self, instant: &DateTime<Utc>, timezone: Option<&str>) -> NaiveDateTime {
        let day = self
            .target_timezone(timezone)
            .and_then(|tz| TimezoneResolver::try_local_date(instant, &tz))
            .unwrap_or_else(|e| {
                self.report_failure(&e, "week_start");
                instant.date_naive()
            });

        let sunday = day
            .checked_sub_days(Days::new(u64::from(day.weekday().num_days_from_sunday())))
            .unwrap_or(day);
        sunday.and_time(chrono::NaiveTime::MIN)
    }

    fn target_timezone(&self, timezone: Option<&str>) -> TzResult<String> {
        match timezone {
            Some(tz) => TimezoneResolver::parse_timezone(tz).map(|_| tz.to_string()),
            None => Ok(self.resolver.current_timezone()),
        }
    }

    fn report_failure(&self, err: &TimezoneError, operation: &str) {
        let reporter = self.resolver.reporter();
        match err {
            TimezoneError::InvalidTimezone(tz) => reporter.handle_invalid_timezone(tz, operation),
            TimezoneError::DetectionFailed(_) => {
                reporter.handle_detection_failure(err);
            }
            _ => reporter.handle_conversion_error(operation, err),
        }
    }
}

/// Local date key for one record
fn local_date_key(record: &ExerciseRecord, timezone: &str) -> TzResult<String> {
    if record.is_timezone_aware()
        && let Some(wall_clock) = record.local_wall_clock()
    {
        return Ok(format_date(wall_clock.date()));
    }
    match record.instant() {
        Some(instant) => TimezoneResolver::try_format_local_date_string(&instant, timezone),
        None => Ok(record.date.clone()),
    }
}

fn group_by_local_date(
    records: &[ExerciseRecord],
    timezone: &str,
) -> TzResult<BTreeMap<String, Vec<ExerciseRecord>>> {
    TimezoneResolver::parse_timezone(timezone)?;

    let mut groups: BTreeMap<String, Vec<ExerciseRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(local_date_key(record, timezone)?)
            .or_default()
            .push(record.clone());
    }
    Ok(groups)
}

fn local_dates(records: &[ExerciseRecord], timezone: &str) -> TzResult<BTreeSet<NaiveDate>> {
    TimezoneResolver::parse_timezone(timezone)?;

    let mut dates = BTreeSet::new();
    for record in records {
        let key = local_date_key(record, timezone)?;
        match parse_date(&key) {
            Some(date) => {
                dates.insert(date);
            }
            None => warn!(date = %key, "Skipping record with unparseable date"),
        }
    }
    Ok(dates)
}

fn into_calendar(groups: BTreeMap<String, Vec<ExerciseRecord>>) -> Vec<CalendarDate> {
    groups
        .into_iter()
        .filter_map(|(key, records)| match parse_date(&key) {
            Some(day) => Some(CalendarDate::at_noon(day, records)),
            None => {
                warn!(date = %key, count = records.len(), "Dropping calendar group with unparseable date");
                None
            }
        })
        .collect()
}

fn longest_run(dates: &BTreeSet<NaiveDate>) -> u32 {
    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;
    for date in dates {
        run = match previous {
            Some(p) if p.succ_opt() == Some(*date) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(*date);
    }
    longest
}

/// Streak over raw `date` strings against the UTC calendar
fn simple_streak(records: &[ExerciseRecord], now: DateTime<Utc>) -> u32 {
    let dates: BTreeSet<&str> = records.iter().map(|r| r.date.as_str()).collect();

    let mut streak = 0;
    let mut expected = utc_date_string(&now);
    for date in dates.iter().rev() {
        if *date == expected {
            streak += 1;
            let Some(previous) = parse_date(&expected)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .and_then(|midnight| utc_from_millis(midnight.and_utc().timestamp_millis() - MILLIS_PER_DAY))
            else {
                break;
            };
            expected = utc_date_string(&previous);
        } else if *date < expected.as_str() {
            break;
        }
    }
    streak
}
