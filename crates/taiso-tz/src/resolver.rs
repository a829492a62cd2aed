//! Timezone resolver
//!
//! Offsets use the `local - UTC` convention in minutes: Tokyo is `+540`,
//! New York in January is `-300`.

use std::sync::Arc;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use taiso_api::TimezoneInfo;
use tracing::debug;

use crate::{SystemZoneSource, TimezoneError, TimezoneErrorReporter, TzResult, ZoneSource};

/// Resolves zones, offsets and wall-clock conversions
pub struct TimezoneResolver {
    source: Arc<dyn ZoneSource>,
    reporter: Arc<TimezoneErrorReporter>,
}

impl TimezoneResolver {
    pub fn new(source: Arc<dyn ZoneSource>, reporter: Arc<TimezoneErrorReporter>) -> Self {
        Self { source, reporter }
    }

    /// Resolver backed by the host's timezone setting
    pub fn system(reporter: Arc<TimezoneErrorReporter>) -> Self {
        Self::new(Arc::new(SystemZoneSource::new()), reporter)
    }

    pub fn reporter(&self) -> &Arc<TimezoneErrorReporter> {
        &self.reporter
    }

    /// Bind an identifier to zone data. Failure means the identifier is invalid.
    pub fn parse_timezone(timezone: &str) -> TzResult<Tz> {
        timezone
            .parse::<Tz>()
            .map_err(|_| TimezoneError::InvalidTimezone(timezone.to_string()))
    }

    pub fn is_valid_timezone(timezone: &str) -> bool {
        Self::parse_timezone(timezone).is_ok()
    }

    // Ambient zone

    /// Detect and validate the ambient zone
    pub fn try_current_timezone(&self) -> TzResult<String> {
        let detected = self.source.detect()?;
        let name = detected.trim();
        if Self::parse_timezone(name).is_err() {
            return Err(TimezoneError::DetectionFailed(format!(
                "{} source reported unknown zone '{}'",
                self.source.name(),
                name
            )));
        }
        Ok(name.to_string())
    }

    /// Ambient zone name, `UTC` on failure
    pub fn current_timezone(&self) -> String {
        match self.try_current_timezone() {
            Ok(tz) => tz,
            Err(e) => self.reporter.handle_detection_failure(&e).timezone,
        }
    }

    pub fn try_current_info(&self) -> TzResult<TimezoneInfo> {
        let timezone = self.try_current_timezone()?;
        Self::try_info_for(&timezone, taiso_util::now())
    }

    /// Snapshot of the ambient zone at "now". Never fails.
    pub fn current_info(&self) -> TimezoneInfo {
        match self.try_current_info() {
            Ok(info) => info,
            Err(e) => self.reporter.handle_detection_failure(&e),
        }
    }

    // Explicit zone

    pub fn try_info_for(timezone: &str, reference: DateTime<Utc>) -> TzResult<TimezoneInfo> {
        let zone = Self::parse_timezone(timezone)?;
        Ok(TimezoneInfo {
            timezone: timezone.to_string(),
            offset: offset_for(zone, &reference),
            local_time: reference.with_timezone(&zone).naive_local(),
            utc_time: reference,
        })
    }

    /// Snapshot of `timezone` at `reference` (default now). An invalid zone
    /// yields the UTC fallback with `reference` in both time fields.
    pub fn info_for(&self, timezone: &str, reference: Option<DateTime<Utc>>) -> TimezoneInfo {
        let reference = reference.unwrap_or_else(taiso_util::now);
        match Self::try_info_for(timezone, reference) {
            Ok(info) => info,
            Err(_) => {
                self.reporter.handle_invalid_timezone(timezone, "info_for");
                TimezoneInfo::utc_fallback(reference)
            }
        }
    }

    /// Offset in minutes of `timezone` at `instant`, evaluated at that instant
    pub fn try_offset_minutes(instant: &DateTime<Utc>, timezone: &str) -> TzResult<i32> {
        let zone = Self::parse_timezone(timezone)?;
        Ok(offset_for(zone, instant))
    }

    pub fn offset_minutes(&self, instant: &DateTime<Utc>, timezone: &str) -> i32 {
        match Self::try_offset_minutes(instant, timezone) {
            Ok(offset) => offset,
            Err(_) => {
                self.reporter.handle_invalid_timezone(timezone, "offset_minutes");
                0
            }
        }
    }

    // Conversion

    pub fn try_to_local(utc_millis: i64, timezone: &str) -> TzResult<NaiveDateTime> {
        let zone = Self::parse_timezone(timezone)?;
        let instant = taiso_util::utc_from_millis(utc_millis)
            .ok_or(TimezoneError::OutOfRange(utc_millis))?;
        Ok(instant.with_timezone(&zone).naive_local())
    }

    /// Wall clock of a UTC instant in `timezone` (default: ambient).
    ///
    /// On failure the instant's own UTC fields come back unchanged.
    pub fn to_local(&self, utc_millis: i64, timezone: Option<&str>) -> NaiveDateTime {
        let timezone = match timezone {
            Some(tz) => tz.to_string(),
            None => self.current_timezone(),
        };

        match Self::try_to_local(utc_millis, &timezone) {
            Ok(local) => local,
            Err(e) => {
                self.reporter.handle_conversion_error("UTC to local conversion", &e);
                clamped_instant(utc_millis).naive_utc()
            }
        }
    }

    /// Inverse of [`try_to_local`](Self::try_to_local).
    ///
    /// Wall-clock times inside a spring-forward gap are read with the offset
    /// in force before the transition (so they land after it). Repeated
    /// fall-back times resolve to the earlier instant.
    pub fn try_to_utc(local: &NaiveDateTime, timezone: &str) -> TzResult<i64> {
        let zone = Self::parse_timezone(timezone)?;
        let instant = match zone.from_local_datetime(local) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
            LocalResult::None => {
                let probe = local
                    .checked_sub_signed(Duration::hours(24))
                    .ok_or_else(|| TimezoneError::Conversion(format!("{} out of range", local)))?;
                let before = zone.offset_from_utc_datetime(&probe).fix();
                let utc = local
                    .checked_sub_signed(Duration::seconds(i64::from(before.local_minus_utc())))
                    .ok_or_else(|| TimezoneError::Conversion(format!("{} out of range", local)))?;
                debug!(local = %local, timezone, "Resolved wall-clock time inside DST gap");
                utc.and_utc()
            }
        };
        Ok(instant.timestamp_millis())
    }

    /// UTC epoch millis for a wall clock in `timezone`.
    ///
    /// On failure the wall-clock fields are read as UTC.
    pub fn to_utc(&self, local: &NaiveDateTime, timezone: &str) -> i64 {
        match Self::try_to_utc(local, timezone) {
            Ok(millis) => millis,
            Err(e) => {
                self.reporter.handle_conversion_error("local to UTC conversion", &e);
                taiso_util::wall_clock_to_millis(local)
            }
        }
    }

    // Calendar dates

    pub fn try_local_date(instant: &DateTime<Utc>, timezone: &str) -> TzResult<NaiveDate> {
        let zone = Self::parse_timezone(timezone)?;
        Ok(instant.with_timezone(&zone).date_naive())
    }

    pub fn try_format_local_date_string(instant: &DateTime<Utc>, timezone: &str) -> TzResult<String> {
        Self::try_local_date(instant, timezone).map(taiso_util::format_date)
    }

    /// `YYYY-MM-DD` of `instant` in `timezone`; the UTC date if the zone is invalid
    pub fn format_local_date_string(&self, instant: &DateTime<Utc>, timezone: &str) -> String {
        match Self::try_format_local_date_string(instant, timezone) {
            Ok(date) => date,
            Err(_) => {
                self.reporter.handle_invalid_timezone(timezone, "format_local_date_string");
                taiso_util::utc_date_string(instant)
            }
        }
    }
}

impl std::fmt::Debug for TimezoneResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimezoneResolver")
            .field("source", &self.source.name())
            .finish()
    }
}

/// Difference between the wall-clock fields in `zone` and the UTC fields,
/// rounded to whole minutes (half rounds up).
fn offset_for(zone: Tz, instant: &DateTime<Utc>) -> i32 {
    let local = instant.with_timezone(&zone).naive_local();
    let seconds = (local - instant.naive_utc()).num_seconds();
    (seconds + 30).div_euclid(60) as i32
}

fn clamped_instant(millis: i64) -> DateTime<Utc> {
    taiso_util::utc_from_millis(millis).unwrap_or(if millis > 0 {
        DateTime::<Utc>::MAX_UTC
    } else {
        DateTime::<Utc>::MIN_UTC
    })
}
