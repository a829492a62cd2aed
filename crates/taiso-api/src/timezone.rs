//! Timezone snapshots, calendar projections and the timezone error taxonomy

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ExerciseRecord;

/// Zone used whenever detection or validation fails
pub const FALLBACK_TIMEZONE: &str = "UTC";

/// Snapshot of a zone at one instant. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimezoneInfo {
    /// IANA identifier (e.g. "Asia/Tokyo")
    pub timezone: String,
    /// Minutes, `local - UTC`
    pub offset: i32,
    /// Wall clock in `timezone`
    pub local_time: NaiveDateTime,
    pub utc_time: DateTime<Utc>,
}

impl TimezoneInfo {
    /// The deterministic UTC snapshot returned when resolution fails.
    pub fn utc_fallback(reference: DateTime<Utc>) -> Self {
        Self {
            timezone: FALLBACK_TIMEZONE.to_string(),
            offset: 0,
            local_time: reference.naive_utc(),
            utc_time: reference,
        }
    }

    /// `YYYY-MM-DD` of `local_time`.
    pub fn local_date_string(&self) -> String {
        taiso_util::format_date(self.local_time.date())
    }
}

/// One day on the calendar with the records that fall on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarDate {
    /// Local noon of the day, so renderers never round across midnight
    pub date: NaiveDateTime,
    pub records: Vec<ExerciseRecord>,
    pub local_date_string: String,
}

impl CalendarDate {
    pub fn at_noon(day: NaiveDate, records: Vec<ExerciseRecord>) -> Self {
        Self {
            date: day.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN)),
            records,
            local_date_string: taiso_util::format_date(day),
        }
    }
}

/// Notification level for user-facing messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Classes of timezone failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimezoneErrorKind {
    /// Ambient timezone could not be resolved
    DetectionFailed,
    /// Identifier failed validation
    InvalidTimezone,
    /// Formatting or arithmetic failed despite a valid zone
    ConversionError,
}

impl TimezoneErrorKind {
    pub const ALL: [TimezoneErrorKind; 3] = [
        Self::DetectionFailed,
        Self::InvalidTimezone,
        Self::ConversionError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DetectionFailed => "detection_failed",
            Self::InvalidTimezone => "invalid_timezone",
            Self::ConversionError => "conversion_error",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::DetectionFailed | Self::InvalidTimezone => Severity::Warning,
            Self::ConversionError => Severity::Error,
        }
    }

    /// Fixed message shown to the user for this kind.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::DetectionFailed => {
                "Could not detect your timezone automatically. Times are shown in UTC."
            }
            Self::InvalidTimezone => {
                "There is a problem with the timezone setting. Times are shown in standard time."
            }
            Self::ConversionError => {
                "An error occurred while converting times. The display may be incorrect."
            }
        }
    }
}

/// Entry in the reporter's bounded error log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimezoneErrorEntry {
    #[serde(rename = "type")]
    pub kind: TimezoneErrorKind,
    pub message: String,
    pub fallback_action: String,
    /// RFC 3339
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn severity_by_kind() {
        assert_eq!(TimezoneErrorKind::DetectionFailed.severity(), Severity::Warning);
        assert_eq!(TimezoneErrorKind::InvalidTimezone.severity(), Severity::Warning);
        assert_eq!(TimezoneErrorKind::ConversionError.severity(), Severity::Error);
    }

    #[test]
    fn kind_serialization() {
        let json = serde_json::to_string(&TimezoneErrorKind::InvalidTimezone).unwrap();
        assert_eq!(json, "\"invalid_timezone\"");
        for kind in TimezoneErrorKind::ALL {
            assert_eq!(
                serde_json::to_string(&kind).unwrap(),
                format!("\"{}\"", kind.as_str())
            );
        }
    }

    #[test]
    fn utc_fallback_echoes_reference() {
        let reference = Utc.with_ymd_and_hms(2025, 1, 15, 0, 30, 0).unwrap();
        let info = TimezoneInfo::utc_fallback(reference);
        assert_eq!(info.timezone, "UTC");
        assert_eq!(info.offset, 0);
        assert_eq!(info.utc_time, reference);
        assert_eq!(info.local_time, reference.naive_utc());
        assert_eq!(info.local_date_string(), "2025-01-15");
    }

    #[test]
    fn calendar_date_is_local_noon() {
        let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let entry = CalendarDate::at_noon(day, vec![]);
        assert_eq!(entry.date.hour(), 12);
        assert_eq!(entry.date.date(), day);
        assert_eq!(entry.local_date_string, "2024-02-29");
    }
}
