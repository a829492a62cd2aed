//! Exercise record model

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which of the two fixed routines was performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseType {
    First,
    Second,
}

impl ExerciseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Second => "second",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::First => "Radio Exercise No. 1",
            Self::Second => "Radio Exercise No. 2",
        }
    }
}

impl fmt::Display for ExerciseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown exercise type: {0}")]
pub struct ParseExerciseTypeError(String);

impl FromStr for ExerciseType {
    type Err = ParseExerciseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Self::First),
            "second" => Ok(Self::Second),
            other => Err(ParseExerciseTypeError(other.to_string())),
        }
    }
}

/// One completion event, stored under its local calendar date.
///
/// Field names are camelCase on the wire so records written by earlier
/// versions of the app load unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseRecord {
    /// Local calendar date (`YYYY-MM-DD`), also the storage key
    pub date: String,

    #[serde(rename = "type")]
    pub exercise_type: ExerciseType,

    /// UTC instant of completion, epoch milliseconds
    pub timestamp: i64,

    /// IANA zone in effect when recorded or last converted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    /// Minutes, `local - UTC`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone_offset: Option<i32>,

    /// Wall clock in `timezone`, encoded as fields-read-as-UTC milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_timestamp: Option<i64>,
}

impl ExerciseRecord {
    /// Build a record without timezone fields.
    pub fn legacy(date: impl Into<String>, exercise_type: ExerciseType, timestamp: i64) -> Self {
        Self {
            date: date.into(),
            exercise_type,
            timestamp,
            timezone: None,
            timezone_offset: None,
            local_timestamp: None,
        }
    }

    /// See [`is_timezone_aware`].
    pub fn is_timezone_aware(&self) -> bool {
        is_timezone_aware(self)
    }

    /// The completion instant, if `timestamp` is representable.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        taiso_util::utc_from_millis(self.timestamp)
    }

    /// The stored wall clock, if present and representable.
    pub fn local_wall_clock(&self) -> Option<NaiveDateTime> {
        self.local_timestamp
            .and_then(taiso_util::wall_clock_from_millis)
    }
}

/// A record is timezone-aware iff `timezone` and `timezone_offset` are set
/// (an offset of zero counts) and `local_timestamp` is set and non-zero.
pub fn is_timezone_aware(record: &ExerciseRecord) -> bool {
    record.timezone.is_some()
        && record.timezone_offset.is_some()
        && record.local_timestamp.is_some_and(|ts| ts != 0)
}

/// Exercise type selector for [`RecordFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseTypeFilter {
    First,
    Second,
    #[default]
    Both,
}

impl ExerciseTypeFilter {
    pub fn matches(&self, exercise_type: ExerciseType) -> bool {
        match self {
            Self::First => exercise_type == ExerciseType::First,
            Self::Second => exercise_type == ExerciseType::Second,
            Self::Both => true,
        }
    }
}

/// Record selection criteria
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFilter {
    /// Inclusive lower bound (`YYYY-MM-DD`)
    pub start_date: Option<String>,
    /// Inclusive upper bound (`YYYY-MM-DD`)
    pub end_date: Option<String>,
    #[serde(default, rename = "type")]
    pub exercise_type: ExerciseTypeFilter,
    /// Display timezone the records are converted to before matching
    pub timezone: Option<String>,
}

impl RecordFilter {
    /// Match on date range and type. `YYYY-MM-DD` compares correctly as text.
    pub fn matches(&self, record: &ExerciseRecord) -> bool {
        if let Some(start) = &self.start_date
            && record.date.as_str() < start.as_str()
        {
            return false;
        }
        if let Some(end) = &self.end_date
            && record.date.as_str() > end.as_str()
        {
            return false;
        }
        self.exercise_type.matches(record.exercise_type)
    }
}

/// Aggregate statistics over a record collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStats {
    pub total_records: usize,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub first_record_date: Option<String>,
    pub last_record_date: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aware(offset: i32, local_timestamp: i64) -> ExerciseRecord {
        ExerciseRecord {
            timezone: Some("Europe/London".into()),
            timezone_offset: Some(offset),
            local_timestamp: Some(local_timestamp),
            ..ExerciseRecord::legacy("2025-01-12", ExerciseType::Second, 1_736_641_800_000)
        }
    }

    #[test]
    fn zero_offset_counts_as_present() {
        assert!(aware(0, 1_736_641_800_000).is_timezone_aware());
    }

    #[test]
    fn any_missing_field_is_legacy() {
        let mut r = aware(0, 1);
        r.timezone = None;
        assert!(!r.is_timezone_aware());

        let mut r = aware(0, 1);
        r.timezone_offset = None;
        assert!(!r.is_timezone_aware());

        let mut r = aware(0, 1);
        r.local_timestamp = None;
        assert!(!r.is_timezone_aware());

        // zero local timestamp is falsy
        assert!(!aware(60, 0).is_timezone_aware());
    }

    #[test]
    fn legacy_json_round_trips_without_timezone_fields() {
        let json = r#"{"date":"2025-01-10","type":"first","timestamp":1736469000000}"#;
        let record: ExerciseRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.exercise_type, ExerciseType::First);
        assert!(!record.is_timezone_aware());

        let back = serde_json::to_string(&record).unwrap();
        assert!(!back.contains("timezone"));
    }

    #[test]
    fn aware_json_uses_camel_case() {
        let record = aware(-300, 1_736_623_800_000);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"timezoneOffset\":-300"));
        assert!(json.contains("\"localTimestamp\""));
        assert!(json.contains("\"type\":\"second\""));
    }

    #[test]
    fn exercise_type_parse() {
        assert_eq!("first".parse::<ExerciseType>(), Ok(ExerciseType::First));
        assert_eq!("second".parse::<ExerciseType>(), Ok(ExerciseType::Second));
        assert!("third".parse::<ExerciseType>().is_err());
    }

    #[test]
    fn filter_matches_range_and_type() {
        let filter = RecordFilter {
            start_date: Some("2025-01-10".into()),
            end_date: Some("2025-01-12".into()),
            exercise_type: ExerciseTypeFilter::First,
            timezone: None,
        };

        assert!(filter.matches(&ExerciseRecord::legacy("2025-01-10", ExerciseType::First, 0)));
        assert!(filter.matches(&ExerciseRecord::legacy("2025-01-12", ExerciseType::First, 0)));
        assert!(!filter.matches(&ExerciseRecord::legacy("2025-01-13", ExerciseType::First, 0)));
        assert!(!filter.matches(&ExerciseRecord::legacy("2025-01-09", ExerciseType::First, 0)));
        assert!(!filter.matches(&ExerciseRecord::legacy("2025-01-11", ExerciseType::Second, 0)));
    }
}
