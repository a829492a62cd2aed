//! Time utilities for taiso
//!
//! Records carry UTC instants as epoch milliseconds and wall-clock values as
//! "naive fields read as UTC" milliseconds. The helpers here convert between
//! those encodings and chrono types.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `TAISO_MOCK_TIME` environment variable can be set
//! to override the system time. The value is read as a UTC instant.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-01-15 00:30:00`)
//!
//! Example:
//! ```bash
//! TAISO_MOCK_TIME="2025-01-15 00:30:00" taiso streak
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::sync::OnceLock;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "TAISO_MOCK_TIME";

/// Calendar date format used for storage keys and display.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Milliseconds in a nominal 24h day.
pub const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Offset between mock time and real time, captured once per process.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S") {
                    Ok(naive_dt) => {
                        let offset = naive_dt.and_utc().signed_duration_since(Utc::now());
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    }
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = "%Y-%m-%d %H:%M:%S",
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current UTC instant, respecting mock time settings in debug builds.
///
/// Mock time advances at the same rate as real time.
pub fn now() -> DateTime<Utc> {
    let real_now = Utc::now();

    if let Some(offset) = get_mock_time_offset() {
        real_now + offset
    } else {
        real_now
    }
}

/// Convert epoch milliseconds to a UTC instant.
///
/// Returns `None` when the value is outside chrono's representable range.
pub fn utc_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// Decode a wall-clock value that was stored as "fields read as UTC".
pub fn wall_clock_from_millis(millis: i64) -> Option<NaiveDateTime> {
    utc_from_millis(millis).map(|dt| dt.naive_utc())
}

/// Encode wall-clock fields as epoch-like milliseconds.
pub fn wall_clock_to_millis(wall_clock: &NaiveDateTime) -> i64 {
    wall_clock.and_utc().timestamp_millis()
}

/// Format a calendar date as `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

/// The UTC calendar date of an instant, as `YYYY-MM-DD`.
pub fn utc_date_string(instant: &DateTime<Utc>) -> String {
    format_date(instant.date_naive())
}
