//! Validated settings structures

use crate::schema::RawConfig;
use std::path::PathBuf;
use std::time::Duration;
use taiso_tz::DEFAULT_ERROR_LOG_CAPACITY;
use taiso_util::{DATABASE_FILENAME, default_data_dir};

/// Default time between timezone checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Validated settings ready for use by the core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directory holding the record database
    pub data_dir: PathBuf,

    /// Zone used for display. None means the detected zone.
    pub display_timezone: Option<String>,

    /// Interval between timezone checks
    pub poll_interval: Duration,

    /// Entries kept in the error log
    pub error_log_capacity: usize,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            data_dir: raw.tracker.data_dir.unwrap_or_else(default_data_dir),
            display_timezone: raw.tracker.display_timezone,
            poll_interval: raw
                .detector
                .poll_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            error_log_capacity: raw.errors.log_capacity.unwrap_or(DEFAULT_ERROR_LOG_CAPACITY),
        }
    }

    /// Path of the SQLite record database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILENAME)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            display_timezone: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            error_log_capacity: DEFAULT_ERROR_LOG_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_values() {
        let raw: RawConfig = toml::from_str("config_version = 1").unwrap();
        let settings = Settings::from_raw(raw);
        assert_eq!(settings.poll_interval, Duration::from_secs(30));
        assert_eq!(settings.error_log_capacity, 50);
        assert!(settings.display_timezone.is_none());
    }

    #[test]
    fn database_lives_in_data_dir() {
        let raw: RawConfig = toml::from_str(
            r#"
            config_version = 1
            [tracker]
            data_dir = "/srv/taiso"
            "#,
        )
        .unwrap();
        let settings = Settings::from_raw(raw);
        assert_eq!(settings.database_path(), PathBuf::from("/srv/taiso/records.db"));
    }
}
