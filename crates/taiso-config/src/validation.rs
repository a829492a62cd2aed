//! Configuration validation

use crate::schema::RawConfig;
use taiso_tz::TimezoneResolver;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown display timezone '{0}'")]
    InvalidTimezone(String),

    #[error("Detector poll interval must be at least one second")]
    ZeroPollInterval,

    #[error("Error log capacity must be at least one entry")]
    ZeroLogCapacity,

    #[error("Data directory cannot be empty")]
    EmptyDataDir,
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(tz) = &config.tracker.display_timezone
        && !TimezoneResolver::is_valid_timezone(tz)
    {
        errors.push(ValidationError::InvalidTimezone(tz.clone()));
    }

    if let Some(dir) = &config.tracker.data_dir
        && dir.as_os_str().is_empty()
    {
        errors.push(ValidationError::EmptyDataDir);
    }

    if config.detector.poll_interval_seconds == Some(0) {
        errors.push(ValidationError::ZeroPollInterval);
    }

    if config.errors.log_capacity == Some(0) {
        errors.push(ValidationError::ZeroLogCapacity);
    }

    errors
}
