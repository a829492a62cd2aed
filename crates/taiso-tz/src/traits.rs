//! Zone source trait and timezone errors

use taiso_api::TimezoneErrorKind;
use taiso_util::TaisoError;
use thiserror::Error;

/// Errors from timezone resolution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimezoneError {
    #[error("Timezone detection failed: {0}")]
    DetectionFailed(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Timestamp out of range: {0}")]
    OutOfRange(i64),

    #[error("Conversion failed: {0}")]
    Conversion(String),
}

impl TimezoneError {
    /// Taxonomy bucket for this error.
    pub fn kind(&self) -> TimezoneErrorKind {
        match self {
            Self::DetectionFailed(_) => TimezoneErrorKind::DetectionFailed,
            Self::InvalidTimezone(_) => TimezoneErrorKind::InvalidTimezone,
            Self::OutOfRange(_) | Self::Conversion(_) => TimezoneErrorKind::ConversionError,
        }
    }
}

impl From<TimezoneError> for TaisoError {
    fn from(e: TimezoneError) -> Self {
        TaisoError::timezone(e.to_string())
    }
}

pub type TzResult<T> = Result<T, TimezoneError>;

/// Platform capability that reports the ambient IANA timezone.
///
/// The returned name is validated by the resolver; sources only report
/// what the platform says.
pub trait ZoneSource: Send + Sync {
    /// Detect the ambient timezone name
    fn detect(&self) -> TzResult<String>;

    /// Short name for logging
    fn name(&self) -> &'static str;
}
