//! System zone source

use tracing::debug;

use crate::{TimezoneError, TzResult, ZoneSource};

/// Detects the ambient timezone from the host.
///
/// The `TZ` environment variable wins when it names a known zone; otherwise
/// the OS setting is read through `iana-time-zone`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemZoneSource;

impl SystemZoneSource {
    pub fn new() -> Self {
        Self
    }
}

impl ZoneSource for SystemZoneSource {
    fn detect(&self) -> TzResult<String> {
        if let Ok(tz) = std::env::var("TZ")
            && tz.parse::<chrono_tz::Tz>().is_ok()
        {
            debug!(timezone = %tz, "Using timezone from TZ environment variable");
            return Ok(tz);
        }

        iana_time_zone::get_timezone()
            .map_err(|e| TimezoneError::DetectionFailed(format!("{:?}", e)))
    }

    fn name(&self) -> &'static str {
        "system"
    }
}
