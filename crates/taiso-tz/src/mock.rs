//! Mock zone source for testing

use std::sync::{Mutex, PoisonError};

use crate::{TimezoneError, TzResult, ZoneSource};

/// Zone source whose answer is set by the test.
#[derive(Debug)]
pub struct MockZoneSource {
    zone: Mutex<String>,

    /// Configure detection to fail
    fail_detect: Mutex<bool>,
}

impl MockZoneSource {
    pub fn new(zone: impl Into<String>) -> Self {
        Self {
            zone: Mutex::new(zone.into()),
            fail_detect: Mutex::new(false),
        }
    }

    /// Simulate the OS timezone changing
    pub fn set_zone(&self, zone: impl Into<String>) {
        *self.zone.lock().unwrap_or_else(PoisonError::into_inner) = zone.into();
    }

    pub fn set_failing(&self, failing: bool) {
        *self.fail_detect.lock().unwrap_or_else(PoisonError::into_inner) = failing;
    }
}

impl Default for MockZoneSource {
    fn default() -> Self {
        Self::new("UTC")
    }
}

impl ZoneSource for MockZoneSource {
    fn detect(&self) -> TzResult<String> {
        if *self.fail_detect.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(TimezoneError::DetectionFailed("Mock detection failure".into()));
        }
        Ok(self.zone.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
