//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Record keeping settings
    #[serde(default)]
    pub tracker: RawTrackerConfig,

    /// Timezone change detection
    #[serde(default)]
    pub detector: RawDetectorConfig,

    /// Error reporting
    #[serde(default)]
    pub errors: RawErrorsConfig,
}

/// Tracker-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawTrackerConfig {
    /// Data directory for the record database
    pub data_dir: Option<PathBuf>,

    /// IANA zone used for display instead of the detected one
    pub display_timezone: Option<String>,
}

/// Detector settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDetectorConfig {
    /// Seconds between polls (default: 30)
    pub poll_interval_seconds: Option<u64>,
}

/// Error reporter settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawErrorsConfig {
    /// Entries kept in the error log (default: 50)
    pub log_capacity: Option<usize>,
}
