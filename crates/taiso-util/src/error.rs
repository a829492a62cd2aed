//! Error types for taiso

use thiserror::Error;

/// Core error type for taiso write-path operations
#[derive(Debug, Error)]
pub enum TaisoError {
    #[error("Timezone error: {0}")]
    TimezoneError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TaisoError {
    pub fn timezone(msg: impl Into<String>) -> Self {
        Self::TimezoneError(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the failure came from the persistence layer.
    pub fn is_store(&self) -> bool {
        matches!(self, Self::StoreError(_))
    }
}

pub type Result<T> = std::result::Result<T, TaisoError>;
