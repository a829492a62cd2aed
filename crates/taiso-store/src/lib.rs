//! Persistence layer for taiso
//!
//! Storage is an async map from local calendar date (`YYYY-MM-DD`) to the
//! ordered list of records completed on that date. Writers always replace a
//! whole list; there are no field-level updates.
//!
//! Provides:
//! - The [`RecordStorage`] adapter trait
//! - [`SqliteStorage`] for on-disk use
//! - [`MemoryStorage`] with write counting and failure injection for tests

mod memory;
mod sqlite;
mod traits;

pub use memory::*;
pub use sqlite::*;
pub use traits::*;

use taiso_util::TaisoError;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for TaisoError {
    fn from(e: StoreError) -> Self {
        TaisoError::store(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
