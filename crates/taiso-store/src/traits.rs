//! Store trait definitions

use async_trait::async_trait;
use taiso_api::ExerciseRecord;

use crate::StoreResult;

/// Visitor called once per stored date key
pub type RecordVisitor<'a> = dyn FnMut(&str, &[ExerciseRecord]) + Send + 'a;

/// Date-keyed record storage
#[async_trait]
pub trait RecordStorage: Send + Sync {
    /// Get the list stored under `key`, `None` if the key is absent
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<ExerciseRecord>>>;

    /// Replace the list stored under `key`, returning what was written
    async fn set(&self, key: &str, records: Vec<ExerciseRecord>) -> StoreResult<Vec<ExerciseRecord>>;

    /// Visit every stored `(key, records)` pair in key order
    async fn iterate(&self, visit: &mut RecordVisitor<'_>) -> StoreResult<()>;

    /// All stored keys in ascending order
    async fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        self.iterate(&mut |key: &str, _: &[ExerciseRecord]| keys.push(key.to_string()))
            .await?;
        Ok(keys)
    }

    /// Check if storage is healthy
    fn is_healthy(&self) -> bool {
        true
    }
}
