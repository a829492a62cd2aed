//! In-memory storage for tests and ephemeral use

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use taiso_api::ExerciseRecord;

use crate::{RecordStorage, RecordVisitor, StoreError, StoreResult};

/// Map-backed storage.
///
/// Counts writes and can be told to fail reads, writes or enumeration, so
/// callers' error paths can be exercised. With `yield_on_io` every call
/// yields to the scheduler first, the way a real async engine would.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Mutex<BTreeMap<String, Vec<ExerciseRecord>>>,
    writes: AtomicUsize,
    written_keys: Mutex<Vec<String>>,

    /// Configure `get` to fail
    pub fail_reads: AtomicBool,

    /// Configure `set` to fail
    pub fail_writes: AtomicBool,

    /// Configure `iterate` to fail
    pub fail_iterate: AtomicBool,

    /// Yield before touching the map
    pub yield_on_io: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed storage without counting writes
    pub fn with_records(records: impl IntoIterator<Item = (String, Vec<ExerciseRecord>)>) -> Self {
        let storage = Self::new();
        storage.data().extend(records);
        storage
    }

    fn data(&self) -> MutexGuard<'_, BTreeMap<String, Vec<ExerciseRecord>>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of successful `set` calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Keys written, in write order
    pub fn written_keys(&self) -> Vec<String> {
        self.written_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of everything stored
    pub fn snapshot(&self) -> BTreeMap<String, Vec<ExerciseRecord>> {
        self.data().clone()
    }

    async fn maybe_yield(&self) {
        if self.yield_on_io.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl RecordStorage for MemoryStorage {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<ExerciseRecord>>> {
        self.maybe_yield().await;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("Mock read failure".into()));
        }
        Ok(self.data().get(key).cloned())
    }

    async fn set(&self, key: &str, records: Vec<ExerciseRecord>) -> StoreResult<Vec<ExerciseRecord>> {
        self.maybe_yield().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("Mock write failure".into()));
        }
        self.data().insert(key.to_string(), records.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.written_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.to_string());
        Ok(records)
    }

    async fn iterate(&self, visit: &mut RecordVisitor<'_>) -> StoreResult<()> {
        self.maybe_yield().await;
        if self.fail_iterate.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("Mock iterate failure".into()));
        }
        let snapshot = self.snapshot();
        for (key, records) in &snapshot {
            visit(key, records);
        }
        Ok(())
    }
}
