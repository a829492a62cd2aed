//! SQLite-based storage implementation

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use taiso_api::ExerciseRecord;
use tracing::{debug, warn};

use crate::{RecordStorage, RecordVisitor, StoreError, StoreResult};

/// SQLite-based record storage.
///
/// One row per date key; the value is the JSON-encoded record list.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open or create storage at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create in-memory storage (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Records grouped by local calendar date
            CREATE TABLE IF NOT EXISTS day_records (
                day TEXT PRIMARY KEY,
                records_json TEXT NOT NULL
            );
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

#[async_trait]
impl RecordStorage for SqliteStorage {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<ExerciseRecord>>> {
        let conn = self.conn()?;

        let json: Option<String> = conn
            .query_row(
                "SELECT records_json FROM day_records WHERE day = ?",
                [key],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, records: Vec<ExerciseRecord>) -> StoreResult<Vec<ExerciseRecord>> {
        let conn = self.conn()?;
        let json = serde_json::to_string(&records)?;

        conn.execute(
            r#"
            INSERT INTO day_records (day, records_json)
            VALUES (?, ?)
            ON CONFLICT(day)
            DO UPDATE SET records_json = excluded.records_json
            "#,
            params![key, json],
        )?;

        debug!(day = %key, count = records.len(), "Records written");
        Ok(records)
    }

    async fn iterate(&self, visit: &mut RecordVisitor<'_>) -> StoreResult<()> {
        let rows = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare("SELECT day, records_json FROM day_records ORDER BY day")?;
            let rows = stmt.query_map([], |row| {
                let day: String = row.get(0)?;
                let json: String = row.get(1)?;
                Ok((day, json))
            })?;
            let collected = rows.collect::<Result<Vec<_>, _>>()?;
            collected
        };

        for (day, json) in rows {
            match serde_json::from_str::<Vec<ExerciseRecord>>(&json) {
                Ok(records) => visit(&day, &records),
                Err(e) => warn!(day = %day, error = %e, "Skipping undecodable record list"),
            }
        }

        Ok(())
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
