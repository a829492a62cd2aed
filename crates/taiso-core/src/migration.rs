//! Legacy record migration
//!
//! Records written before timezone support carry only `date`, `type` and
//! `timestamp`. Migration derives the zone fields from `timestamp`, leaving
//! the original three fields untouched.

use serde::Serialize;
use std::sync::Arc;
use taiso_api::ExerciseRecord;
use taiso_store::{RecordStorage, StoreResult};
use taiso_tz::{TimezoneResolver, TzResult};
use tracing::{debug, error, info, warn};

use crate::KeyLocks;

pub use taiso_api::is_timezone_aware;

/// Outcome of a full storage migration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    /// Date keys visited
    pub groups_scanned: usize,
    /// Date keys rewritten
    pub groups_written: usize,
    /// Records that went from legacy to timezone-aware
    pub records_migrated: usize,
    /// Legacy records left as they were
    pub records_unmigrated: usize,
}

/// Upgrades legacy records to timezone-aware ones
pub struct MigrationEngine {
    resolver: Arc<TimezoneResolver>,
    storage: Arc<dyn RecordStorage>,
    locks: Arc<KeyLocks>,
}

impl MigrationEngine {
    pub fn new(resolver: Arc<TimezoneResolver>, storage: Arc<dyn RecordStorage>) -> Self {
        Self::with_locks(resolver, storage, Arc::new(KeyLocks::new()))
    }

    /// Engine sharing write locks with another writer of the same storage
    pub fn with_locks(
        resolver: Arc<TimezoneResolver>,
        storage: Arc<dyn RecordStorage>,
        locks: Arc<KeyLocks>,
    ) -> Self {
        Self {
            resolver,
            storage,
            locks,
        }
    }

    pub fn locks(&self) -> &Arc<KeyLocks> {
        &self.locks
    }

    /// Migrate one record into `timezone` (default: ambient).
    ///
    /// Aware records come back as they are. Any failure returns the
    /// original record.
    pub fn migrate_one(&self, record: ExerciseRecord, timezone: Option<&str>) -> ExerciseRecord {
        if record.is_timezone_aware() {
            return record;
        }

        let timezone = match timezone {
            Some(tz) => tz.to_string(),
            None => self.resolver.current_timezone(),
        };

        if !TimezoneResolver::is_valid_timezone(&timezone) {
            self.resolver
                .reporter()
                .handle_invalid_timezone(&timezone, "migrate_one");
            return record;
        }

        match derive_zone_fields(&record, &timezone) {
            Ok(migrated) => migrated,
            Err(e) => {
                error!(date = %record.date, timestamp = record.timestamp, error = %e, "Record migration failed");
                record
            }
        }
    }

    /// Migrate a batch 1:1, preserving order
    pub fn migrate_many(&self, records: Vec<ExerciseRecord>, timezone: Option<&str>) -> Vec<ExerciseRecord> {
        // Resolve the ambient zone once for the whole batch
        let ambient;
        let timezone = match timezone {
            Some(tz) => tz,
            None if records.iter().all(ExerciseRecord::is_timezone_aware) => {
                return records;
            }
            None => {
                ambient = self.resolver.current_timezone();
                ambient.as_str()
            }
        };

        records
            .into_iter()
            .map(|record| self.migrate_one(record, Some(timezone)))
            .collect()
    }

    /// Rewrite every stored group that holds legacy records.
    ///
    /// Groups are only written when at least one record became aware.
    /// Enumeration and write failures propagate.
    pub async fn migrate_all_stored(&self) -> StoreResult<MigrationReport> {
        let mut groups: Vec<(String, Vec<ExerciseRecord>)> = Vec::new();
        let enumerated = self
            .storage
            .iterate(&mut |key: &str, records: &[ExerciseRecord]| {
                groups.push((key.to_string(), records.to_vec()))
            })
            .await;
        if let Err(e) = enumerated {
            error!(error = %e, "Failed to enumerate records for migration");
            return Err(e);
        }

        let timezone = self.resolver.current_timezone();
        let mut report = MigrationReport {
            groups_scanned: groups.len(),
            ..Default::default()
        };

        for (key, snapshot) in groups {
            if snapshot.iter().all(ExerciseRecord::is_timezone_aware) {
                continue;
            }

            let _guard = self.locks.lock(&key).await;

            // Re-read under the lock so concurrent appends are kept
            let current = match self.storage.get(&key).await {
                Ok(Some(records)) => records,
                Ok(None) => snapshot,
                Err(e) => {
                    error!(date = %key, error = %e, "Failed to read records for migration");
                    return Err(e);
                }
            };

            let legacy_before = current.iter().filter(|r| !r.is_timezone_aware()).count();
            let migrated = self.migrate_many(current, Some(&timezone));
            let legacy_after = migrated.iter().filter(|r| !r.is_timezone_aware()).count();
            let converted = legacy_before - legacy_after;

            report.records_unmigrated += legacy_after;
            if converted == 0 {
                warn!(date = %key, legacy = legacy_after, "No records in group could be migrated");
                continue;
            }

            if let Err(e) = self.storage.set(&key, migrated).await {
                error!(date = %key, error = %e, "Failed to write migrated records");
                return Err(e);
            }

            debug!(date = %key, converted, "Group migrated");
            report.groups_written += 1;
            report.records_migrated += converted;
        }

        info!(
            scanned = report.groups_scanned,
            written = report.groups_written,
            migrated = report.records_migrated,
            timezone = %timezone,
            "Record migration complete"
        );
        Ok(report)
    }
}

/// Fill the zone fields from `timestamp`. `timezone` must be valid.
fn derive_zone_fields(record: &ExerciseRecord, timezone: &str) -> TzResult<ExerciseRecord> {
    let mut migrated = ExerciseRecord {
        timezone: Some(timezone.to_string()),
        ..ExerciseRecord::legacy(record.date.clone(), record.exercise_type, record.timestamp)
    };

    // A timestamp outside chrono's range still gets its zone
    let Some(instant) = record.instant() else {
        warn!(date = %record.date, timestamp = record.timestamp, "Timestamp out of range, zone recorded without offset");
        return Ok(migrated);
    };

    let offset = TimezoneResolver::try_offset_minutes(&instant, timezone)?;
    let local = TimezoneResolver::try_to_local(record.timestamp, timezone)?;
    migrated.timezone_offset = Some(offset);
    migrated.local_timestamp = Some(taiso_util::wall_clock_to_millis(&local));
    Ok(migrated)
}
