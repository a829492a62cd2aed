//! Record keeping over date-keyed storage

use chrono::{DateTime, Utc};
use std::sync::Arc;
use taiso_api::{ExerciseRecord, ExerciseType, RecordFilter, RecordStats};
use taiso_store::RecordStorage;
use taiso_tz::{TimezoneError, TimezoneResolver, TzResult};
use tracing::{debug, error, info, warn};

use crate::{DateProjector, KeyLocks, MigrationEngine};

/// Records exercise completions and reads them back in any zone
pub struct RecordStore {
    storage: Arc<dyn RecordStorage>,
    resolver: Arc<TimezoneResolver>,
    migration: Arc<MigrationEngine>,
    projector: DateProjector,
}

impl RecordStore {
    pub fn new(storage: Arc<dyn RecordStorage>, resolver: Arc<TimezoneResolver>) -> Self {
        let migration = Arc::new(MigrationEngine::new(resolver.clone(), storage.clone()));
        Self::with_migration(storage, resolver, migration)
    }

    /// Store sharing a migration engine (and its write locks)
    pub fn with_migration(
        storage: Arc<dyn RecordStorage>,
        resolver: Arc<TimezoneResolver>,
        migration: Arc<MigrationEngine>,
    ) -> Self {
        info!(healthy = storage.is_healthy(), "Record store initialized");
        Self {
            projector: DateProjector::new(resolver.clone()),
            storage,
            resolver,
            migration,
        }
    }

    pub fn migration(&self) -> &Arc<MigrationEngine> {
        &self.migration
    }

    pub fn projector(&self) -> &DateProjector {
        &self.projector
    }

    fn locks(&self) -> &KeyLocks {
        self.migration.locks()
    }

    /// Record a completion at `at` (default: now) in the ambient zone.
    ///
    /// Detection and storage failures propagate; nothing is written then.
    pub async fn record(
        &self,
        exercise_type: ExerciseType,
        at: Option<DateTime<Utc>>,
    ) -> taiso_util::Result<ExerciseRecord> {
        let info = match at {
            Some(at) => {
                let timezone = self.resolver.try_current_timezone()?;
                TimezoneResolver::try_info_for(&timezone, at)?
            }
            None => self.resolver.try_current_info()?,
        };

        let date = info.local_date_string();
        let record = ExerciseRecord {
            date: date.clone(),
            exercise_type,
            timestamp: info.utc_time.timestamp_millis(),
            timezone: Some(info.timezone),
            timezone_offset: Some(info.offset),
            local_timestamp: Some(taiso_util::wall_clock_to_millis(&info.local_time)),
        };

        let _guard = self.locks().lock(&date).await;
        let mut records = self.storage.get(&date).await?.unwrap_or_default();
        records.push(record.clone());
        let count = records.len();
        self.storage.set(&date, records).await?;

        info!(
            date = %date,
            exercise = record.exercise_type.as_str(),
            timezone = record.timezone.as_deref().unwrap_or_default(),
            count,
            "Exercise recorded"
        );
        Ok(record)
    }

    /// Every stored record, sorted by `date`. Empty on storage failure.
    pub async fn all_records(&self) -> Vec<ExerciseRecord> {
        let mut all = Vec::new();
        let result = self
            .storage
            .iterate(&mut |_: &str, records: &[ExerciseRecord]| all.extend_from_slice(records))
            .await;

        if let Err(e) = result {
            error!(error = %e, "Failed to enumerate records");
            return Vec::new();
        }

        all.sort_by(|a, b| a.date.cmp(&b.date));
        all
    }

    /// Records stored under `date`. Empty if missing or unreadable.
    pub async fn records_for_date(&self, date: &str) -> Vec<ExerciseRecord> {
        match self.storage.get(date).await {
            Ok(records) => records.unwrap_or_default(),
            Err(e) => {
                error!(date, error = %e, "Failed to read records");
                Vec::new()
            }
        }
    }

    /// All records, migrated and re-dated into `target` (default: ambient).
    ///
    /// A record that cannot be converted comes back as it was.
    pub async fn records_converted_to(&self, target: Option<&str>) -> Vec<ExerciseRecord> {
        let target = match target {
            Some(tz) => tz.to_string(),
            None => self.resolver.current_timezone(),
        };

        let records = self.migration.migrate_many(self.all_records().await, None);

        if !TimezoneResolver::is_valid_timezone(&target) {
            self.resolver
                .reporter()
                .handle_invalid_timezone(&target, "records_converted_to");
            return records;
        }

        let mut converted: Vec<ExerciseRecord> = records
            .into_iter()
            .map(|record| {
                if record.timezone.as_deref() == Some(target.as_str()) {
                    return record;
                }
                match convert_record(&record, &target) {
                    Ok(converted) => converted,
                    Err(e) => {
                        self.resolver
                            .reporter()
                            .handle_conversion_error("record conversion", &e);
                        record
                    }
                }
            })
            .collect();

        converted.sort_by(|a, b| a.date.cmp(&b.date));
        debug!(count = converted.len(), timezone = %target, "Records converted");
        converted
    }

    /// Converted records matching `filter`
    pub async fn records_matching(&self, filter: &RecordFilter) -> Vec<ExerciseRecord> {
        self.records_converted_to(filter.timezone.as_deref())
            .await
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect()
    }

    /// Statistics over all records in the ambient zone
    pub async fn stats(&self) -> RecordStats {
        let records = self.records_converted_to(None).await;
        if records.is_empty() {
            warn!("No records for statistics");
        }
        self.projector.stats(&records)
    }
}

/// Recompute the zone fields and `date` of `record` in `target`
fn convert_record(record: &ExerciseRecord, target: &str) -> TzResult<ExerciseRecord> {
    let instant = record
        .instant()
        .ok_or(TimezoneError::OutOfRange(record.timestamp))?;
    let info = TimezoneResolver::try_info_for(target, instant)?;

    Ok(ExerciseRecord {
        date: info.local_date_string(),
        exercise_type: record.exercise_type,
        timestamp: record.timestamp,
        timezone: Some(info.timezone),
        timezone_offset: Some(info.offset),
        local_timestamp: Some(taiso_util::wall_clock_to_millis(&info.local_time)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::Ordering;
    use taiso_api::{ExerciseTypeFilter, TimezoneErrorKind};
    use taiso_store::MemoryStorage;
    use taiso_tz::{MockZoneSource, TimezoneErrorReporter};

    struct Fixture {
        store: Arc<RecordStore>,
        storage: Arc<MemoryStorage>,
        source: Arc<MockZoneSource>,
        reporter: Arc<TimezoneErrorReporter>,
    }

    fn fixture(zone: &str) -> Fixture {
        let source = Arc::new(MockZoneSource::new(zone));
        let reporter = Arc::new(TimezoneErrorReporter::new());
        let resolver = Arc::new(TimezoneResolver::new(source.clone(), reporter.clone()));
        let storage = Arc::new(MemoryStorage::new());
        Fixture {
            store: Arc::new(RecordStore::new(storage.clone(), resolver)),
            storage,
            source,
            reporter,
        }
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn record_uses_local_date() {
        let f = fixture("Asia/Tokyo");
        // 2025-01-14T20:00Z is Jan 15 05:00 in Tokyo
        let record = f
            .store
            .record(ExerciseType::First, Some(utc(2025, 1, 14, 20)))
            .await
            .unwrap();

        assert_eq!(record.date, "2025-01-15");
        assert_eq!(record.timezone.as_deref(), Some("Asia/Tokyo"));
        assert_eq!(record.timezone_offset, Some(540));
        assert!(record.is_timezone_aware());
        assert_eq!(f.store.records_for_date("2025-01-15").await, vec![record]);
    }

    #[tokio::test]
    async fn record_appends_to_existing_day() {
        let f = fixture("UTC");
        f.store
            .record(ExerciseType::First, Some(utc(2025, 1, 15, 6)))
            .await
            .unwrap();
        f.store
            .record(ExerciseType::Second, Some(utc(2025, 1, 15, 18)))
            .await
            .unwrap();

        let day = f.store.records_for_date("2025-01-15").await;
        assert_eq!(day.len(), 2);
        assert_eq!(day[0].exercise_type, ExerciseType::First);
        assert_eq!(day[1].exercise_type, ExerciseType::Second);
    }

    #[tokio::test]
    async fn detection_failure_propagates_without_writing() {
        let f = fixture("UTC");
        f.source.set_failing(true);

        let result = f.store.record(ExerciseType::First, None).await;
        assert!(matches!(result, Err(taiso_util::TaisoError::TimezoneError(_))));
        assert_eq!(f.storage.write_count(), 0);
    }

    #[tokio::test]
    async fn write_failure_propagates() {
        let f = fixture("UTC");
        f.storage.fail_writes.store(true, Ordering::SeqCst);

        let err = f.store.record(ExerciseType::First, None).await.unwrap_err();
        assert!(err.is_store());
    }

    #[tokio::test]
    async fn concurrent_records_lose_nothing() {
        let f = fixture("UTC");
        f.storage.yield_on_io.store(true, Ordering::SeqCst);
        let at = utc(2025, 1, 15, 9);

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let store = f.store.clone();
                let exercise = if i % 2 == 0 {
                    ExerciseType::First
                } else {
                    ExerciseType::Second
                };
                tokio::spawn(async move { store.record(exercise, Some(at)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(f.store.records_for_date("2025-01-15").await.len(), 20);
    }

    #[tokio::test]
    async fn all_records_sorted_by_date() {
        let f = fixture("UTC");
        for day in [17, 15, 16] {
            f.store
                .record(ExerciseType::First, Some(utc(2025, 1, day, 9)))
                .await
                .unwrap();
        }
        let dates: Vec<_> = f.store.all_records().await.into_iter().map(|r| r.date).collect();
        assert_eq!(dates, vec!["2025-01-15", "2025-01-16", "2025-01-17"]);
    }

    #[tokio::test]
    async fn read_failures_yield_empty() {
        let f = fixture("UTC");
        f.store.record(ExerciseType::First, None).await.unwrap();
        f.storage.fail_reads.store(true, Ordering::SeqCst);
        f.storage.fail_iterate.store(true, Ordering::SeqCst);

        assert!(f.store.records_for_date("2025-01-15").await.is_empty());
        assert!(f.store.all_records().await.is_empty());
    }

    #[tokio::test]
    async fn conversion_re_dates_records() {
        let f = fixture("America/New_York");
        // Jan 14 in New York, Jan 15 in Tokyo
        let recorded = f
            .store
            .record(ExerciseType::First, Some(utc(2025, 1, 15, 1)))
            .await
            .unwrap();
        assert_eq!(recorded.date, "2025-01-14");

        let converted = f.store.records_converted_to(Some("Asia/Tokyo")).await;
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].date, "2025-01-15");
        assert_eq!(converted[0].timezone_offset, Some(540));
        assert_eq!(converted[0].timestamp, recorded.timestamp);

        // Same zone passes through
        let same = f.store.records_converted_to(Some("America/New_York")).await;
        assert_eq!(same, vec![recorded]);
    }

    #[tokio::test]
    async fn legacy_records_are_migrated_on_read() {
        let f = fixture("UTC");
        let noon = utc(2025, 1, 15, 12);
        f.storage
            .set(
                "2025-01-15",
                vec![ExerciseRecord::legacy(
                    "2025-01-15",
                    ExerciseType::Second,
                    noon.timestamp_millis(),
                )],
            )
            .await
            .unwrap();

        let converted = f.store.records_converted_to(Some("Asia/Tokyo")).await;
        assert!(converted[0].is_timezone_aware());
        assert_eq!(converted[0].date, "2025-01-15");
        assert_eq!(converted[0].timezone.as_deref(), Some("Asia/Tokyo"));
    }

    #[tokio::test]
    async fn unconvertible_record_passes_through() {
        let f = fixture("Asia/Tokyo");
        let broken = ExerciseRecord {
            timezone: Some("Asia/Tokyo".into()),
            ..ExerciseRecord::legacy("2025-01-13", ExerciseType::First, i64::MAX)
        };
        f.storage.set("2025-01-13", vec![broken.clone()]).await.unwrap();
        f.store
            .record(ExerciseType::Second, Some(utc(2025, 1, 15, 1)))
            .await
            .unwrap();

        let converted = f.store.records_converted_to(Some("America/New_York")).await;

        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0], broken);
        assert_eq!(converted[1].date, "2025-01-14");
        assert_eq!(converted[1].timezone.as_deref(), Some("America/New_York"));
        assert_eq!(
            f.reporter.count_by_kind(Some(TimezoneErrorKind::ConversionError)),
            1
        );
    }

    #[tokio::test]
    async fn invalid_target_returns_records_unconverted() {
        let f = fixture("UTC");
        f.store
            .record(ExerciseType::First, Some(utc(2025, 1, 15, 1)))
            .await
            .unwrap();

        let records = f.store.records_converted_to(Some("Invalid/Timezone")).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timezone.as_deref(), Some("UTC"));
        assert_eq!(
            f.reporter.count_by_kind(Some(TimezoneErrorKind::InvalidTimezone)),
            1
        );
    }

    #[tokio::test]
    async fn filter_by_range_and_type() {
        let f = fixture("UTC");
        for (day, exercise) in [
            (14, ExerciseType::First),
            (15, ExerciseType::First),
            (15, ExerciseType::Second),
            (16, ExerciseType::Second),
        ] {
            f.store.record(exercise, Some(utc(2025, 1, day, 9))).await.unwrap();
        }

        let filter = RecordFilter {
            start_date: Some("2025-01-15".into()),
            end_date: Some("2025-01-16".into()),
            exercise_type: ExerciseTypeFilter::Second,
            timezone: None,
        };
        let matched = f.store.records_matching(&filter).await;
        assert_eq!(matched.len(), 2);
        assert!(matched.iter().all(|r| r.exercise_type == ExerciseType::Second));
    }

    #[tokio::test]
    async fn stats_over_stored_records() {
        let f = fixture("UTC");
        let now = taiso_util::now();
        for days_ago in [0, 1, 2] {
            f.store
                .record(ExerciseType::First, Some(now - chrono::Duration::days(days_ago)))
                .await
                .unwrap();
        }

        let stats = f.store.stats().await;
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.current_streak, 3);
        assert_eq!(stats.longest_streak, 3);
    }
}
