//! Central funnel for timezone failures
//!
//! Every failure the resolver (or anything built on it) falls back from is
//! recorded here, logged, and fanned out to notification subscribers. With
//! no subscribers the message still reaches the log, so nothing is silent
//! before a UI is attached.

use std::collections::VecDeque;
use std::fmt::Display;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::SecondsFormat;
use taiso_api::{Severity, TimezoneErrorEntry, TimezoneErrorKind, TimezoneInfo};
use tracing::{error, info, warn};

/// Default number of entries kept in the error log
pub const DEFAULT_ERROR_LOG_CAPACITY: usize = 50;

/// Callback receiving a user-facing message and its severity
pub type NotificationCallback = Arc<dyn Fn(&str, Severity) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Allocates process-unique subscription ids, shared by every registry
/// that hands out [`SubscriptionId`]s.
pub fn next_subscription_id() -> SubscriptionId {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    SubscriptionId(NEXT.fetch_add(1, Ordering::Relaxed))
}

/// Lock that survives a poisoned mutex. Subscriber panics are caught on
/// purpose, so poisoning must not take the reporter down with them.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of timezone errors and notification subscribers
pub struct TimezoneErrorReporter {
    capacity: usize,
    log: Mutex<VecDeque<TimezoneErrorEntry>>,
    subscribers: Mutex<Vec<(SubscriptionId, NotificationCallback)>>,
}

impl TimezoneErrorReporter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ERROR_LOG_CAPACITY)
    }

    /// Create a reporter keeping at most `capacity` log entries
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            log: Mutex::new(VecDeque::with_capacity(capacity)),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a failure and notify subscribers with the kind's canned message
    pub fn report(
        &self,
        kind: TimezoneErrorKind,
        message: impl Into<String>,
        fallback_action: impl Into<String>,
    ) {
        let entry = TimezoneErrorEntry {
            kind,
            message: message.into(),
            fallback_action: fallback_action.into(),
            timestamp: taiso_util::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        error!(kind = kind.as_str(), message = %entry.message, "Timezone error");
        info!(fallback = %entry.fallback_action, "Fallback action");

        {
            let mut log = lock(&self.log);
            while log.len() >= self.capacity {
                log.pop_front();
            }
            log.push_back(entry);
        }

        self.notify(kind.user_message(), kind.severity());
    }

    /// Deliver a message to every subscriber.
    ///
    /// A panicking subscriber is logged and skipped; the rest still run.
    pub fn notify(&self, message: &str, severity: Severity) {
        let subscribers: Vec<NotificationCallback> = lock(&self.subscribers)
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();

        if subscribers.is_empty() {
            warn!(target: "taiso::notify", severity = severity.as_str(), "User notification: {}", message);
            return;
        }

        for callback in subscribers {
            if catch_unwind(AssertUnwindSafe(|| callback(message, severity))).is_err() {
                error!("Notification callback panicked");
            }
        }
    }

    /// Notify at error severity
    pub fn notify_error(&self, message: &str) {
        self.notify(message, Severity::Error);
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&str, Severity) + Send + Sync + 'static,
    {
        let id = next_subscription_id();
        lock(&self.subscribers).push((id, Arc::new(callback)));
        id
    }

    /// Returns whether the subscription existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    pub fn unsubscribe_all(&self) {
        lock(&self.subscribers).clear();
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Copy of the error log, oldest first
    pub fn error_log(&self) -> Vec<TimezoneErrorEntry> {
        lock(&self.log).iter().cloned().collect()
    }

    pub fn clear_log(&self) {
        lock(&self.log).clear();
    }

    /// Number of logged entries of `kind`, or of every kind for `None`
    pub fn count_by_kind(&self, kind: Option<TimezoneErrorKind>) -> usize {
        let log = lock(&self.log);
        match kind {
            Some(kind) => log.iter().filter(|e| e.kind == kind).count(),
            None => log.len(),
        }
    }

    /// Report a detection failure and return a ready-to-use UTC snapshot
    pub fn handle_detection_failure(&self, err: &dyn Display) -> TimezoneInfo {
        self.report(
            TimezoneErrorKind::DetectionFailed,
            format!("Failed to detect user timezone: {}", err),
            "Using UTC",
        );
        TimezoneInfo::utc_fallback(taiso_util::now())
    }

    pub fn handle_invalid_timezone(&self, timezone: &str, operation: &str) {
        self.report(
            TimezoneErrorKind::InvalidTimezone,
            format!("Invalid timezone '{}' in {}", timezone, operation),
            "Falling back to UTC",
        );
    }

    pub fn handle_conversion_error(&self, operation: &str, err: &dyn Display) {
        self.report(
            TimezoneErrorKind::ConversionError,
            format!("{} failed: {}", operation, err),
            "Returning the unconverted value",
        );
    }
}

impl Default for TimezoneErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TimezoneErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimezoneErrorReporter")
            .field("capacity", &self.capacity)
            .field("entries", &lock(&self.log).len())
            .field("subscribers", &lock(&self.subscribers).len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting(reporter: &TimezoneErrorReporter) -> (SubscriptionId, Arc<Mutex<Vec<(String, Severity)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = reporter.subscribe(move |msg, sev| sink.lock().unwrap().push((msg.to_string(), sev)));
        (id, seen)
    }

    #[test]
    fn report_records_entry() {
        let reporter = TimezoneErrorReporter::new();
        reporter.report(TimezoneErrorKind::DetectionFailed, "test error", "fallback");

        let log = reporter.error_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, TimezoneErrorKind::DetectionFailed);
        assert_eq!(log[0].message, "test error");
        assert_eq!(log[0].fallback_action, "fallback");
        assert!(!log[0].timestamp.is_empty());
    }

    #[test]
    fn report_sends_canned_message_not_raw_message() {
        let reporter = TimezoneErrorReporter::new();
        let (_, seen) = collecting(&reporter);

        reporter.report(TimezoneErrorKind::InvalidTimezone, "raw detail", "fallback");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, TimezoneErrorKind::InvalidTimezone.user_message());
        assert_eq!(seen[0].1, Severity::Warning);
    }

    #[test]
    fn severity_follows_kind() {
        let reporter = TimezoneErrorReporter::new();
        let (_, seen) = collecting(&reporter);

        for kind in TimezoneErrorKind::ALL {
            reporter.report(kind, "test", "fallback");
        }

        let severities: Vec<Severity> = seen.lock().unwrap().iter().map(|(_, s)| *s).collect();
        assert_eq!(
            severities,
            vec![Severity::Warning, Severity::Warning, Severity::Error]
        );
    }

    #[test]
    fn notify_passes_message_through() {
        let reporter = TimezoneErrorReporter::new();
        let (_, seen) = collecting(&reporter);

        reporter.notify("hello", Severity::Info);
        reporter.notify_error("oops");

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], ("hello".to_string(), Severity::Info));
        assert_eq!(seen[1], ("oops".to_string(), Severity::Error));
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let reporter = TimezoneErrorReporter::new();
        reporter.subscribe(|_, _| panic!("subscriber failure"));
        let (_, seen) = collecting(&reporter);

        reporter.notify("still delivered", Severity::Warning);

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn notify_without_subscribers_is_harmless() {
        let reporter = TimezoneErrorReporter::new();
        reporter.notify("nobody listening", Severity::Warning);
        assert_eq!(reporter.subscriber_count(), 0);
    }

    #[test]
    fn unsubscribe_and_unsubscribe_all() {
        let reporter = TimezoneErrorReporter::new();
        let (first, seen_first) = collecting(&reporter);
        let (_, seen_second) = collecting(&reporter);

        reporter.notify("one", Severity::Error);
        assert!(reporter.unsubscribe(first));
        assert!(!reporter.unsubscribe(first));
        reporter.notify("two", Severity::Error);

        assert_eq!(seen_first.lock().unwrap().len(), 1);
        assert_eq!(seen_second.lock().unwrap().len(), 2);

        reporter.unsubscribe_all();
        reporter.notify("three", Severity::Error);
        assert_eq!(seen_second.lock().unwrap().len(), 2);
    }

    #[test]
    fn log_is_bounded_and_evicts_oldest() {
        let reporter = TimezoneErrorReporter::new();
        for i in 0..=50 {
            reporter.report(TimezoneErrorKind::ConversionError, format!("error {}", i), "fallback");
        }

        let log = reporter.error_log();
        assert_eq!(log.len(), 50);
        assert_eq!(log[0].message, "error 1");
        assert_eq!(log[49].message, "error 50");
    }

    #[test]
    fn custom_capacity() {
        let reporter = TimezoneErrorReporter::with_capacity(3);
        for i in 0..5 {
            reporter.report(TimezoneErrorKind::ConversionError, format!("e{}", i), "f");
        }
        let messages: Vec<String> = reporter.error_log().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["e2", "e3", "e4"]);
    }

    #[test]
    fn count_by_kind() {
        let reporter = TimezoneErrorReporter::new();
        reporter.report(TimezoneErrorKind::DetectionFailed, "a", "f");
        reporter.report(TimezoneErrorKind::DetectionFailed, "b", "f");
        reporter.report(TimezoneErrorKind::ConversionError, "c", "f");

        assert_eq!(reporter.count_by_kind(None), 3);
        assert_eq!(reporter.count_by_kind(Some(TimezoneErrorKind::DetectionFailed)), 2);
        assert_eq!(reporter.count_by_kind(Some(TimezoneErrorKind::ConversionError)), 1);
        assert_eq!(reporter.count_by_kind(Some(TimezoneErrorKind::InvalidTimezone)), 0);

        reporter.clear_log();
        assert_eq!(reporter.count_by_kind(None), 0);
    }

    #[test]
    fn error_log_is_a_copy() {
        let reporter = TimezoneErrorReporter::new();
        reporter.report(TimezoneErrorKind::DetectionFailed, "a", "f");
        let mut copy = reporter.error_log();
        copy.clear();
        assert_eq!(reporter.error_log().len(), 1);
    }

    #[test]
    fn detection_failure_helper_returns_utc() {
        let reporter = TimezoneErrorReporter::new();
        let info = reporter.handle_detection_failure(&"platform said no");

        assert_eq!(info.timezone, "UTC");
        assert_eq!(info.offset, 0);
        assert_eq!(info.local_time, info.utc_time.naive_utc());

        let log = reporter.error_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, TimezoneErrorKind::DetectionFailed);
    }

    #[test]
    fn invalid_and_conversion_helpers_log_kind() {
        let reporter = TimezoneErrorReporter::new();
        reporter.handle_invalid_timezone("Invalid/Timezone", "test operation");
        reporter.handle_conversion_error("test conversion", &"boom");

        let log = reporter.error_log();
        assert_eq!(log[0].kind, TimezoneErrorKind::InvalidTimezone);
        assert!(log[0].message.contains("Invalid/Timezone"));
        assert_eq!(log[1].kind, TimezoneErrorKind::ConversionError);
    }
}
