//! Timezone change detection
//!
//! Polls the ambient zone on an interval and whenever the host reports the
//! app becoming visible again. Subscribers get `(new, old)` zone names.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use taiso_config::DEFAULT_POLL_INTERVAL;
use taiso_tz::{SubscriptionId, TimezoneResolver, next_subscription_id};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Callback receiving `(new_timezone, old_timezone)`
pub type TimezoneChangeCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct DetectorState {
    current_timezone: String,
    callbacks: Vec<(SubscriptionId, TimezoneChangeCallback)>,
}

struct Shared {
    resolver: Arc<TimezoneResolver>,
    state: Mutex<DetectorState>,
    visibility: watch::Sender<bool>,
}

impl Shared {
    /// Compare the detected zone with the last one seen and fan out a change.
    /// Nothing happens once `active` is cleared.
    fn check(&self, active: Option<&AtomicBool>) -> bool {
        let is_active = || active.is_none_or(|a| a.load(Ordering::SeqCst));
        if !is_active() {
            return false;
        }

        let detected = match self.resolver.try_current_timezone() {
            Ok(tz) => tz,
            Err(e) => {
                warn!(error = %e, "Timezone check failed");
                return false;
            }
        };

        let (old, callbacks) = {
            let mut state = lock(&self.state);
            if state.current_timezone == detected || !is_active() {
                return false;
            }
            let old = std::mem::replace(&mut state.current_timezone, detected.clone());
            let callbacks: Vec<TimezoneChangeCallback> =
                state.callbacks.iter().map(|(_, cb)| cb.clone()).collect();
            (old, callbacks)
        };

        info!(old = %old, new = %detected, "Timezone change detected");

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&detected, &old))).is_err() {
                error!("Timezone change callback panicked");
            }
        }
        true
    }
}

struct Monitor {
    handle: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
    active: Arc<AtomicBool>,
}

/// Watches the ambient timezone for changes
pub struct TimezoneChangeDetector {
    shared: Arc<Shared>,
    poll_interval: Duration,
    monitor: Mutex<Option<Monitor>>,
}

impl TimezoneChangeDetector {
    pub fn new(resolver: Arc<TimezoneResolver>, poll_interval: Duration) -> Self {
        let current_timezone = resolver.current_timezone();
        let (visibility, _) = watch::channel(true);
        Self {
            shared: Arc::new(Shared {
                resolver,
                state: Mutex::new(DetectorState {
                    current_timezone,
                    callbacks: Vec::new(),
                }),
                visibility,
            }),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            monitor: Mutex::new(None),
        }
    }

    /// Detector polling every 30 seconds
    pub fn with_default_interval(resolver: Arc<TimezoneResolver>) -> Self {
        Self::new(resolver, DEFAULT_POLL_INTERVAL)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Start polling. Must be called inside a Tokio runtime.
    pub fn start_monitoring(&self) {
        let mut monitor = lock(&self.monitor);
        if monitor.is_some() {
            warn!("Timezone monitoring is already running");
            return;
        }

        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let active = Arc::new(AtomicBool::new(true));
        let shared = self.shared.clone();
        let task_active = active.clone();
        let mut visibility = self.shared.visibility.subscribe();
        let period = self.poll_interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = interval.tick() => {
                        shared.check(Some(&task_active));
                    }
                    changed = visibility.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let visible = *visibility.borrow_and_update();
                        if visible {
                            debug!("Visible again, checking timezone");
                            shared.check(Some(&task_active));
                        }
                    }
                }
            }
            debug!("Timezone monitor exited");
        });

        *monitor = Some(Monitor {
            handle,
            shutdown,
            active,
        });
        info!(interval_secs = period.as_secs_f64(), "Timezone monitoring started");
    }

    /// Stop polling. Safe to call when not running.
    pub fn stop_monitoring(&self) {
        let Some(monitor) = lock(&self.monitor).take() else {
            return;
        };
        monitor.active.store(false, Ordering::SeqCst);
        let _ = monitor.shutdown.send(());
        monitor.handle.abort();
        info!("Timezone monitoring stopped");
    }

    pub fn is_running(&self) -> bool {
        lock(&self.monitor).is_some()
    }

    /// Host hook for visibility changes. Becoming visible triggers a check
    /// while monitoring.
    pub fn set_visibility(&self, visible: bool) {
        self.shared.visibility.send_replace(visible);
    }

    /// Check immediately. Returns whether a change was detected.
    pub fn check_now(&self) -> bool {
        self.shared.check(None)
    }

    pub fn on_change<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        let id = next_subscription_id();
        lock(&self.shared.state).callbacks.push((id, Arc::new(callback)));
        id
    }

    /// Returns whether the subscription existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = lock(&self.shared.state);
        let before = state.callbacks.len();
        state.callbacks.retain(|(cb_id, _)| *cb_id != id);
        state.callbacks.len() != before
    }

    pub fn callback_count(&self) -> usize {
        lock(&self.shared.state).callbacks.len()
    }

    /// Freshly resolved ambient zone, `UTC` on failure
    pub fn current_timezone_name(&self) -> String {
        self.shared.resolver.current_timezone()
    }

    /// Zone seen at the last check
    pub fn last_seen_timezone(&self) -> String {
        lock(&self.shared.state).current_timezone.clone()
    }
}

impl Drop for TimezoneChangeDetector {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

impl std::fmt::Debug for TimezoneChangeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimezoneChangeDetector")
            .field("last_seen", &self.last_seen_timezone())
            .field("poll_interval", &self.poll_interval)
            .field("running", &self.is_running())
            .field("callbacks", &self.callback_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taiso_tz::{MockZoneSource, TimezoneErrorReporter};

    type Changes = Arc<Mutex<Vec<(String, String)>>>;

    fn fixture(zone: &str) -> (TimezoneChangeDetector, Arc<MockZoneSource>) {
        let source = Arc::new(MockZoneSource::new(zone));
        let resolver = Arc::new(TimezoneResolver::new(
            source.clone(),
            Arc::new(TimezoneErrorReporter::new()),
        ));
        (TimezoneChangeDetector::with_default_interval(resolver), source)
    }

    fn record_changes(detector: &TimezoneChangeDetector) -> Changes {
        let changes: Changes = Arc::new(Mutex::new(Vec::new()));
        let sink = changes.clone();
        detector.on_change(move |new, old| {
            sink.lock().unwrap().push((new.to_string(), old.to_string()));
        });
        changes
    }

    fn pair(new: &str, old: &str) -> (String, String) {
        (new.to_string(), old.to_string())
    }

    #[test]
    fn check_now_reports_change_once() {
        let (detector, source) = fixture("Asia/Tokyo");
        let changes = record_changes(&detector);

        assert!(!detector.check_now());
        source.set_zone("America/New_York");
        assert!(detector.check_now());
        assert!(!detector.check_now());

        assert_eq!(
            *changes.lock().unwrap(),
            vec![pair("America/New_York", "Asia/Tokyo")]
        );
        assert_eq!(detector.last_seen_timezone(), "America/New_York");
    }

    #[test]
    fn panicking_callback_does_not_block_others() {
        let (detector, source) = fixture("Asia/Tokyo");
        detector.on_change(|_, _| panic!("callback failure"));
        let changes = record_changes(&detector);

        source.set_zone("Europe/London");
        assert!(detector.check_now());
        assert_eq!(changes.lock().unwrap().len(), 1);
    }

    #[test]
    fn detection_failure_is_no_change() {
        let (detector, source) = fixture("Asia/Tokyo");
        let changes = record_changes(&detector);

        source.set_failing(true);
        assert!(!detector.check_now());
        assert_eq!(detector.last_seen_timezone(), "Asia/Tokyo");
        assert!(changes.lock().unwrap().is_empty());
    }

    #[test]
    fn unsubscribe_removes_callback() {
        let (detector, source) = fixture("Asia/Tokyo");
        let id = detector.on_change(|_, _| {});
        let changes = record_changes(&detector);
        assert_eq!(detector.callback_count(), 2);

        assert!(detector.unsubscribe(id));
        assert!(!detector.unsubscribe(id));
        assert_eq!(detector.callback_count(), 1);

        source.set_zone("UTC");
        detector.check_now();
        assert_eq!(changes.lock().unwrap().len(), 1);
    }

    #[test]
    fn initial_zone_falls_back_to_utc() {
        let source = Arc::new(MockZoneSource::new("Asia/Tokyo"));
        source.set_failing(true);
        let resolver = Arc::new(TimezoneResolver::new(
            source.clone(),
            Arc::new(TimezoneErrorReporter::new()),
        ));
        let detector = TimezoneChangeDetector::with_default_interval(resolver);
        assert_eq!(detector.last_seen_timezone(), "UTC");
        assert_eq!(detector.current_timezone_name(), "UTC");
    }

    #[tokio::test(start_paused = true)]
    async fn interval_poll_detects_change() {
        let (detector, source) = fixture("Asia/Tokyo");
        let changes = record_changes(&detector);
        detector.start_monitoring();
        assert!(detector.is_running());

        source.set_zone("America/New_York");
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(changes.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(
            *changes.lock().unwrap(),
            vec![pair("America/New_York", "Asia/Tokyo")]
        );

        detector.stop_monitoring();
    }

    #[tokio::test(start_paused = true)]
    async fn becoming_visible_triggers_check() {
        let (detector, source) = fixture("Asia/Tokyo");
        let changes = record_changes(&detector);
        detector.start_monitoring();

        source.set_zone("Europe/Paris");
        detector.set_visibility(false);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(changes.lock().unwrap().is_empty());

        detector.set_visibility(true);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            *changes.lock().unwrap(),
            vec![pair("Europe/Paris", "Asia/Tokyo")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_silences_callbacks() {
        let (detector, source) = fixture("Asia/Tokyo");
        let changes = record_changes(&detector);

        detector.stop_monitoring();
        detector.start_monitoring();
        detector.stop_monitoring();
        detector.stop_monitoring();
        assert!(!detector.is_running());

        source.set_zone("America/New_York");
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(changes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_keeps_one_monitor() {
        let (detector, source) = fixture("Asia/Tokyo");
        let changes = record_changes(&detector);

        detector.start_monitoring();
        detector.start_monitoring();
        assert!(detector.is_running());

        source.set_zone("America/New_York");
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(changes.lock().unwrap().len(), 1);

        detector.stop_monitoring();
        assert!(!detector.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_survives_detection_failure() {
        let (detector, source) = fixture("Asia/Tokyo");
        let changes = record_changes(&detector);
        detector.start_monitoring();

        source.set_failing(true);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(detector.is_running());

        source.set_failing(false);
        source.set_zone("Australia/Sydney");
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(
            *changes.lock().unwrap(),
            vec![pair("Australia/Sydney", "Asia/Tokyo")]
        );
    }
}
