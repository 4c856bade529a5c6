//! Rate-limited diagnostic reporting.
//!
//! The reporter is a small state machine deciding when a diagnostic record
//! may be emitted, so that high-frequency triggering does not flood output.
//! Two policies exist: smart mode suppresses bursts and unchanged-state
//! repeats, complete mode only enforces a repeat window. The
//! disabled-for-logging gate precedes policy evaluation, which keeps
//! "suppressed because disabled" and "suppressed by throttle" distinguishable
//! to callers.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::PulseError;
use crate::settings::{SettingsCache, SettingsSnapshot};

/// Throttling policy applied to a single report call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogMode {
    /// Suppress bursts and unchanged-state repeats.
    Smart,
    /// Emit on every call outside the repeat window.
    Complete,
}

/// Why a report call did or did not emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// One record was emitted through the sink.
    Emitted,
    /// Logging is disabled (settings flag or build configuration); no state
    /// was touched, not even the clock.
    SuppressedDisabled,
    /// The throttling policy suppressed the emission.
    SuppressedThrottled,
}

/// What prompted an emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiagnosticContext {
    /// A policy-governed settings report.
    Policy,
    /// Dispatch was gated off because feedback is disabled.
    GateDisabled,
    /// A resource failure; these bypass throttling entirely.
    Failure {
        /// Rendered error message.
        message: String,
    },
}

/// Structured snapshot of settings and throttle state at emission time.
///
/// Emitted as one atomic record; the timestamps describe the throttle state
/// *before* this emission updated it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    /// Emission time.
    pub at: DateTime<Utc>,
    /// Device capability.
    pub capable: bool,
    /// Master enable flag.
    pub enabled: bool,
    /// Logging flag.
    pub logging_enabled: bool,
    /// Previous policy emission, if any.
    pub last_log_at: Option<DateTime<Utc>>,
    /// Previous suppressed-as-unchanged timestamp, if any.
    pub last_skip_log_at: Option<DateTime<Utc>>,
    /// What prompted the emission.
    pub context: DiagnosticContext,
}

/// Destination for emitted diagnostic records.
pub trait DiagnosticSink: Send + Sync {
    /// Deliver one record. Must not block for long; it runs inside the
    /// reporter's state lock.
    fn emit(&self, record: &DiagnosticRecord);
}

/// Default sink: one JSON line per record through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, record: &DiagnosticRecord) {
        match serde_json::to_string(record) {
            Ok(json) => tracing::info!(target: "pulsekit::diagnostics", "{json}"),
            Err(e) => {
                tracing::warn!(target: "pulsekit::diagnostics", "unserializable record: {e}");
            }
        }
    }
}

/// Throttle memory, single-owner, mutated only under the reporter's lock.
#[derive(Debug, Default)]
struct ThrottleState {
    last_log_at: Option<DateTime<Utc>>,
    last_skip_log_at: Option<DateTime<Utc>>,
    last_enabled: Option<bool>,
    last_logging_enabled: Option<bool>,
    /// Separate window for the disabled-gate notice path.
    last_gate_log_at: Option<DateTime<Utc>>,
}

/// Rate-limited, stateful diagnostic logger.
///
/// Policy decisions and state updates happen atomically under one mutex, so
/// two concurrent calls can never both conclude "should log" for the same
/// window.
pub struct DiagnosticReporter {
    settings: Arc<SettingsCache>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn DiagnosticSink>,
    state: Mutex<ThrottleState>,
}

impl DiagnosticReporter {
    /// Reporter with the system clock and the `tracing` sink.
    #[must_use]
    pub fn new(settings: Arc<SettingsCache>) -> Self {
        Self::with_parts(settings, Arc::new(SystemClock), Arc::new(TracingSink))
    }

    /// Reporter with an injected clock and sink.
    #[must_use]
    pub fn with_parts(
        settings: Arc<SettingsCache>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            settings,
            clock,
            sink,
            state: Mutex::new(ThrottleState::default()),
        }
    }

    /// Apply `mode` and possibly emit one settings record.
    pub fn report(&self, mode: LogMode) -> ReportOutcome {
        if !cfg!(feature = "diagnostics") {
            return ReportOutcome::SuppressedDisabled;
        }

        let snapshot = self.settings.read();
        if !snapshot.logging_enabled {
            return ReportOutcome::SuppressedDisabled;
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();

        match mode {
            LogMode::Smart => {
                // A burst of calls inside the skip window is dropped without
                // touching any state.
                if let Some(skip_at) = state.last_skip_log_at {
                    if now - skip_at < snapshot.skip_threshold {
                        return ReportOutcome::SuppressedThrottled;
                    }
                }

                if let Some(log_at) = state.last_log_at {
                    if now - log_at < snapshot.repeat_threshold {
                        let unchanged = state.last_enabled == Some(snapshot.enabled)
                            && state.last_logging_enabled == Some(snapshot.logging_enabled);
                        if unchanged {
                            state.last_skip_log_at = Some(now);
                            return ReportOutcome::SuppressedThrottled;
                        }
                        // State changed inside the window: worth a record.
                    }
                }

                self.emit(&mut state, &snapshot, now, DiagnosticContext::Policy);
                ReportOutcome::Emitted
            }
            LogMode::Complete => {
                if let Some(log_at) = state.last_log_at {
                    if now - log_at < snapshot.repeat_threshold {
                        return ReportOutcome::SuppressedThrottled;
                    }
                }

                self.emit(&mut state, &snapshot, now, DiagnosticContext::Policy);
                ReportOutcome::Emitted
            }
        }
    }

    /// Time-throttled notice that dispatch was gated off.
    ///
    /// Runs on its own window (the repeat threshold) so steady-state disabled
    /// dispatching produces a bounded trickle rather than an unbounded count.
    pub fn report_gated(&self) -> ReportOutcome {
        if !cfg!(feature = "diagnostics") {
            return ReportOutcome::SuppressedDisabled;
        }

        let snapshot = self.settings.read();
        if !snapshot.logging_enabled {
            return ReportOutcome::SuppressedDisabled;
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();

        if let Some(gate_at) = state.last_gate_log_at {
            if now - gate_at < snapshot.repeat_threshold {
                return ReportOutcome::SuppressedThrottled;
            }
        }
        state.last_gate_log_at = Some(now);

        let record = DiagnosticRecord {
            at: now,
            capable: snapshot.capable,
            enabled: snapshot.enabled,
            logging_enabled: snapshot.logging_enabled,
            last_log_at: state.last_log_at,
            last_skip_log_at: state.last_skip_log_at,
            context: DiagnosticContext::GateDisabled,
        };
        self.sink.emit(&record);
        ReportOutcome::Emitted
    }

    /// Unconditional emission for rare, actionable resource failures.
    ///
    /// Bypasses both the logging flag and the throttle windows; the only way
    /// to silence it is building without the `diagnostics` feature.
    pub fn report_failure(&self, error: &PulseError) {
        if !cfg!(feature = "diagnostics") {
            return;
        }

        let snapshot = self.settings.read();
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();

        let record = DiagnosticRecord {
            at: now,
            capable: snapshot.capable,
            enabled: snapshot.enabled,
            logging_enabled: snapshot.logging_enabled,
            last_log_at: state.last_log_at,
            last_skip_log_at: state.last_skip_log_at,
            context: DiagnosticContext::Failure {
                message: error.to_string(),
            },
        };
        self.sink.emit(&record);
    }

    fn emit(
        &self,
        state: &mut ThrottleState,
        snapshot: &SettingsSnapshot,
        now: DateTime<Utc>,
        context: DiagnosticContext,
    ) {
        let record = DiagnosticRecord {
            at: now,
            capable: snapshot.capable,
            enabled: snapshot.enabled,
            logging_enabled: snapshot.logging_enabled,
            last_log_at: state.last_log_at,
            last_skip_log_at: state.last_skip_log_at,
            context,
        };

        state.last_log_at = Some(now);
        state.last_enabled = Some(snapshot.enabled);
        state.last_logging_enabled = Some(snapshot.logging_enabled);

        self.sink.emit(&record);
    }
}

impl std::fmt::Debug for DiagnosticReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticReporter")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use chrono::Duration;

    use super::*;
    use crate::clock::ManualClock;
    use crate::settings::{
        CapabilityProbe, MemorySettingsStore, SettingsKey, SettingsStore,
    };

    struct CapableProbe;

    impl CapabilityProbe for CapableProbe {
        fn supports_effects(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        records: StdMutex<Vec<DiagnosticRecord>>,
    }

    impl DiagnosticSink for CollectingSink {
        fn emit(&self, record: &DiagnosticRecord) {
            self.records.lock().unwrap().push(record.clone());
        }
    }

    impl CollectingSink {
        fn count(&self) -> usize {
            self.records.lock().unwrap().len()
        }
    }

    fn reporter_with(
        logging_enabled: bool,
    ) -> (DiagnosticReporter, Arc<ManualClock>, Arc<CollectingSink>, Arc<MemorySettingsStore>) {
        let store = Arc::new(MemorySettingsStore::new());
        store.set_bool(SettingsKey::LoggingEnabled, logging_enabled);
        let cache = SettingsCache::new(Arc::clone(&store) as Arc<dyn SettingsStore>, &CapableProbe);

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sink = Arc::new(CollectingSink::default());
        let reporter = DiagnosticReporter::with_parts(
            cache,
            Arc::clone(&clock) as Arc<dyn Clock>,
            Arc::clone(&sink) as Arc<dyn DiagnosticSink>,
        );
        (reporter, clock, sink, store)
    }

    #[test]
    fn disabled_logging_is_a_noop_and_distinguishable() {
        let (reporter, _clock, sink, _store) = reporter_with(false);

        assert_eq!(reporter.report(LogMode::Smart), ReportOutcome::SuppressedDisabled);
        assert_eq!(
            reporter.report(LogMode::Complete),
            ReportOutcome::SuppressedDisabled
        );
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn smart_mode_first_call_emits() {
        let (reporter, _clock, sink, _store) = reporter_with(true);

        assert_eq!(reporter.report(LogMode::Smart), ReportOutcome::Emitted);
        assert_eq!(sink.count(), 1);
    }

    #[test]
    fn smart_mode_suppresses_bursts_inside_skip_window() {
        let (reporter, clock, sink, _store) = reporter_with(true);

        // First call emits, second (unchanged state inside the repeat
        // window) records a skip, third arrives 10ms later: inside the
        // 50ms skip window, dropped without state updates.
        assert_eq!(reporter.report(LogMode::Smart), ReportOutcome::Emitted);
        clock.advance(Duration::milliseconds(10));
        assert_eq!(reporter.report(LogMode::Smart), ReportOutcome::SuppressedThrottled);
        clock.advance(Duration::milliseconds(10));
        assert_eq!(reporter.report(LogMode::Smart), ReportOutcome::SuppressedThrottled);

        assert_eq!(sink.count(), 1);
    }

    #[test]
    fn smart_mode_unchanged_state_stays_quiet_inside_repeat_window() {
        let (reporter, clock, sink, _store) = reporter_with(true);

        assert_eq!(reporter.report(LogMode::Smart), ReportOutcome::Emitted);

        // Spaced beyond the skip window but inside the 900ms repeat window,
        // with no settings change: zero further emissions.
        for _ in 0..5 {
            clock.advance(Duration::milliseconds(100));
            assert_eq!(reporter.report(LogMode::Smart), ReportOutcome::SuppressedThrottled);
        }
        assert_eq!(sink.count(), 1);
    }

    #[test]
    fn smart_mode_emits_on_state_change_inside_repeat_window() {
        let (reporter, clock, sink, store) = reporter_with(true);

        assert_eq!(reporter.report(LogMode::Smart), ReportOutcome::Emitted);

        store.set_bool(SettingsKey::Enabled, false);
        clock.advance(Duration::milliseconds(100));
        assert_eq!(reporter.report(LogMode::Smart), ReportOutcome::Emitted);
        assert_eq!(sink.count(), 2);
    }

    #[test]
    fn smart_mode_emits_after_repeat_window_expires() {
        let (reporter, clock, sink, _store) = reporter_with(true);

        assert_eq!(reporter.report(LogMode::Smart), ReportOutcome::Emitted);
        clock.advance(Duration::milliseconds(901));
        assert_eq!(reporter.report(LogMode::Smart), ReportOutcome::Emitted);
        assert_eq!(sink.count(), 2);
    }

    #[test]
    fn complete_mode_enforces_only_the_repeat_window() {
        let (reporter, clock, sink, _store) = reporter_with(true);

        assert_eq!(reporter.report(LogMode::Complete), ReportOutcome::Emitted);
        clock.advance(Duration::milliseconds(100));
        assert_eq!(
            reporter.report(LogMode::Complete),
            ReportOutcome::SuppressedThrottled
        );
        clock.advance(Duration::milliseconds(900));
        assert_eq!(reporter.report(LogMode::Complete), ReportOutcome::Emitted);
        assert_eq!(sink.count(), 2);
    }

    #[test]
    fn gate_notices_use_their_own_window() {
        let (reporter, clock, sink, _store) = reporter_with(true);

        assert_eq!(reporter.report_gated(), ReportOutcome::Emitted);
        clock.advance(Duration::milliseconds(100));
        assert_eq!(reporter.report_gated(), ReportOutcome::SuppressedThrottled);

        // The gate window does not consume the policy window.
        assert_eq!(reporter.report(LogMode::Complete), ReportOutcome::Emitted);
        assert_eq!(sink.count(), 2);
    }

    #[test]
    fn failures_bypass_flag_and_throttle() {
        let (reporter, _clock, sink, _store) = reporter_with(false);

        reporter.report_failure(&PulseError::engine_start("stopped by interruption"));
        reporter.report_failure(&PulseError::engine_start("stopped by interruption"));
        assert_eq!(sink.count(), 2);

        let records = sink.records.lock().unwrap();
        assert!(matches!(
            records[0].context,
            DiagnosticContext::Failure { .. }
        ));
    }

    #[test]
    fn concurrent_reports_emit_once_per_repeat_window() {
        use std::thread;

        let (reporter, clock, sink, _store) = reporter_with(true);
        let reporter = Arc::new(reporter);

        let storm = |reporter: &Arc<DiagnosticReporter>| {
            let mut workers = Vec::new();
            for _ in 0..8 {
                let reporter = Arc::clone(reporter);
                workers.push(thread::spawn(move || {
                    for _ in 0..200 {
                        reporter.report(LogMode::Complete);
                    }
                }));
            }
            for worker in workers {
                worker.join().unwrap();
            }
        };

        // With the clock frozen, all 1600 racing calls share one window:
        // exactly one may win it.
        storm(&reporter);
        assert_eq!(sink.count(), 1);

        clock.advance(Duration::milliseconds(901));
        storm(&reporter);
        assert_eq!(sink.count(), 2);
    }

    #[test]
    fn records_serialize_to_json() {
        let record = DiagnosticRecord {
            at: Utc::now(),
            capable: true,
            enabled: true,
            logging_enabled: true,
            last_log_at: None,
            last_skip_log_at: None,
            context: DiagnosticContext::Policy,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"type\":\"policy\""));
    }
}
