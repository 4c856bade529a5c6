//! Gating, routing, and UI-context marshaling for effect requests.
//!
//! The dispatcher reads a settings snapshot, applies the capability and
//! enable gates, feeds the diagnostic reporter, and queues the physical
//! performance step onto a dedicated UI-affine worker thread. Everything
//! before that queueing step runs on the caller's thread and is safe from
//! any context.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::effect::{CustomEffect, EffectRequest, EmitterStyle};
use crate::pool::ResourcePool;
use crate::reporter::{DiagnosticReporter, LogMode};
use crate::settings::SettingsCache;

/// Why a dispatch performed no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateReason {
    /// The device cannot perform feedback effects.
    NotCapable,
    /// Feedback is switched off in settings.
    Disabled,
}

/// Result of a dispatch call.
///
/// Gate outcomes are expected steady-state conditions, not errors, and
/// resource failures after queueing are reported through the diagnostic
/// channel rather than surfaced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The effect was queued for performance on the UI context.
    Dispatched,
    /// The gate rejected the request; nothing was queued.
    Gated(GateReason),
    /// The effect could not be queued (saturated executor or pool failure);
    /// reported, not returned.
    Dropped,
}

type UiJob = Box<dyn FnOnce() + Send + 'static>;

/// Single-threaded executor standing in for a UI-affine context.
///
/// Jobs are enqueued without blocking; when the queue is full the job is
/// dropped and counted, never stalling the caller.
pub struct UiExecutor {
    tx: Sender<UiJob>,
    dropped: AtomicU64,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl UiExecutor {
    /// Spawn the worker thread with the given queue capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded::<UiJob>(capacity.max(1));
        let join = thread::Builder::new()
            .name("pulsekit-ui".to_string())
            .spawn(move || worker_loop(rx))
            .expect("failed to spawn pulsekit ui worker");

        Self {
            tx,
            dropped: AtomicU64::new(0),
            join: Mutex::new(Some(join)),
        }
    }

    /// Queue a job for the UI context. Never blocks; returns whether the
    /// job was accepted.
    pub fn execute(&self, job: UiJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Block until every job queued before this call has run.
    ///
    /// Intended for tests and orderly host shutdown; dispatch itself never
    /// waits on the queue.
    pub fn barrier(&self) {
        let (tx, rx) = bounded::<()>(1);
        // A blocking send: the marker must land even on a saturated queue,
        // and it is not a dropped effect if it has to wait for room.
        let marker: UiJob = Box::new(move || {
            let _ = tx.send(());
        });
        if self.tx.send(marker).is_ok() {
            let _ = rx.recv();
        }
    }

    /// Number of jobs dropped because the queue was full.
    #[must_use]
    pub fn dropped_jobs(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for UiExecutor {
    fn drop(&mut self) {
        // Close the channel, then detach. The worker exits once the last
        // sender is gone; joining here could deadlock a host that drops the
        // executor from a queued job's context.
        let (dummy_tx, _) = bounded::<UiJob>(1);
        drop(std::mem::replace(&mut self.tx, dummy_tx));

        if let Ok(mut guard) = self.join.lock() {
            if let Some(handle) = guard.take() {
                drop(handle);
            }
        }
    }
}

impl std::fmt::Debug for UiExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiExecutor")
            .field("dropped", &self.dropped_jobs())
            .finish_non_exhaustive()
    }
}

fn worker_loop(rx: Receiver<UiJob>) {
    while let Ok(job) = rx.recv() {
        job();
    }
}

/// Gates and routes resolved effect requests.
///
/// Safe to call concurrently from any context without external
/// synchronization; every shared collaborator enforces its own discipline.
pub struct Dispatcher {
    settings: Arc<SettingsCache>,
    pool: Arc<ResourcePool>,
    reporter: Arc<DiagnosticReporter>,
    executor: Arc<UiExecutor>,
}

impl Dispatcher {
    /// Wire a dispatcher over its collaborators.
    #[must_use]
    pub fn new(
        settings: Arc<SettingsCache>,
        pool: Arc<ResourcePool>,
        reporter: Arc<DiagnosticReporter>,
        executor: Arc<UiExecutor>,
    ) -> Self {
        Self {
            settings,
            pool,
            reporter,
            executor,
        }
    }

    /// Gate, log, and queue `request` for performance.
    ///
    /// Fire-and-forget: the call returns once the performance step is
    /// queued. Failures inside that step (engine creation or start, custom
    /// effect playback) are reported through the diagnostic channel and
    /// never propagate back here.
    pub fn dispatch(&self, request: EffectRequest, mode: LogMode) -> DispatchOutcome {
        let snapshot = self.settings.read();

        if !snapshot.capable {
            return DispatchOutcome::Gated(GateReason::NotCapable);
        }
        if !snapshot.enabled {
            self.reporter.report_gated();
            return DispatchOutcome::Gated(GateReason::Disabled);
        }

        // Side channel only; its outcome never affects routing.
        self.reporter.report(mode);

        let queued = match request {
            EffectRequest::Impact(level) => self.queue_pooled(EmitterStyle::Impact(level)),
            EffectRequest::Notification(kind) => {
                self.queue_pooled(EmitterStyle::Notification(kind))
            }
            EffectRequest::Custom(effect) => self.queue_custom(effect),
        };

        if queued {
            DispatchOutcome::Dispatched
        } else {
            DispatchOutcome::Dropped
        }
    }

    fn queue_pooled(&self, style: EmitterStyle) -> bool {
        let emitter = match self.pool.emitter(style) {
            Ok(emitter) => emitter,
            Err(e) => {
                self.reporter.report_failure(&e);
                return false;
            }
        };

        let reporter = Arc::clone(&self.reporter);
        self.executor.execute(Box::new(move || {
            if let Err(e) = emitter.emit() {
                reporter.report_failure(&e);
            }
        }))
    }

    fn queue_custom(&self, effect: Arc<dyn CustomEffect>) -> bool {
        let reporter = Arc::clone(&self.reporter);
        let pool = Arc::clone(&self.pool);
        self.executor.execute(Box::new(move || {
            // The effect acquires and (re)starts the shared engine itself;
            // whatever fails in there surfaces as one reported error.
            if let Err(e) = effect.play(pool.as_ref()) {
                reporter.report_failure(&e);
            }
        }))
    }

    /// The executor used for final effect performance.
    #[must_use]
    pub fn executor(&self) -> &Arc<UiExecutor> {
        &self.executor
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pool", &self.pool)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
