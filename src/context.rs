//! Process-wide feedback context.
//!
//! The services here are built once at startup and passed by handle to
//! dispatch call sites. There is no ambient global state: hosts own the
//! context and thread it explicitly (or test-inject the pieces).

use std::sync::Arc;

use crate::clock::Clock;
use crate::dispatch::{DispatchOutcome, Dispatcher, UiExecutor};
use crate::effect::EffectRequest;
use crate::pool::{EmitterFactory, EngineFactory, ResourcePool};
use crate::reporter::{DiagnosticReporter, DiagnosticSink, LogMode};
use crate::settings::{CapabilityProbe, SettingsCache, SettingsStore};
use crate::trigger::{TapTrigger, TriggerBehavior, TriggerEvaluator};

/// Context configuration.
#[derive(Debug, Clone)]
pub struct FeedbackConfig {
    /// Max queued effect performances before drops apply.
    pub ui_queue_capacity: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            ui_queue_capacity: 256,
        }
    }
}

/// The wired-up feedback dispatch services.
///
/// Construct one per process; every handle it exposes is cheaply clonable
/// and safe to share across threads.
#[derive(Debug)]
pub struct FeedbackContext {
    settings: Arc<SettingsCache>,
    pool: Arc<ResourcePool>,
    reporter: Arc<DiagnosticReporter>,
    dispatcher: Arc<Dispatcher>,
}

impl FeedbackContext {
    /// Wire a context from the host's collaborators, using the system clock
    /// and the `tracing` diagnostic sink.
    #[must_use]
    pub fn new(
        config: FeedbackConfig,
        store: Arc<dyn SettingsStore>,
        probe: &dyn CapabilityProbe,
        emitter_factory: Arc<dyn EmitterFactory>,
        engine_factory: Arc<dyn EngineFactory>,
    ) -> Self {
        let settings = SettingsCache::new(store, probe);
        let reporter = Arc::new(DiagnosticReporter::new(Arc::clone(&settings)));
        Self::assemble(config, settings, reporter, emitter_factory, engine_factory)
    }

    /// Wire a context with an injected clock and diagnostic sink.
    #[must_use]
    pub fn with_diagnostics(
        config: FeedbackConfig,
        store: Arc<dyn SettingsStore>,
        probe: &dyn CapabilityProbe,
        emitter_factory: Arc<dyn EmitterFactory>,
        engine_factory: Arc<dyn EngineFactory>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        let settings = SettingsCache::new(store, probe);
        let reporter = Arc::new(DiagnosticReporter::with_parts(
            Arc::clone(&settings),
            clock,
            sink,
        ));
        Self::assemble(config, settings, reporter, emitter_factory, engine_factory)
    }

    fn assemble(
        config: FeedbackConfig,
        settings: Arc<SettingsCache>,
        reporter: Arc<DiagnosticReporter>,
        emitter_factory: Arc<dyn EmitterFactory>,
        engine_factory: Arc<dyn EngineFactory>,
    ) -> Self {
        let pool = Arc::new(ResourcePool::new(emitter_factory, engine_factory));
        let executor = Arc::new(UiExecutor::new(config.ui_queue_capacity));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&settings),
            Arc::clone(&pool),
            Arc::clone(&reporter),
            executor,
        ));

        Self {
            settings,
            pool,
            reporter,
            dispatcher,
        }
    }

    /// Dispatch one resolved request.
    pub fn dispatch(&self, request: EffectRequest, mode: LogMode) -> DispatchOutcome {
        self.dispatcher.dispatch(request, mode)
    }

    /// Build a trigger evaluator bound to this context's dispatcher.
    #[must_use]
    pub fn trigger<T: PartialEq>(
        &self,
        behavior: TriggerBehavior<T>,
        mode: LogMode,
    ) -> TriggerEvaluator<T> {
        TriggerEvaluator::new(Arc::clone(&self.dispatcher), behavior, mode)
    }

    /// Build a tap trigger bound to this context's dispatcher.
    #[must_use]
    pub fn tap(&self, request: EffectRequest, mode: LogMode) -> TapTrigger {
        TapTrigger::new(Arc::clone(&self.dispatcher), request, mode)
    }

    /// The settings cache.
    #[must_use]
    pub fn settings(&self) -> &Arc<SettingsCache> {
        &self.settings
    }

    /// The resource pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<ResourcePool> {
        &self.pool
    }

    /// The diagnostic reporter.
    #[must_use]
    pub fn reporter(&self) -> &Arc<DiagnosticReporter> {
        &self.reporter
    }

    /// The dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}
