//! Pooled emitter handles and the shared feedback engine.
//!
//! Emitter handles are expensive enough to warrant reuse: one is created per
//! distinct style on first request and retained for the process lifetime.
//! The shared engine behind custom effects is created lazily and must be
//! (re)started before each use, because the environment (for example an
//! interruption from another haptic or audio consumer) can stop it between
//! uses without notifying this pool.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::effect::EmitterStyle;
use crate::error::{PulseError, PulseResult};

/// A reusable handle that performs a single effect style.
pub trait EffectEmitter: Send + Sync {
    /// Perform this emitter's effect once. Assumed non-blocking or
    /// internally asynchronous.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying primitive rejected the request.
    fn emit(&self) -> PulseResult<()>;
}

/// Creates style-bound emitter handles.
///
/// Creation is infallible; fallibility lives in the engine, not the
/// per-style handles.
pub trait EmitterFactory: Send + Sync {
    /// Construct a fresh handle for `style`.
    fn create(&self, style: EmitterStyle) -> Arc<dyn EffectEmitter>;
}

/// The process-wide stateful engine behind composite and custom effects.
pub trait FeedbackEngine: Send + Sync {
    /// (Re)start the engine. Starting an already-running engine is a
    /// harmless no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::EngineStart`] when the driver refuses.
    fn start(&self) -> PulseResult<()>;
}

/// Constructs the shared engine. Construction may fail on hardware or
/// driver errors.
pub trait EngineFactory: Send + Sync {
    /// Construct the engine.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::EngineCreation`] when construction fails.
    fn create(&self) -> PulseResult<Arc<dyn FeedbackEngine>>;
}

/// Lazy pool of emitter handles plus the lazily-created shared engine.
///
/// Both create-if-absent paths are lock-protected, so concurrent first use
/// never constructs duplicates. Entries are never evicted; the style space
/// is finite.
pub struct ResourcePool {
    emitter_factory: Arc<dyn EmitterFactory>,
    engine_factory: Arc<dyn EngineFactory>,
    emitters: Mutex<HashMap<EmitterStyle, Arc<dyn EffectEmitter>>>,
    engine: Mutex<Option<Arc<dyn FeedbackEngine>>>,
}

impl ResourcePool {
    /// Build an empty pool over the given factories.
    #[must_use]
    pub fn new(
        emitter_factory: Arc<dyn EmitterFactory>,
        engine_factory: Arc<dyn EngineFactory>,
    ) -> Self {
        Self {
            emitter_factory,
            engine_factory,
            emitters: Mutex::new(HashMap::new()),
            engine: Mutex::new(None),
        }
    }

    /// The pooled emitter for `style`, created and stored on first request.
    ///
    /// # Errors
    ///
    /// Returns an internal error only if the pool lock is poisoned.
    pub fn emitter(&self, style: EmitterStyle) -> PulseResult<Arc<dyn EffectEmitter>> {
        let mut guard = self
            .emitters
            .lock()
            .map_err(|_| PulseError::internal("emitter pool lock poisoned"))?;
        let handle = guard
            .entry(style)
            .or_insert_with(|| self.emitter_factory.create(style));
        Ok(Arc::clone(handle))
    }

    /// The shared engine, constructing it on first use.
    ///
    /// A failed construction is not cached: the next call retries once.
    ///
    /// # Errors
    ///
    /// Propagates [`PulseError::EngineCreation`] from the factory.
    pub fn shared_engine(&self) -> PulseResult<Arc<dyn FeedbackEngine>> {
        let mut guard = self
            .engine
            .lock()
            .map_err(|_| PulseError::internal("engine slot lock poisoned"))?;
        if let Some(engine) = guard.as_ref() {
            return Ok(Arc::clone(engine));
        }

        // Constructed under the lock so a concurrent first use waits rather
        // than racing a second construction. Creation is bounded.
        let engine = self.engine_factory.create()?;
        *guard = Some(Arc::clone(&engine));
        Ok(engine)
    }

    /// Create the engine if needed, then (re)start it.
    ///
    /// Must run before each use of the shared engine. A single failed
    /// attempt is reported to the caller and never retried in a loop; a
    /// later dispatch simply tries again.
    ///
    /// # Errors
    ///
    /// Propagates creation and start failures.
    pub fn ensure_started(&self) -> PulseResult<Arc<dyn FeedbackEngine>> {
        let engine = self.shared_engine()?;
        engine.start()?;
        Ok(engine)
    }

    /// Number of pooled emitter handles, for introspection and tests.
    #[must_use]
    pub fn emitter_count(&self) -> usize {
        self.emitters.lock().map(|guard| guard.len()).unwrap_or(0)
    }
}

impl fmt::Debug for ResourcePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let engine_live = self
            .engine
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false);
        f.debug_struct("ResourcePool")
            .field("emitters", &self.emitter_count())
            .field("engine_live", &engine_live)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;
    use crate::effect::ImpactLevel;

    struct NoopEmitter;

    impl EffectEmitter for NoopEmitter {
        fn emit(&self) -> PulseResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingEmitterFactory {
        created: AtomicUsize,
    }

    impl EmitterFactory for CountingEmitterFactory {
        fn create(&self, _style: EmitterStyle) -> Arc<dyn EffectEmitter> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Arc::new(NoopEmitter)
        }
    }

    #[derive(Default)]
    struct CountingEngine {
        starts: AtomicUsize,
    }

    impl FeedbackEngine for CountingEngine {
        fn start(&self) -> PulseResult<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Fails the first `failures` constructions, then succeeds.
    struct FlakyEngineFactory {
        failures: AtomicUsize,
        created: AtomicUsize,
    }

    impl FlakyEngineFactory {
        fn new(failures: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                created: AtomicUsize::new(0),
            }
        }
    }

    impl EngineFactory for FlakyEngineFactory {
        fn create(&self) -> PulseResult<Arc<dyn FeedbackEngine>> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(PulseError::engine_creation("driver unavailable"));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(CountingEngine::default()))
        }
    }

    fn pool_with(factory: FlakyEngineFactory) -> (ResourcePool, Arc<CountingEmitterFactory>) {
        let emitters = Arc::new(CountingEmitterFactory::default());
        let pool = ResourcePool::new(
            Arc::clone(&emitters) as Arc<dyn EmitterFactory>,
            Arc::new(factory),
        );
        (pool, emitters)
    }

    #[test]
    fn same_style_reuses_the_same_handle() {
        let (pool, factory) = pool_with(FlakyEngineFactory::new(0));

        let a = pool.emitter(EmitterStyle::Impact(ImpactLevel::Medium)).unwrap();
        let b = pool.emitter(EmitterStyle::Impact(ImpactLevel::Medium)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_styles_get_distinct_handles() {
        let (pool, factory) = pool_with(FlakyEngineFactory::new(0));

        let a = pool.emitter(EmitterStyle::Impact(ImpactLevel::Light)).unwrap();
        let b = pool.emitter(EmitterStyle::Impact(ImpactLevel::Heavy)).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
        assert_eq!(pool.emitter_count(), 2);
    }

    #[test]
    fn concurrent_first_use_creates_one_emitter() {
        let emitters = Arc::new(CountingEmitterFactory::default());
        let pool = Arc::new(ResourcePool::new(
            Arc::clone(&emitters) as Arc<dyn EmitterFactory>,
            Arc::new(FlakyEngineFactory::new(0)),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || {
                pool.emitter(EmitterStyle::Impact(ImpactLevel::Soft)).unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(emitters.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_engine_creation_is_not_cached() {
        let (pool, _) = pool_with(FlakyEngineFactory::new(1));

        assert!(matches!(
            pool.shared_engine(),
            Err(PulseError::EngineCreation { .. })
        ));

        // The broken attempt left no handle behind; the retry succeeds.
        let engine = pool.shared_engine().unwrap();
        let again = pool.shared_engine().unwrap();
        assert!(Arc::ptr_eq(&engine, &again));
    }

    #[test]
    fn ensure_started_restarts_before_each_use() {
        let emitters = Arc::new(CountingEmitterFactory::default());
        let engine = Arc::new(CountingEngine::default());

        struct FixedEngineFactory(Arc<CountingEngine>);
        impl EngineFactory for FixedEngineFactory {
            fn create(&self) -> PulseResult<Arc<dyn FeedbackEngine>> {
                Ok(Arc::clone(&self.0) as Arc<dyn FeedbackEngine>)
            }
        }

        let pool = ResourcePool::new(
            emitters as Arc<dyn EmitterFactory>,
            Arc::new(FixedEngineFactory(Arc::clone(&engine))),
        );

        pool.ensure_started().unwrap();
        pool.ensure_started().unwrap();
        pool.ensure_started().unwrap();
        assert_eq!(engine.starts.load(Ordering::SeqCst), 3);
    }
}
