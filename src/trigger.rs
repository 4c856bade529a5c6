//! Trigger evaluation over observed value transitions.
//!
//! An evaluator watches an external value stream and decides, from each
//! old/new pair, whether and what to dispatch. The first observation only
//! seeds state; dispatch happens strictly on value transitions by equality,
//! never on re-observation of an equal value.

use std::sync::{Arc, Mutex, PoisonError};

use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::effect::EffectRequest;
use crate::reporter::LogMode;

/// Transition memory for an observed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerState<T> {
    /// Value before the most recent change; `None` until the first change.
    pub previous: Option<T>,
    /// Most recently observed value.
    pub current: T,
}

/// Predicate forms accepted by conditional triggers.
///
/// Stored and invoked as ordinary first-class function values; evaluation
/// happens exactly once per observed change.
pub enum TriggerCondition<T> {
    /// Evaluated over (previous, current).
    Transition(Box<dyn Fn(&T, &T) -> bool + Send + Sync>),
    /// Evaluated over the new value alone.
    Current(Box<dyn Fn(&T) -> bool + Send + Sync>),
    /// Evaluated with no arguments, for conditions on outside state.
    External(Box<dyn Fn() -> bool + Send + Sync>),
}

impl<T> TriggerCondition<T> {
    /// Condition over the (previous, current) pair.
    pub fn transition(f: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
        Self::Transition(Box::new(f))
    }

    /// Condition over the new value alone.
    pub fn current(f: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self::Current(Box::new(f))
    }

    /// Zero-argument condition.
    pub fn external(f: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self::External(Box::new(f))
    }

    fn holds(&self, previous: &T, current: &T) -> bool {
        match self {
            Self::Transition(f) => f(previous, current),
            Self::Current(f) => f(current),
            Self::External(f) => f(),
        }
    }
}

/// Resolver forms accepted by dynamic triggers.
///
/// `None` means no effect fires for the change; `Some(request)` dispatches
/// that specific request, so different transitions of one value type can
/// produce different effect kinds.
pub enum TriggerResolver<T> {
    /// Resolved from the (previous, current) pair.
    Transition(Box<dyn Fn(&T, &T) -> Option<EffectRequest> + Send + Sync>),
    /// Resolved from the new value alone.
    Current(Box<dyn Fn(&T) -> Option<EffectRequest> + Send + Sync>),
    /// Resolved with no arguments.
    External(Box<dyn Fn() -> Option<EffectRequest> + Send + Sync>),
}

impl<T> TriggerResolver<T> {
    /// Resolver over the (previous, current) pair.
    pub fn transition(
        f: impl Fn(&T, &T) -> Option<EffectRequest> + Send + Sync + 'static,
    ) -> Self {
        Self::Transition(Box::new(f))
    }

    /// Resolver over the new value alone.
    pub fn current(f: impl Fn(&T) -> Option<EffectRequest> + Send + Sync + 'static) -> Self {
        Self::Current(Box::new(f))
    }

    /// Zero-argument resolver.
    pub fn external(f: impl Fn() -> Option<EffectRequest> + Send + Sync + 'static) -> Self {
        Self::External(Box::new(f))
    }

    fn resolve(&self, previous: &T, current: &T) -> Option<EffectRequest> {
        match self {
            Self::Transition(f) => f(previous, current),
            Self::Current(f) => f(current),
            Self::External(f) => f(),
        }
    }
}

/// What a trigger does when its observed value changes.
pub enum TriggerBehavior<T> {
    /// Dispatch a fixed request on every change.
    Fixed(EffectRequest),
    /// Dispatch a fixed request when the condition holds.
    Conditional {
        /// Request to dispatch.
        request: EffectRequest,
        /// Predicate gating the dispatch.
        condition: TriggerCondition<T>,
    },
    /// Map each transition to an optional request.
    Dynamic(TriggerResolver<T>),
}

/// Outcome of a single observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// First observation; state seeded, nothing fired.
    Seeded,
    /// Value equal to the current one; nothing fired.
    Unchanged,
    /// The value changed but the condition or resolver declined to fire.
    Withheld,
    /// A request was forwarded to the dispatcher.
    Fired(DispatchOutcome),
}

/// Observes a value stream and forwards resolved effects to the dispatcher.
///
/// Safe to call from concurrent contexts; observations are serialized by an
/// internal mutex so `previous` is updated exactly once per change.
pub struct TriggerEvaluator<T> {
    dispatcher: Arc<Dispatcher>,
    behavior: TriggerBehavior<T>,
    mode: LogMode,
    state: Mutex<Option<TriggerState<T>>>,
}

impl<T: PartialEq> TriggerEvaluator<T> {
    /// Build an evaluator with the given behavior and logging mode.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, behavior: TriggerBehavior<T>, mode: LogMode) -> Self {
        Self {
            dispatcher,
            behavior,
            mode,
            state: Mutex::new(None),
        }
    }

    /// Feed one observed value.
    ///
    /// The first value seeds state without firing. Later values fire only
    /// when they differ from the current one by equality, routed through
    /// the behavior.
    pub fn observe(&self, value: T) -> TriggerOutcome {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(state) = guard.as_mut() else {
            *guard = Some(TriggerState {
                previous: None,
                current: value,
            });
            return TriggerOutcome::Seeded;
        };

        if state.current == value {
            return TriggerOutcome::Unchanged;
        }

        let old = std::mem::replace(&mut state.current, value);
        let request = match &self.behavior {
            TriggerBehavior::Fixed(request) => Some(request.clone()),
            TriggerBehavior::Conditional { request, condition } => {
                if condition.holds(&old, &state.current) {
                    Some(request.clone())
                } else {
                    None
                }
            }
            TriggerBehavior::Dynamic(resolver) => resolver.resolve(&old, &state.current),
        };
        state.previous = Some(old);
        drop(guard);

        match request {
            None => TriggerOutcome::Withheld,
            Some(request) => TriggerOutcome::Fired(self.dispatcher.dispatch(request, self.mode)),
        }
    }

    /// The current transition state, if any value has been observed.
    pub fn state(&self) -> Option<TriggerState<T>>
    where
        T: Clone,
    {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<T> std::fmt::Debug for TriggerEvaluator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerEvaluator")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Stateless tap-driven trigger: dispatches a fixed request on every
/// invocation, with no old/new comparison at all.
pub struct TapTrigger {
    dispatcher: Arc<Dispatcher>,
    request: EffectRequest,
    mode: LogMode,
}

impl TapTrigger {
    /// Build a tap trigger for a fixed request.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, request: EffectRequest, mode: LogMode) -> Self {
        Self {
            dispatcher,
            request,
            mode,
        }
    }

    /// Dispatch the fixed request once.
    pub fn tap(&self) -> DispatchOutcome {
        self.dispatcher.dispatch(self.request.clone(), self.mode)
    }
}

impl std::fmt::Debug for TapTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TapTrigger")
            .field("request", &self.request)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
