//! # pulsekit - Triggered Feedback Dispatch
//!
//! pulsekit lets a host application attach short-lived feedback effects
//! (tactile pulses) to observed value changes or direct user actions, while
//! centrally gating whether effects actually fire based on device capability
//! and a runtime-configurable enable flag, and while emitting throttled
//! diagnostic records describing the gating decisions.
//!
//! ## Core Concepts
//!
//! - **EffectRequest**: a resolved description of a feedback effect (impact
//!   level, notification kind, or custom handle)
//! - **Gate**: the capability x enabled check that must pass before any
//!   effect is performed
//! - **Trigger**: an observed value whose changes drive evaluation of
//!   whether/what to dispatch
//! - **Pooled emitter**: a reusable handle for one effect style, created
//!   once and retained
//! - **Shared engine**: a single process-lifetime resource behind custom
//!   effects, lazily created and idempotently (re)started before use
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pulsekit::{
//!     EffectRequest, FeedbackConfig, FeedbackContext, ImpactLevel, LogMode,
//!     MemorySettingsStore, TriggerBehavior,
//! };
//!
//! let context = FeedbackContext::new(
//!     FeedbackConfig::default(),
//!     Arc::new(MemorySettingsStore::new()),
//!     &probe,           // host CapabilityProbe
//!     emitter_factory,  // host EmitterFactory
//!     engine_factory,   // host EngineFactory
//! );
//!
//! // Fire a medium impact whenever the observed flag flips.
//! let trigger = context.trigger(
//!     TriggerBehavior::Fixed(EffectRequest::Impact(ImpactLevel::Medium)),
//!     LogMode::Smart,
//! );
//! trigger.observe(false); // seeds, nothing fires
//! trigger.observe(true);  // fires
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod context;
pub mod dispatch;
pub mod effect;
pub mod error;
pub mod pool;
pub mod reporter;
pub mod settings;
pub mod trigger;

// Re-export primary types at crate root for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{FeedbackConfig, FeedbackContext};
pub use dispatch::{DispatchOutcome, Dispatcher, GateReason, UiExecutor};
pub use effect::{CustomEffect, EffectRequest, EmitterStyle, ImpactLevel, NotificationKind};
pub use error::{PulseError, PulseResult};
pub use pool::{EffectEmitter, EmitterFactory, EngineFactory, FeedbackEngine, ResourcePool};
pub use reporter::{
    DiagnosticContext, DiagnosticRecord, DiagnosticReporter, DiagnosticSink, LogMode,
    ReportOutcome, TracingSink,
};
pub use settings::{
    CapabilityProbe, ChangeCallback, MemorySettingsStore, ObserverId, SettingsCache, SettingsKey,
    SettingsSnapshot, SettingsStore,
};
pub use trigger::{
    TapTrigger, TriggerBehavior, TriggerCondition, TriggerEvaluator, TriggerOutcome,
    TriggerResolver, TriggerState,
};
