//! Effect request types.
//!
//! An [`EffectRequest`] is a resolved description of a short-lived feedback
//! effect: a fixed-intensity impact, an outcome notification, or a
//! host-supplied custom effect played through the shared engine. Requests are
//! immutable once constructed and cheap to clone.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PulseResult;
use crate::pool::ResourcePool;

/// Intensity of an impact effect.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    Light,
    Medium,
    Heavy,
    Soft,
    Rigid,
}

/// Outcome class of a notification effect.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Warning,
    Error,
}

/// Discriminator for pooled emitter handles.
///
/// The key space is finite (one entry per impact level plus one per
/// notification kind), which is what makes a never-evicted pool sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitterStyle {
    /// Impact emitter bound to one intensity.
    Impact(ImpactLevel),
    /// Notification emitter bound to one outcome kind.
    Notification(NotificationKind),
}

/// A composite or scripted effect supplied by the host.
///
/// Implementations may acquire the shared engine from the pool; they must
/// call [`ResourcePool::ensure_started`] before using it, because the
/// environment can silently stop the engine between uses.
pub trait CustomEffect: Send + Sync {
    /// Play the effect once.
    ///
    /// # Errors
    ///
    /// Returns an error if playback could not be initiated; the dispatcher
    /// reports it and never propagates it to the original caller.
    fn play(&self, pool: &ResourcePool) -> PulseResult<()>;
}

/// A resolved feedback effect to perform.
#[derive(Clone)]
pub enum EffectRequest {
    /// Fixed-intensity impact pulse.
    Impact(ImpactLevel),
    /// Outcome notification pattern.
    Notification(NotificationKind),
    /// Host-supplied custom effect.
    Custom(Arc<dyn CustomEffect>),
}

impl EffectRequest {
    /// The pooled-emitter style for this request, if it uses a pooled
    /// emitter. Custom effects bypass the emitter pool.
    #[must_use]
    pub fn emitter_style(&self) -> Option<EmitterStyle> {
        match self {
            Self::Impact(level) => Some(EmitterStyle::Impact(*level)),
            Self::Notification(kind) => Some(EmitterStyle::Notification(*kind)),
            Self::Custom(_) => None,
        }
    }
}

impl fmt::Debug for EffectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Impact(level) => f.debug_tuple("Impact").field(level).finish(),
            Self::Notification(kind) => f.debug_tuple("Notification").field(kind).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl PartialEq for EffectRequest {
    /// Custom effects compare by handle identity; the other variants by
    /// value.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Impact(a), Self::Impact(b)) => a == b,
            (Self::Notification(a), Self::Notification(b)) => a == b,
            (Self::Custom(a), Self::Custom(b)) => {
                // Compare data pointers only; vtable pointers are not stable
                // across codegen units.
                std::ptr::eq(Arc::as_ptr(a).cast::<u8>(), Arc::as_ptr(b).cast::<u8>())
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopEffect;

    impl CustomEffect for NoopEffect {
        fn play(&self, _pool: &ResourcePool) -> PulseResult<()> {
            Ok(())
        }
    }

    #[test]
    fn pooled_variants_map_to_styles() {
        assert_eq!(
            EffectRequest::Impact(ImpactLevel::Medium).emitter_style(),
            Some(EmitterStyle::Impact(ImpactLevel::Medium))
        );
        assert_eq!(
            EffectRequest::Notification(NotificationKind::Error).emitter_style(),
            Some(EmitterStyle::Notification(NotificationKind::Error))
        );

        let custom = EffectRequest::Custom(Arc::new(NoopEffect));
        assert_eq!(custom.emitter_style(), None);
    }

    #[test]
    fn equality_by_value_for_pooled_variants() {
        assert_eq!(
            EffectRequest::Impact(ImpactLevel::Heavy),
            EffectRequest::Impact(ImpactLevel::Heavy)
        );
        assert_ne!(
            EffectRequest::Impact(ImpactLevel::Heavy),
            EffectRequest::Impact(ImpactLevel::Soft)
        );
        assert_ne!(
            EffectRequest::Impact(ImpactLevel::Heavy),
            EffectRequest::Notification(NotificationKind::Success)
        );
    }

    #[test]
    fn equality_by_identity_for_custom_effects() {
        let effect: Arc<dyn CustomEffect> = Arc::new(NoopEffect);
        let a = EffectRequest::Custom(Arc::clone(&effect));
        let b = EffectRequest::Custom(effect);
        assert_eq!(a, b);

        let other = EffectRequest::Custom(Arc::new(NoopEffect));
        assert_ne!(a, other);
    }
}
