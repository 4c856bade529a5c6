//! Error types for pulsekit.
//!
//! All errors are strongly typed using thiserror. Gate outcomes (device not
//! capable, feedback disabled) are deliberately *not* errors: they are
//! expected steady-state conditions surfaced as [`DispatchOutcome::Gated`]
//! values instead.
//!
//! [`DispatchOutcome::Gated`]: crate::dispatch::DispatchOutcome::Gated

use thiserror::Error;

/// Failures in the feedback resource layer.
///
/// Every variant here is caught at the point of use, reported through the
/// diagnostic reporter, and never propagated back through a dispatch call.
/// The worst outcome of any failure is "no effect played".
#[derive(Debug, Error)]
pub enum PulseError {
    /// The shared feedback engine could not be constructed.
    #[error("feedback engine creation failed: {reason}")]
    EngineCreation {
        /// Driver or hardware description of the failure.
        reason: String,
    },

    /// The shared feedback engine could not be (re)started.
    #[error("feedback engine start failed: {reason}")]
    EngineStart {
        /// Driver or hardware description of the failure.
        reason: String,
    },

    /// A custom effect failed during playback.
    #[error("custom effect playback failed: {reason}")]
    CustomEffect {
        /// Description supplied by the effect implementation.
        reason: String,
    },

    /// Internal invariant violation (e.g. a poisoned lock).
    #[error("internal error: {message}")]
    Internal {
        /// What went wrong.
        message: String,
    },
}

impl PulseError {
    /// Construct an engine-creation failure.
    pub fn engine_creation(reason: impl Into<String>) -> Self {
        Self::EngineCreation {
            reason: reason.into(),
        }
    }

    /// Construct an engine-start failure.
    pub fn engine_start(reason: impl Into<String>) -> Self {
        Self::EngineStart {
            reason: reason.into(),
        }
    }

    /// Construct a custom-effect playback failure.
    pub fn custom_effect(reason: impl Into<String>) -> Self {
        Self::CustomEffect {
            reason: reason.into(),
        }
    }

    /// Construct an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Convenience result alias used throughout the crate.
pub type PulseResult<T> = Result<T, PulseError>;
