//! Unified error types for the controller.
//!
//! Two categories matter here and they propagate very differently.
//! [`ConfigError`] is fatal at startup: an invalid configuration cannot
//! define a sound state machine, so the process refuses to start.
//! [`CommandError`] is surfaced back to whoever sent the command and is
//! never fatal. Step-level conditions (invalid start, timeout, interlock
//! trips) are *outcomes*, not errors; they are resolved locally by the
//! step executor according to the step's policy flags and only reach the
//! controller as a [`FailureKind`] label on a notification.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Configuration errors (fatal at startup)
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    #[error("step '{step}' references unknown pump '{pump}'")]
    UnknownPump { step: String, pump: String },

    #[error("step '{step}' references unknown error check '{check}'")]
    UnknownErrorCheck { step: String, check: String },

    #[error("step '{step}' references tank state '{state}' that no tank sensor produces")]
    UnknownTankState { step: String, state: String },

    #[error("step '{step}' must set exactly one of max_runtime / initial_max_runtime")]
    AmbiguousRuntimeBound { step: String },

    #[error("step '{step}' has a non-positive runtime bound ({value})")]
    NonPositiveRuntime { step: String, value: f64 },

    #[error("routine '{routine}' sets interval without unit (or unit without interval)")]
    PartialSchedule { routine: String },

    #[error("routine '{routine}' has no steps")]
    EmptyRoutine { routine: String },

    #[error("confidence level must be in (0, 1), got {0}")]
    BadConfidence(f64),

    #[error("environment variable {0} is not set (referenced by config)")]
    MissingEnv(String),
}

// ---------------------------------------------------------------------------
// Remote command errors (replied to the sender, non-fatal)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown routine '{0}'")]
    UnknownRoutine(String),

    #[error("routine '{0}' is paused; resume it first")]
    Paused(String),

    #[error("routine '{0}' is not paused")]
    NotPaused(String),

    #[error("routine '{0}' has no pending run to cancel")]
    NothingPending(String),
}

// ---------------------------------------------------------------------------
// Failure kinds (notification labels)
// ---------------------------------------------------------------------------

/// Classification carried in the subject line of every failure
/// notification so a recipient can triage without device access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    AmbiguousTankState,
    InvalidStepStart,
    StepTimeout,
    InterlockSoftFail,
    InterlockHardFail,
    CriticalRoutineFailure,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AmbiguousTankState => write!(f, "Ambiguous Tank State"),
            Self::InvalidStepStart => write!(f, "Invalid Step Start"),
            Self::StepTimeout => write!(f, "Step Timeout"),
            Self::InterlockSoftFail => write!(f, "Interlock Triggered"),
            Self::InterlockHardFail => write!(f, "Interlock Exhausted"),
            Self::CriticalRoutineFailure => write!(f, "Critical Routine Failure"),
        }
    }
}
