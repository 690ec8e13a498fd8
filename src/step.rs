//! Step data model.
//!
//! A step is a single pump-driven transition between tank states: run
//! `pump` until the tank leaves one of `start_states` and reaches one of
//! `end_states`, watching the listed error sensors along the way. Policy
//! flags decide whether each failure mode is survivable for the routine.

/// How a failure mode resolves for the parent routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepFlags {
    /// Notify error contacts when the entry state does not match.
    pub report_invalid_start: bool,
    /// Continue to the next step (without pumping) on a bad entry state.
    pub proceed_on_invalid_start: bool,
    /// Continue past a runtime-bound timeout.
    pub proceed_on_timeout: bool,
    /// Continue past an in-budget interlock trigger.
    pub proceed_on_error: bool,
    /// A critical outcome always halts the routine's remaining steps for
    /// this cycle; this flag decides whether the halt is escalated as a
    /// critical-failure alert to the error contacts. The next scheduled
    /// run is computed normally either way.
    pub cancel_on_critical_failure: bool,
}

impl Default for StepFlags {
    fn default() -> Self {
        Self {
            report_invalid_start: true,
            proceed_on_invalid_start: false,
            proceed_on_timeout: false,
            proceed_on_error: false,
            cancel_on_critical_failure: true,
        }
    }
}

/// How long a step may run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuntimeBound {
    /// Operator-fixed ceiling in seconds; the estimator is bypassed.
    Fixed(f64),
    /// Seed ceiling used until enough run history accumulates for a
    /// statistical bound.
    Adaptive { initial_max: f64 },
}

impl RuntimeBound {
    /// The configured ceiling before any history is consulted.
    pub fn seed_secs(&self) -> f64 {
        match self {
            Self::Fixed(secs) | Self::Adaptive { initial_max: secs } => *secs,
        }
    }
}

/// One pump-driven transition within a routine.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub name: String,
    pub pump: String,
    /// Tank states accepted as a valid entry.
    pub start_states: Vec<String>,
    /// Tank states that signal success.
    pub end_states: Vec<String>,
    /// Error sensors checked while the pump runs.
    pub error_checks: Vec<String>,
    pub flags: StepFlags,
    pub bound: RuntimeBound,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} -> {})",
            self.name,
            self.start_states.join("|"),
            self.end_states.join("|"),
        )
    }
}
