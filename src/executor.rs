//! Step execution.
//!
//! One step run: verify the entry state, switch the pump on, poll the
//! sensors until an exit condition fires, switch the pump off. Exit
//! conditions, strongest first: a satisfied end state, an interlock
//! verdict, the runtime ceiling. The pump is switched off on every exit
//! path before the report is built.
//!
//! The executor owns no policy. It reports what happened and whether the
//! step's own flags permit the routine to continue; the controller
//! decides notifications and scheduling.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::estimator::{RuntimeEstimator, RuntimeSample};
use crate::error::FailureKind;
use crate::interlock::{InterlockEvent, InterlockTracker, Verdict};
use crate::ports::{ActuatorPort, Clock, SensorPort};
use crate::snapshot::Readings;
use crate::step::{RuntimeBound, Step};
use crate::tank::{Resolution, TankStateResolver};

/// How a single step run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Completed {
        elapsed_secs: f64,
    },
    /// The runtime ceiling elapsed before any end state was reached.
    TimedOut {
        elapsed_secs: f64,
        bound_secs: f64,
    },
    /// An error sensor triggered. `hard` means the sensor's budget was
    /// already spent and no policy flag can waive the failure.
    InterlockFailed {
        elapsed_secs: f64,
        events: Vec<InterlockEvent>,
        hard: bool,
    },
    /// The tank was not in an accepted entry state. The pump never ran.
    InvalidStart {
        observed: Resolution,
    },
}

impl StepOutcome {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Completed { .. } => None,
            Self::TimedOut { .. } => Some(FailureKind::StepTimeout),
            Self::InterlockFailed { hard: true, .. } => Some(FailureKind::InterlockHardFail),
            Self::InterlockFailed { hard: false, .. } => Some(FailureKind::InterlockSoftFail),
            Self::InvalidStart { .. } => Some(FailureKind::InvalidStepStart),
        }
    }
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed { elapsed_secs } => write!(f, "completed in {elapsed_secs:.1}s"),
            Self::TimedOut { elapsed_secs, bound_secs } => {
                write!(f, "timed out after {elapsed_secs:.1}s (limit {bound_secs:.1}s)")
            }
            Self::InterlockFailed { events, hard, .. } => {
                let kind = if *hard { "hard" } else { "soft" };
                let list: Vec<String> = events.iter().map(ToString::to_string).collect();
                write!(f, "{kind} interlock failure: {}", list.join("; "))
            }
            Self::InvalidStart { observed } => {
                write!(f, "invalid start state: tank reads {observed}")
            }
        }
    }
}

/// What one step run produced, plus the policy verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub step: String,
    pub outcome: StepOutcome,
    /// Whether the step's flags allow the routine to continue. Always
    /// `true` for completion, always `false` for hard failures.
    pub proceed: bool,
}

/// Runs one step against the ports it is handed.
#[derive(Debug, Clone, Copy)]
pub struct StepExecutor {
    /// Debounce delay between sensor polls.
    bounce: Duration,
}

impl StepExecutor {
    pub fn new(bounce: Duration) -> Self {
        Self { bounce }
    }

    /// Execute `step` to completion or failure.
    ///
    /// The runtime ceiling is resolved once, before the pump starts;
    /// the estimator is never consulted mid-run. The pump is off when
    /// this returns, whatever the outcome.
    pub fn run<S, A, C>(
        &self,
        routine: &str,
        step: &Step,
        resolver: &TankStateResolver,
        interlock: &mut InterlockTracker,
        estimator: &mut RuntimeEstimator,
        sensors: &mut S,
        actuators: &mut A,
        clock: &C,
    ) -> StepReport
    where
        S: SensorPort,
        A: ActuatorPort,
        C: Clock,
    {
        let entry = sensors.read_all();
        let resolution = resolver.resolve(&entry);
        let valid_entry = resolution
            .state()
            .is_some_and(|s| step.start_states.iter().any(|accepted| accepted == s));
        if !valid_entry {
            info!("step '{}': skipped, {}", step.name, resolution);
            return StepReport {
                step: step.name.clone(),
                outcome: StepOutcome::InvalidStart { observed: resolution },
                proceed: step.flags.proceed_on_invalid_start,
            };
        }

        let (bound_secs, advisory_floor) = match step.bound {
            RuntimeBound::Fixed(secs) => (secs, None),
            RuntimeBound::Adaptive { .. } => {
                let est = estimator.estimate(routine, step, clock.now());
                debug!(
                    "step '{}': ceiling {:.1}s ({:?}, {} samples)",
                    step.name, est.upper, est.method, est.samples
                );
                (est.upper, est.lower)
            }
        };

        interlock.begin_run();
        let started = clock.now();
        info!("step '{}': pump '{}' on, limit {bound_secs:.1}s", step.name, step.pump);
        actuators.pump_on(&step.pump);

        let (outcome, proceed) = loop {
            let snapshot = sensors.read_all();

            if self.end_state_reached(step, resolver, &snapshot) {
                let elapsed_secs = secs_since(started, clock.now());
                break (StepOutcome::Completed { elapsed_secs }, true);
            }

            match interlock.check(&step.error_checks, &snapshot) {
                Verdict::Pass => {}
                Verdict::SoftFail(events) => {
                    let elapsed_secs = secs_since(started, clock.now());
                    break (
                        StepOutcome::InterlockFailed { elapsed_secs, events, hard: false },
                        step.flags.proceed_on_error,
                    );
                }
                Verdict::HardFail(events) => {
                    let elapsed_secs = secs_since(started, clock.now());
                    break (
                        StepOutcome::InterlockFailed { elapsed_secs, events, hard: true },
                        false,
                    );
                }
            }

            let elapsed_secs = secs_since(started, clock.now());
            if elapsed_secs >= bound_secs {
                break (
                    StepOutcome::TimedOut { elapsed_secs, bound_secs },
                    step.flags.proceed_on_timeout,
                );
            }

            clock.sleep(self.bounce);
        };

        actuators.pump_off(&step.pump);
        info!("step '{}': pump '{}' off, {}", step.name, step.pump, outcome);

        if let StepOutcome::Completed { elapsed_secs } = &outcome {
            let elapsed_secs = *elapsed_secs;
            if let Some(floor) = advisory_floor {
                if elapsed_secs < floor {
                    warn!(
                        "step '{}': finished in {elapsed_secs:.1}s, below the expected \
                         minimum of {floor:.1}s; check for a stuck or misread sensor",
                        step.name
                    );
                }
            }
            if matches!(step.bound, RuntimeBound::Adaptive { .. }) {
                let covariates = step
                    .error_checks
                    .iter()
                    .filter_map(|name| {
                        interlock.remaining(name).map(|r| (name.clone(), f64::from(r)))
                    })
                    .collect();
                estimator.record(
                    routine,
                    &step.name,
                    RuntimeSample { elapsed_secs, at: started, covariates },
                );
            }
        }

        StepReport { step: step.name.clone(), outcome, proceed }
    }

    fn end_state_reached(
        &self,
        step: &Step,
        resolver: &TankStateResolver,
        snapshot: &Readings,
    ) -> bool {
        resolver
            .resolve(snapshot)
            .state()
            .is_some_and(|s| step.end_states.iter().any(|wanted| wanted == s))
    }
}

fn secs_since(
    started: chrono::DateTime<chrono::Utc>,
    now: chrono::DateTime<chrono::Utc>,
) -> f64 {
    (now - started).num_milliseconds() as f64 / 1000.0
}
