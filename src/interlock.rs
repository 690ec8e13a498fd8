//! Error-sensor interlocks.
//!
//! An interlock is a sensor-backed safety condition with a run budget.
//! While a step runs, every error sensor it lists is checked against the
//! snapshot; a triggered sensor consumes one unit of its budget per step
//! run. A sensor whose budget is already spent converts the trigger into
//! a hard failure that no policy flag can waive.
//!
//! Budgets only ever shrink. Refilling a reservoir does not restore the
//! count; an operator acknowledges the fix by restarting the process
//! with fresh configuration.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

use crate::config::ErrorSensorDef;
use crate::snapshot::Readings;

/// Which physical reading counts as a trigger for an error sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerWhen {
    Submerged,
    Exposed,
}

impl TriggerWhen {
    fn matches(self, submerged: bool) -> bool {
        match self {
            Self::Submerged => submerged,
            Self::Exposed => !submerged,
        }
    }
}

/// One triggered sensor observed during a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterlockEvent {
    pub sensor: String,
    /// Budget left after this run's decrement (0 = next trigger is hard).
    pub remaining: u32,
}

impl std::fmt::Display for InterlockEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} triggered ({} runs remaining)", self.sensor, self.remaining)
    }
}

/// Aggregate verdict for one poll of a step's error checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    /// Triggered within budget: countable, policy-governed.
    SoftFail(Vec<InterlockEvent>),
    /// At least one sensor's budget was already exhausted. Never
    /// waivable, regardless of step flags.
    HardFail(Vec<InterlockEvent>),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

#[derive(Debug, Clone)]
struct SensorState {
    trigger_when: TriggerWhen,
    remaining: u32,
}

/// Tracks every error sensor's trigger polarity and remaining budget.
#[derive(Debug, Clone)]
pub struct InterlockTracker {
    sensors: BTreeMap<String, SensorState>,
    /// Sensors already charged during the current step run.
    charged_this_run: HashSet<String>,
}

impl InterlockTracker {
    pub fn from_config(defs: &[ErrorSensorDef]) -> Self {
        let sensors = defs
            .iter()
            .map(|d| {
                (
                    d.name.clone(),
                    SensorState {
                        trigger_when: d.trigger_when,
                        remaining: d.permitted_runs,
                    },
                )
            })
            .collect();
        Self {
            sensors,
            charged_this_run: HashSet::new(),
        }
    }

    /// Reset per-run decrement memory. Call once before each step run.
    pub fn begin_run(&mut self) {
        self.charged_this_run.clear();
    }

    /// Check the named sensors against the snapshot.
    ///
    /// A triggered sensor is charged at most once per step run; a sensor
    /// that was already out of budget *before* this run reports hard.
    pub fn check(&mut self, checks: &[String], readings: &Readings) -> Verdict {
        let mut soft = Vec::new();
        let mut hard = Vec::new();

        for name in checks {
            let Some(state) = self.sensors.get_mut(name) else {
                warn!("interlock: unknown error sensor '{name}' in check list");
                continue;
            };
            if !state.trigger_when.matches(readings.is_submerged(name)) {
                continue;
            }
            if self.charged_this_run.contains(name) {
                // Already charged for this run; still a soft report.
                soft.push(InterlockEvent {
                    sensor: name.clone(),
                    remaining: state.remaining,
                });
            } else if state.remaining == 0 {
                hard.push(InterlockEvent {
                    sensor: name.clone(),
                    remaining: 0,
                });
            } else {
                state.remaining -= 1;
                self.charged_this_run.insert(name.clone());
                soft.push(InterlockEvent {
                    sensor: name.clone(),
                    remaining: state.remaining,
                });
            }
        }

        if !hard.is_empty() {
            hard.extend(soft);
            Verdict::HardFail(hard)
        } else if !soft.is_empty() {
            Verdict::SoftFail(soft)
        } else {
            Verdict::Pass
        }
    }

    /// Remaining budget for a sensor (used as a sample covariate and in
    /// status replies).
    pub fn remaining(&self, sensor: &str) -> Option<u32> {
        self.sensors.get(sensor).map(|s| s.remaining)
    }

    pub fn budgets(&self) -> impl Iterator<Item = (&str, u32)> {
        self.sensors.iter().map(|(n, s)| (n.as_str(), s.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(permitted: u32) -> InterlockTracker {
        InterlockTracker::from_config(&[ErrorSensorDef {
            name: "RODI Low".into(),
            pin: 17,
            trigger_when: TriggerWhen::Exposed,
            permitted_runs: permitted,
        }])
    }

    fn exposed() -> Readings {
        let mut r = Readings::new();
        r.set("RODI Low", false);
        r
    }

    fn submerged() -> Readings {
        let mut r = Readings::new();
        r.set("RODI Low", true);
        r
    }

    fn checks() -> Vec<String> {
        vec!["RODI Low".into()]
    }

    #[test]
    fn untriggered_sensor_passes() {
        let mut t = tracker(2);
        t.begin_run();
        assert_eq!(t.check(&checks(), &submerged()), Verdict::Pass);
        assert_eq!(t.remaining("RODI Low"), Some(2));
    }

    #[test]
    fn trigger_decrements_once_per_run() {
        let mut t = tracker(2);
        t.begin_run();
        // Three polls within one run charge the budget exactly once.
        for _ in 0..3 {
            match t.check(&checks(), &exposed()) {
                Verdict::SoftFail(ev) => assert_eq!(ev[0].remaining, 1),
                other => panic!("expected soft fail, got {other:?}"),
            }
        }
        assert_eq!(t.remaining("RODI Low"), Some(1));
    }

    #[test]
    fn budget_exhaustion_becomes_hard() {
        let mut t = tracker(2);
        for expected_remaining in [1, 0] {
            t.begin_run();
            match t.check(&checks(), &exposed()) {
                Verdict::SoftFail(ev) => assert_eq!(ev[0].remaining, expected_remaining),
                other => panic!("expected soft fail, got {other:?}"),
            }
        }
        // Third run: budget was already zero before the run started.
        t.begin_run();
        match t.check(&checks(), &exposed()) {
            Verdict::HardFail(ev) => assert_eq!(ev[0].remaining, 0),
            other => panic!("expected hard fail, got {other:?}"),
        }
        // Budget never goes negative.
        assert_eq!(t.remaining("RODI Low"), Some(0));
    }

    #[test]
    fn hard_outranks_soft_in_aggregate() {
        let mut t = InterlockTracker::from_config(&[
            ErrorSensorDef {
                name: "a".into(),
                pin: 5,
                trigger_when: TriggerWhen::Exposed,
                permitted_runs: 0,
            },
            ErrorSensorDef {
                name: "b".into(),
                pin: 6,
                trigger_when: TriggerWhen::Exposed,
                permitted_runs: 5,
            },
        ]);
        t.begin_run();
        let mut r = Readings::new();
        r.set("a", false);
        r.set("b", false);
        match t.check(&["a".into(), "b".into()], &r) {
            Verdict::HardFail(ev) => assert_eq!(ev.len(), 2),
            other => panic!("expected hard fail, got {other:?}"),
        }
    }

    #[test]
    fn untracked_budget_does_not_refill() {
        let mut t = tracker(3);
        t.begin_run();
        let _ = t.check(&checks(), &exposed());
        // Sensor goes back to its normal reading...
        t.begin_run();
        assert_eq!(t.check(&checks(), &submerged()), Verdict::Pass);
        // ...but the spent unit stays spent.
        assert_eq!(t.remaining("RODI Low"), Some(2));
    }
}
