//! Tank state resolution.
//!
//! Each named tank state is defined by the set of level sensors that must
//! read submerged and the set that must read exposed. A state is
//! *satisfied* when every one of its conditions holds against the current
//! snapshot. Exactly one satisfied state is the resolved state; zero or
//! more than one collapses to [`Resolution::Ambiguous`], which callers
//! must treat as a halting condition: it means a sensor fault or a
//! physically unreachable configuration, and acting on it would pump
//! water based on a guess.

use std::collections::BTreeMap;

use crate::config::TankSensorDef;
use crate::snapshot::Readings;

/// Outcome of resolving a readings snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one configured state is satisfied.
    State(String),
    /// Zero or several states satisfied simultaneously. `satisfied`
    /// lists the conflicting states (empty when none matched).
    Ambiguous { satisfied: Vec<String> },
}

impl Resolution {
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous { .. })
    }

    /// The resolved state name, if unambiguous.
    pub fn state(&self) -> Option<&str> {
        match self {
            Self::State(s) => Some(s),
            Self::Ambiguous { .. } => None,
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::State(s) => write!(f, "{s}"),
            Self::Ambiguous { satisfied } if satisfied.is_empty() => {
                write!(f, "ambiguous (no state matches)")
            }
            Self::Ambiguous { satisfied } => {
                write!(f, "ambiguous ({} match)", satisfied.join(" & "))
            }
        }
    }
}

/// Per-state sensor requirements, inverted from the per-sensor config.
#[derive(Debug, Default, Clone)]
struct StateConditions {
    must_be_submerged: Vec<String>,
    must_be_exposed: Vec<String>,
}

/// Maps a readings snapshot to a named tank state.
///
/// Pure and order-independent: resolution touches no hardware and never
/// mutates, so the same snapshot always resolves the same way.
#[derive(Debug, Clone)]
pub struct TankStateResolver {
    states: BTreeMap<String, StateConditions>,
}

impl TankStateResolver {
    /// Invert the sensor-centric config (`sensor -> states it reports to`)
    /// into state-centric conditions (`state -> sensors it requires`).
    pub fn from_config(tank_sensors: &[TankSensorDef]) -> Self {
        let mut states: BTreeMap<String, StateConditions> = BTreeMap::new();
        for sensor in tank_sensors {
            for state in &sensor.when_submerged {
                states
                    .entry(state.clone())
                    .or_default()
                    .must_be_submerged
                    .push(sensor.name.clone());
            }
            for state in &sensor.when_exposed {
                states
                    .entry(state.clone())
                    .or_default()
                    .must_be_exposed
                    .push(sensor.name.clone());
            }
        }
        Self { states }
    }

    /// Resolve the current snapshot to a state or an ambiguity.
    pub fn resolve(&self, readings: &Readings) -> Resolution {
        let satisfied: Vec<String> = self
            .states
            .iter()
            .filter(|(_, cond)| {
                cond.must_be_submerged.iter().all(|s| readings.is_submerged(s))
                    && cond.must_be_exposed.iter().all(|s| !readings.is_submerged(s))
            })
            .map(|(name, _)| name.clone())
            .collect();

        match satisfied.as_slice() {
            [single] => Resolution::State(single.clone()),
            _ => Resolution::Ambiguous { satisfied },
        }
    }

    /// Whether `state` is produced by any configured sensor.
    pub fn knows_state(&self, state: &str) -> bool {
        self.states.contains_key(state)
    }

    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two-sensor tank: `Normal` reports `full` when submerged and
    /// `draining`/`low` when exposed; `Low` reports `full`/`draining`
    /// when submerged and `low` when exposed.
    fn resolver() -> TankStateResolver {
        TankStateResolver::from_config(&[
            TankSensorDef {
                name: "Normal".into(),
                pin: 27,
                when_submerged: vec!["full".into()],
                when_exposed: vec!["draining".into(), "low".into()],
            },
            TankSensorDef {
                name: "Low".into(),
                pin: 22,
                when_submerged: vec!["full".into(), "draining".into()],
                when_exposed: vec!["low".into()],
            },
        ])
    }

    fn readings(normal: bool, low: bool) -> Readings {
        let mut r = Readings::new();
        r.set("Normal", normal);
        r.set("Low", low);
        r
    }

    #[test]
    fn both_submerged_is_full() {
        assert_eq!(
            resolver().resolve(&readings(true, true)),
            Resolution::State("full".into())
        );
    }

    #[test]
    fn upper_exposed_is_draining() {
        assert_eq!(
            resolver().resolve(&readings(false, true)),
            Resolution::State("draining".into())
        );
    }

    #[test]
    fn both_exposed_is_low() {
        assert_eq!(
            resolver().resolve(&readings(false, false)),
            Resolution::State("low".into())
        );
    }

    #[test]
    fn inverted_sensors_are_ambiguous() {
        // Normal submerged while Low is exposed is physically impossible;
        // no configured state matches.
        let res = resolver().resolve(&readings(true, false));
        assert_eq!(res, Resolution::Ambiguous { satisfied: vec![] });
        assert!(res.is_ambiguous());
    }

    #[test]
    fn overlapping_states_collapse_to_ambiguous() {
        // A state defined with no exposed conditions overlaps `full`.
        let resolver = TankStateResolver::from_config(&[
            TankSensorDef {
                name: "Normal".into(),
                pin: 27,
                when_submerged: vec!["full".into(), "wet".into()],
                when_exposed: vec![],
            },
        ]);
        let mut r = Readings::new();
        r.set("Normal", true);
        match resolver.resolve(&r) {
            Resolution::Ambiguous { satisfied } => {
                assert_eq!(satisfied, vec!["full".to_string(), "wet".to_string()]);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn missing_reading_cannot_fabricate_a_state() {
        let res = resolver().resolve(&Readings::new());
        // Both sensors unsampled -> both read exposed -> `low` matches.
        // The point: nothing requiring a submerged sensor can match.
        assert_eq!(res, Resolution::State("low".into()));
    }

    #[test]
    fn resolution_is_pure() {
        let resolver = resolver();
        let snap = readings(true, true);
        assert_eq!(resolver.resolve(&snap), resolver.resolve(&snap));
    }
}
