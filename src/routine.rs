//! Routine data model and registry.
//!
//! A routine is an ordered list of steps scheduled together under one
//! interval and priority. Routines without a schedule are on-demand
//! only: they never become due on their own and run solely in response
//! to an explicit `run` command.
//!
//! Everything here is built once at startup from validated configuration
//! and is immutable afterwards: a plain owned registry, no runtime
//! registration.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::step::Step;

/// Time unit for schedule intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl IntervalUnit {
    pub fn to_duration(self, amount: i64) -> Duration {
        match self {
            Self::Seconds => Duration::seconds(amount),
            Self::Minutes => Duration::minutes(amount),
            Self::Hours => Duration::hours(amount),
            Self::Days => Duration::days(amount),
            Self::Weeks => Duration::weeks(amount),
        }
    }
}

impl std::fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Seconds => "seconds",
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
            Self::Weeks => "weeks",
        };
        write!(f, "{s}")
    }
}

/// Recurring schedule: every `interval` `unit`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval: u32,
    pub unit: IntervalUnit,
}

impl Schedule {
    pub fn period(&self) -> Duration {
        self.unit.to_duration(i64::from(self.interval))
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "every {} {}", self.interval, self.unit)
    }
}

/// Ordered steps plus scheduling and notification metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Routine {
    pub name: String,
    /// `None` = on-demand only.
    pub schedule: Option<Schedule>,
    /// Lower value runs first among simultaneously-due routines.
    pub priority: i32,
    pub error_contacts: Vec<String>,
    pub completion_contacts: Vec<String>,
    pub steps: Vec<Step>,
}

/// Declaration-ordered routine registry with name lookup.
#[derive(Debug, Clone, Default)]
pub struct RoutineSet {
    routines: Vec<Routine>,
    index: HashMap<String, usize>,
}

impl RoutineSet {
    pub fn new(routines: Vec<Routine>) -> Self {
        let index = routines
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.clone(), i))
            .collect();
        Self { routines, index }
    }

    pub fn get(&self, name: &str) -> Option<&Routine> {
        self.index.get(name).map(|&i| &self.routines[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Routines in declaration order (the scheduler's tie-break order).
    pub fn iter(&self) -> impl Iterator<Item = &Routine> {
        self.routines.iter()
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_unit_durations() {
        assert_eq!(IntervalUnit::Seconds.to_duration(30), Duration::seconds(30));
        assert_eq!(IntervalUnit::Days.to_duration(3), Duration::days(3));
        let sched = Schedule { interval: 2, unit: IntervalUnit::Hours };
        assert_eq!(sched.period(), Duration::hours(2));
    }

    #[test]
    fn registry_preserves_declaration_order() {
        let mk = |name: &str| Routine {
            name: name.into(),
            schedule: None,
            priority: 0,
            error_contacts: vec![],
            completion_contacts: vec![],
            steps: vec![],
        };
        let set = RoutineSet::new(vec![mk("b"), mk("a")]);
        let order: Vec<&str> = set.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(order, ["b", "a"]);
        assert!(set.get("a").is_some());
        assert!(set.get("missing").is_none());
    }
}
