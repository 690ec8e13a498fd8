//! Routine scheduling.
//!
//! Each routine with a configured interval gets one job seeded at
//! `startup + interval`; there is no catch-up for runs missed while the
//! process was down. Routines without a schedule get a job with no due
//! time and only ever run when explicitly requested.
//!
//! When several jobs are due on the same tick, the lower priority value
//! wins; ties fall back to configuration order. The controller dispatches
//! exactly one routine per tick, so the rest stay due and drain on the
//! following ticks.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::error::CommandError;
use crate::routine::RoutineSet;

/// One routine's scheduling state.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub routine: String,
    pub priority: i32,
    /// Position in configuration order, the tie-break after priority.
    order: usize,
    /// `None` for on-demand routines.
    interval: Option<Duration>,
    /// `None` = nothing pending (on-demand idle, or cancelled).
    pub next_due: Option<DateTime<Utc>>,
    pub paused: bool,
}

impl ScheduledJob {
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.paused && self.next_due.is_some_and(|due| due <= now)
    }
}

/// Priority queue over routine jobs, keyed by due time.
#[derive(Debug, Clone)]
pub struct RoutineScheduler {
    jobs: Vec<ScheduledJob>,
}

impl RoutineScheduler {
    /// Seed one job per routine. Interval routines first come due a full
    /// interval after startup.
    pub fn new(routines: &RoutineSet, now: DateTime<Utc>) -> Self {
        let jobs = routines
            .iter()
            .enumerate()
            .map(|(order, r)| {
                let interval = r.schedule.map(|s| s.period());
                ScheduledJob {
                    routine: r.name.clone(),
                    priority: r.priority,
                    order,
                    interval,
                    next_due: interval.map(|i| now + i),
                    paused: false,
                }
            })
            .collect();
        Self { jobs }
    }

    /// The single routine to dispatch this tick, if any is due.
    pub fn next_due(&self, now: DateTime<Utc>) -> Option<&str> {
        self.jobs
            .iter()
            .filter(|j| j.is_due(now))
            .min_by_key(|j| (j.priority, j.order))
            .map(|j| j.routine.as_str())
    }

    /// Advance the schedule after dispatching `routine` at `at`. The next
    /// due time is anchored to the dispatch, not to the old due time, so
    /// a late run does not compress the following interval.
    pub fn dispatched(&mut self, routine: &str, at: DateTime<Utc>) {
        if let Some(job) = self.job_mut(routine) {
            job.next_due = job.interval.map(|i| at + i);
            if let Some(due) = job.next_due {
                debug!("scheduler: '{routine}' next due {due}");
            }
        }
    }

    /// Request an explicit run at `when` (a `run` command). Earlier
    /// pending due times are kept.
    pub fn request(&mut self, routine: &str, when: DateTime<Utc>) -> Result<(), CommandError> {
        let job = self
            .job_mut(routine)
            .ok_or_else(|| CommandError::UnknownRoutine(routine.to_string()))?;
        if job.paused {
            return Err(CommandError::Paused(routine.to_string()));
        }
        job.next_due = Some(match job.next_due {
            Some(due) if due < when => due,
            _ => when,
        });
        info!("scheduler: '{routine}' requested for {when}");
        Ok(())
    }

    /// Stop a routine from becoming due. Its job survives and keeps its
    /// pending due time frozen.
    pub fn pause(&mut self, routine: &str) -> Result<(), CommandError> {
        let job = self
            .job_mut(routine)
            .ok_or_else(|| CommandError::UnknownRoutine(routine.to_string()))?;
        if job.paused {
            return Err(CommandError::Paused(routine.to_string()));
        }
        job.paused = true;
        info!("scheduler: '{routine}' paused");
        Ok(())
    }

    /// Undo a pause. An interval routine left with no due time is
    /// re-seeded a full interval out.
    pub fn resume(&mut self, routine: &str, now: DateTime<Utc>) -> Result<(), CommandError> {
        let job = self
            .job_mut(routine)
            .ok_or_else(|| CommandError::UnknownRoutine(routine.to_string()))?;
        if !job.paused {
            return Err(CommandError::NotPaused(routine.to_string()));
        }
        job.paused = false;
        if job.next_due.is_none() {
            job.next_due = job.interval.map(|i| now + i);
        }
        info!("scheduler: '{routine}' resumed");
        Ok(())
    }

    /// Skip the pending run. The routine stays scheduled: an interval job
    /// moves straight to its next cycle, an on-demand job goes idle.
    pub fn cancel(&mut self, routine: &str, now: DateTime<Utc>) -> Result<(), CommandError> {
        let job = self
            .job_mut(routine)
            .ok_or_else(|| CommandError::UnknownRoutine(routine.to_string()))?;
        if job.next_due.is_none() {
            return Err(CommandError::NothingPending(routine.to_string()));
        }
        job.next_due = job.interval.map(|i| now + i);
        info!("scheduler: '{routine}' pending run cancelled");
        Ok(())
    }

    /// Jobs in configuration order, for status replies.
    pub fn jobs(&self) -> impl Iterator<Item = &ScheduledJob> {
        self.jobs.iter()
    }

    fn job_mut(&mut self, routine: &str) -> Option<&mut ScheduledJob> {
        self.jobs.iter_mut().find(|j| j.routine == routine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routine::{IntervalUnit, Routine, Schedule};
    use chrono::TimeZone;

    fn routine(name: &str, schedule: Option<Schedule>, priority: i32) -> Routine {
        Routine {
            name: name.into(),
            schedule,
            priority,
            error_contacts: vec![],
            completion_contacts: vec![],
            steps: vec![],
        }
    }

    fn hourly() -> Option<Schedule> {
        Some(Schedule { interval: 1, unit: IntervalUnit::Hours })
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn interval_job_first_due_one_interval_after_startup() {
        let set = RoutineSet::new(vec![routine("wc", hourly(), 0)]);
        let sched = RoutineScheduler::new(&set, t0());
        assert_eq!(sched.next_due(t0()), None);
        assert_eq!(sched.next_due(t0() + Duration::minutes(59)), None);
        assert_eq!(sched.next_due(t0() + Duration::hours(1)), Some("wc"));
    }

    #[test]
    fn on_demand_job_never_becomes_due_on_its_own() {
        let set = RoutineSet::new(vec![routine("topoff", None, 0)]);
        let mut sched = RoutineScheduler::new(&set, t0());
        assert_eq!(sched.next_due(t0() + Duration::weeks(52)), None);

        sched.request("topoff", t0()).unwrap();
        assert_eq!(sched.next_due(t0()), Some("topoff"));
        sched.dispatched("topoff", t0());
        assert_eq!(sched.next_due(t0() + Duration::weeks(52)), None);
    }

    #[test]
    fn lower_priority_value_dispatches_first() {
        let set = RoutineSet::new(vec![
            routine("cleanup", hourly(), 5),
            routine("wc", hourly(), 1),
        ]);
        let mut sched = RoutineScheduler::new(&set, t0());
        let due = t0() + Duration::hours(1);
        assert_eq!(sched.next_due(due), Some("wc"));
        sched.dispatched("wc", due);
        // The lower-priority job is still due and drains next tick.
        assert_eq!(sched.next_due(due), Some("cleanup"));
    }

    #[test]
    fn equal_priority_falls_back_to_config_order() {
        let set = RoutineSet::new(vec![
            routine("b", hourly(), 1),
            routine("a", hourly(), 1),
        ]);
        let sched = RoutineScheduler::new(&set, t0());
        assert_eq!(sched.next_due(t0() + Duration::hours(1)), Some("b"));
    }

    #[test]
    fn dispatch_anchors_the_next_interval() {
        let set = RoutineSet::new(vec![routine("wc", hourly(), 0)]);
        let mut sched = RoutineScheduler::new(&set, t0());
        // Dispatch runs 20 minutes late.
        let late = t0() + Duration::minutes(80);
        sched.dispatched("wc", late);
        assert_eq!(sched.next_due(late + Duration::minutes(59)), None);
        assert_eq!(sched.next_due(late + Duration::hours(1)), Some("wc"));
    }

    #[test]
    fn request_keeps_the_earlier_due_time() {
        let set = RoutineSet::new(vec![routine("wc", hourly(), 0)]);
        let mut sched = RoutineScheduler::new(&set, t0());
        let later = t0() + Duration::hours(3);
        sched.request("wc", later).unwrap();
        // The seeded t0+1h due time still fires first.
        assert_eq!(sched.next_due(t0() + Duration::hours(1)), Some("wc"));
    }

    #[test]
    fn pause_blocks_dispatch_and_request() {
        let set = RoutineSet::new(vec![routine("wc", hourly(), 0)]);
        let mut sched = RoutineScheduler::new(&set, t0());
        sched.pause("wc").unwrap();
        assert_eq!(sched.next_due(t0() + Duration::hours(2)), None);
        assert_eq!(
            sched.request("wc", t0()),
            Err(CommandError::Paused("wc".into()))
        );
        assert_eq!(sched.pause("wc"), Err(CommandError::Paused("wc".into())));

        sched.resume("wc", t0() + Duration::hours(2)).unwrap();
        // The frozen due time is immediately dispatchable again.
        assert_eq!(sched.next_due(t0() + Duration::hours(2)), Some("wc"));
        assert_eq!(
            sched.resume("wc", t0()),
            Err(CommandError::NotPaused("wc".into()))
        );
    }

    #[test]
    fn cancel_skips_one_cycle_but_keeps_the_schedule() {
        let set = RoutineSet::new(vec![routine("wc", hourly(), 0)]);
        let mut sched = RoutineScheduler::new(&set, t0());
        let due = t0() + Duration::hours(1);
        assert_eq!(sched.next_due(due), Some("wc"));

        sched.cancel("wc", due).unwrap();
        assert_eq!(sched.next_due(due), None);
        // One interval later it is due again.
        assert_eq!(sched.next_due(due + Duration::hours(1)), Some("wc"));
    }

    #[test]
    fn cancel_with_nothing_pending_is_an_error() {
        let set = RoutineSet::new(vec![routine("topoff", None, 0)]);
        let mut sched = RoutineScheduler::new(&set, t0());
        assert_eq!(
            sched.cancel("topoff", t0()),
            Err(CommandError::NothingPending("topoff".into()))
        );
        assert_eq!(
            sched.cancel("missing", t0()),
            Err(CommandError::UnknownRoutine("missing".into()))
        );
    }
}
