//! The control loop.
//!
//! One tick: sample the sensors, resolve the tank state, dispatch at
//! most one due routine, drain the command inbox, retry any undelivered
//! notifications. Everything runs on the single control thread; command
//! producers only ever touch the mpsc channel.
//!
//! An ambiguous tank state halts dispatch entirely until the sensors
//! agree again. The halt is edge-triggered: one notification when the
//! ambiguity appears, one log line when it clears, nothing in between.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{CommandError, FailureKind};
use crate::estimator::RuntimeEstimator;
use crate::executor::{StepExecutor, StepOutcome, StepReport};
use crate::inbox::{Command, CommandInbox, PendingCommand};
use crate::interlock::InterlockTracker;
use crate::ports::{ActuatorPort, Clock, Messenger, SensorPort};
use crate::routine::{Routine, RoutineSet};
use crate::scheduler::RoutineScheduler;
use crate::step::Step;
use crate::tank::{Resolution, TankStateResolver};

/// Cap on queued undelivered notifications; oldest are dropped beyond it.
const MAX_PENDING_NOTIFICATIONS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Notification {
    recipients: Vec<String>,
    subject: String,
    body: String,
}

/// Owns every domain component and sequences them, one tick at a time.
pub struct Controller<M: Messenger> {
    routines: RoutineSet,
    resolver: TankStateResolver,
    interlock: InterlockTracker,
    estimator: RuntimeEstimator,
    scheduler: RoutineScheduler,
    executor: StepExecutor,
    inbox: CommandInbox,
    messenger: M,
    /// Union of every routine's error contacts; ambiguity alerts go here.
    alert_contacts: Vec<String>,
    ambiguity_latched: bool,
    shutdown_requested: bool,
    last_resolution: Option<Resolution>,
    /// Notifications that failed to send, waiting for the next tick.
    retry_queue: VecDeque<Notification>,
}

impl<M: Messenger> Controller<M> {
    pub fn new(config: &Config, inbox: CommandInbox, messenger: M, now: DateTime<Utc>) -> Self {
        let mut alert_contacts: Vec<String> = Vec::new();
        for routine in config.routines.iter() {
            for contact in &routine.error_contacts {
                if !alert_contacts.contains(contact) {
                    alert_contacts.push(contact.clone());
                }
            }
        }
        Self {
            routines: config.routines.clone(),
            resolver: TankStateResolver::from_config(&config.tank_sensors),
            interlock: InterlockTracker::from_config(&config.error_sensors),
            estimator: RuntimeEstimator::new(
                config.settings.confidence,
                config.settings.model_update.period(),
            ),
            scheduler: RoutineScheduler::new(&config.routines, now),
            executor: StepExecutor::new(Duration::from_secs_f64(config.settings.bounce_time)),
            inbox,
            messenger,
            alert_contacts,
            ambiguity_latched: false,
            shutdown_requested: false,
            last_resolution: None,
            retry_queue: VecDeque::new(),
        }
    }

    /// One pass of the control loop.
    pub fn tick<S, A, C>(&mut self, sensors: &mut S, actuators: &mut A, clock: &C)
    where
        S: SensorPort,
        A: ActuatorPort,
        C: Clock,
    {
        let snapshot = sensors.read_all();
        let resolution = self.resolver.resolve(&snapshot);

        if resolution.is_ambiguous() {
            if !self.ambiguity_latched {
                self.ambiguity_latched = true;
                warn!("tank state {resolution}; dispatch halted");
                let body = format!(
                    "The tank sensors no longer agree on a state ({resolution}).\n\
                     Readings: {snapshot}\n\
                     All routine dispatch is halted until the readings settle."
                );
                let recipients = self.alert_contacts.clone();
                self.notify(recipients, FailureKind::AmbiguousTankState.to_string(), body);
            }
        } else {
            if self.ambiguity_latched {
                info!("tank state settled to {resolution}; dispatch resumed");
                self.ambiguity_latched = false;
            }
            let due = self.scheduler.next_due(clock.now()).map(str::to_owned);
            if let Some(name) = due {
                self.run_routine(&name, sensors, actuators, clock);
            }
        }
        self.last_resolution = Some(resolution);

        for pending in self.inbox.drain() {
            self.apply_command(pending, clock.now());
        }

        self.flush_retries();
    }

    /// Whether a `Shutdown` command has been received. The run loop
    /// checks this after every tick and exits through [`Self::shutdown`].
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    /// Switch every pump off. Call before process exit.
    pub fn shutdown<A: ActuatorPort>(&mut self, actuators: &mut A) {
        info!("controller: shutting down, all pumps off");
        actuators.all_off();
    }

    fn run_routine<S, A, C>(&mut self, name: &str, sensors: &mut S, actuators: &mut A, clock: &C)
    where
        S: SensorPort,
        A: ActuatorPort,
        C: Clock,
    {
        let Some(routine) = self.routines.get(name).cloned() else {
            error!("scheduler produced unknown routine '{name}'");
            return;
        };
        let dispatched_at = clock.now();
        // The next cycle is anchored to dispatch time, before any step
        // runs, so a slow run cannot drift the schedule.
        self.scheduler.dispatched(name, dispatched_at);
        info!("routine '{}': starting ({} steps)", routine.name, routine.steps.len());

        let mut reports: Vec<StepReport> = Vec::with_capacity(routine.steps.len());
        let mut completed = true;
        for step in &routine.steps {
            let report = self.executor.run(
                &routine.name,
                step,
                &self.resolver,
                &mut self.interlock,
                &mut self.estimator,
                sensors,
                actuators,
                clock,
            );
            let proceed = report.proceed;
            self.report_step_failure(&routine, step, &report);
            reports.push(report);
            if !proceed {
                // A critical outcome always ends the cycle; the flag only
                // decides whether it is escalated as a cancellation alert.
                completed = false;
                warn!(
                    "routine '{}': halted at step '{}'",
                    routine.name, step.name
                );
                if step.flags.cancel_on_critical_failure {
                    self.notify(
                        routine.error_contacts.clone(),
                        FailureKind::CriticalRoutineFailure.to_string(),
                        format!(
                            "Routine '{}' was abandoned at step '{}'.\n\
                             Remaining steps were skipped for this cycle; the next \
                             scheduled run is unaffected.",
                            routine.name, step.name
                        ),
                    );
                }
                break;
            }
        }

        let summary = reports
            .iter()
            .map(|r| format!("{}: {}", r.step, r.outcome))
            .collect::<Vec<_>>()
            .join("\n");
        if completed {
            info!("routine '{}': finished", routine.name);
            self.notify(
                routine.completion_contacts.clone(),
                format!("Routine '{}' Complete", routine.name),
                summary,
            );
        } else {
            self.notify(
                routine.error_contacts.clone(),
                format!("Routine '{}' Incomplete", routine.name),
                summary,
            );
        }
    }

    fn report_step_failure(&mut self, routine: &Routine, step: &Step, report: &StepReport) {
        let Some(kind) = report.outcome.failure_kind() else {
            return;
        };
        if matches!(report.outcome, StepOutcome::InvalidStart { .. })
            && !step.flags.report_invalid_start
        {
            return;
        }
        self.notify(
            routine.error_contacts.clone(),
            kind.to_string(),
            format!("Routine '{}', step {}: {}", routine.name, step, report.outcome),
        );
    }

    fn apply_command(&mut self, pending: PendingCommand, now: DateTime<Utc>) {
        let reply = match &pending.command {
            Command::Run { routine, when } => self
                .request_run(routine, when.resolve(now))
                .map(|()| format!("run of '{routine}' accepted")),
            Command::Pause { routine } => self
                .scheduler
                .pause(routine)
                .map(|()| format!("'{routine}' paused")),
            Command::Resume { routine } => self
                .scheduler
                .resume(routine, now)
                .map(|()| format!("'{routine}' resumed")),
            Command::Cancel { routine } => self
                .scheduler
                .cancel(routine, now)
                .map(|()| format!("pending run of '{routine}' cancelled")),
            Command::Status => Ok(self.status_text(now)),
            Command::Shutdown => {
                self.shutdown_requested = true;
                Ok("shutting down".to_string())
            }
        };

        let body = match reply {
            Ok(text) => {
                info!("command ok: {text}");
                text
            }
            Err(err) => {
                warn!("command rejected: {err}");
                format!("rejected: {err}")
            }
        };
        if let Some(contact) = pending.reply_to {
            self.notify(vec![contact], "Command Reply".to_string(), body);
        }
    }

    fn request_run(&mut self, routine: &str, when: DateTime<Utc>) -> Result<(), CommandError> {
        if !self.routines.contains(routine) {
            return Err(CommandError::UnknownRoutine(routine.to_string()));
        }
        self.scheduler.request(routine, when)
    }

    fn status_text(&self, now: DateTime<Utc>) -> String {
        let mut lines = Vec::new();
        match &self.last_resolution {
            Some(res) => lines.push(format!("tank state: {res}")),
            None => lines.push("tank state: not yet sampled".to_string()),
        }
        for job in self.scheduler.jobs() {
            let due = match job.next_due {
                _ if job.paused => "paused".to_string(),
                Some(due) if due <= now => "due now".to_string(),
                Some(due) => format!("due {due}"),
                None => "on demand".to_string(),
            };
            lines.push(format!("{}: {due}", job.routine));
        }
        for (sensor, remaining) in self.interlock.budgets() {
            lines.push(format!("{sensor}: {remaining} permitted runs left"));
        }
        lines.join("\n")
    }

    fn notify(&mut self, recipients: Vec<String>, subject: String, body: String) {
        if recipients.is_empty() {
            return;
        }
        match self.messenger.send(&recipients, &subject, &body) {
            Ok(()) => {}
            Err(err) => {
                warn!("notification '{subject}' failed ({err}); will retry");
                self.retry_queue.push_back(Notification { recipients, subject, body });
                if self.retry_queue.len() > MAX_PENDING_NOTIFICATIONS {
                    if let Some(dropped) = self.retry_queue.pop_front() {
                        warn!("notification backlog full; dropping '{}'", dropped.subject);
                    }
                }
            }
        }
    }

    /// One delivery attempt per queued notification per tick.
    fn flush_retries(&mut self) {
        let pending = std::mem::take(&mut self.retry_queue);
        for n in pending {
            match self.messenger.send(&n.recipients, &n.subject, &n.body) {
                Ok(()) => info!("retried notification '{}' delivered", n.subject),
                Err(err) => {
                    warn!("retried notification '{}' failed again ({err})", n.subject);
                    self.retry_queue.push_back(n);
                }
            }
        }
    }
}
