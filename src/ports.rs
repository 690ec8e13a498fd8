//! Port traits: the boundary between the control core and the outside
//! world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Controller / StepExecutor (domain)
//! ```
//!
//! Driven adapters (GPIO banks, messengers, clocks) implement these
//! traits. The core consumes them via generics, so it never touches a
//! pin, a socket, or the wall clock directly.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::snapshot::Readings;

// ───────────────────────────────────────────────────────────────
// Sensor port (hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port: sample every level and error sensor at once.
pub trait SensorPort {
    /// One frozen snapshot of all sensors. `true` = submerged.
    fn read_all(&mut self) -> Readings;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port: relay control for the pumps.
///
/// Implementations own polarity (`active_high`); the core only speaks in
/// on/off terms. Unknown pump names must be ignored with a log line, not
/// panic; the config validator guarantees they never occur in practice.
pub trait ActuatorPort {
    fn pump_on(&mut self, pump: &str);

    fn pump_off(&mut self, pump: &str);

    /// Kill every pump for safe shutdown.
    fn all_off(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Messenger port (domain → notification transport)
// ───────────────────────────────────────────────────────────────

/// Outbound notification delivery. The transport (email, push, console)
/// is an adapter concern; the core only knows recipients and text.
pub trait Messenger {
    fn send(&mut self, recipients: &[String], subject: &str, body: &str)
    -> Result<(), NotifyError>;
}

/// Delivery failure. The controller re-queues the notification and
/// retries on a later tick rather than crashing or dropping it.
#[derive(Debug, Error)]
#[error("notification delivery failed: {reason}")]
pub struct NotifyError {
    pub reason: String,
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Wall-clock access, abstracted so tests can drive time by hand.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// Block the control loop for `dur`. The manual test clock advances
    /// its notion of now instead of sleeping.
    fn sleep(&self, dur: Duration);
}
