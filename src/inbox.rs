//! Out-of-band command intake.
//!
//! Command producers (console reader, future mail pollers) run on their
//! own threads and push into an mpsc channel; the control loop drains
//! whatever has accumulated once per tick, after any routine dispatch.
//! Commands therefore never interrupt a running step.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::sync::mpsc;

/// When a requested run should become due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunWhen {
    Now,
    /// Next occurrence of this wall-clock time (today if still ahead,
    /// otherwise tomorrow).
    At(NaiveTime),
    /// A delay from receipt.
    In(Duration),
}

impl RunWhen {
    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Now => now,
            Self::At(time) => {
                let today = now.date_naive().and_time(*time).and_utc();
                if today > now { today } else { today + Duration::days(1) }
            }
            Self::In(delay) => now + *delay,
        }
    }
}

/// One operator instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run { routine: String, when: RunWhen },
    Pause { routine: String },
    Resume { routine: String },
    Cancel { routine: String },
    Status,
    /// Stop the control loop after the current tick; pumps are switched
    /// off on the way out.
    Shutdown,
}

/// A command plus where its reply should go. `reply_to` empty means the
/// reply is only logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub command: Command,
    pub reply_to: Option<String>,
}

/// Producer half. Cheap to clone; one per intake thread.
#[derive(Debug, Clone)]
pub struct CommandSubmitter {
    tx: mpsc::Sender<PendingCommand>,
}

impl CommandSubmitter {
    /// Returns `false` when the control loop has shut down.
    pub fn submit(&self, pending: PendingCommand) -> bool {
        self.tx.send(pending).is_ok()
    }
}

/// Consumer half, owned by the control loop.
#[derive(Debug)]
pub struct CommandInbox {
    rx: mpsc::Receiver<PendingCommand>,
}

impl CommandInbox {
    /// Everything submitted since the last drain, in arrival order.
    /// Never blocks.
    pub fn drain(&mut self) -> Vec<PendingCommand> {
        self.rx.try_iter().collect()
    }
}

pub fn command_inbox() -> (CommandSubmitter, CommandInbox) {
    let (tx, rx) = mpsc::channel();
    (CommandSubmitter { tx }, CommandInbox { rx })
}
