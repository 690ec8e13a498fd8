//! Console command intake and the log-backed messenger.
//!
//! Command grammar, one command per line:
//!
//! ```text
//!   run <routine> [--at HH:MM[:SS] | --in <amount> <unit>]
//!   pause <routine>
//!   resume <routine>
//!   cancel <routine>
//!   status
//!   shutdown
//! ```
//!
//! Routine names may contain spaces; everything between the verb and the
//! first `--` flag belongs to the name.

use chrono::{Duration, NaiveTime};
use std::io::BufRead;
use tracing::{info, warn};

use crate::inbox::{Command, CommandSubmitter, PendingCommand, RunWhen};
use crate::ports::{Messenger, NotifyError};

/// Messenger that writes notifications to the log instead of a wire.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMessenger;

impl Messenger for LogMessenger {
    fn send(
        &mut self,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        info!("notify [{}] {subject}: {body}", recipients.join(", "));
        Ok(())
    }
}

/// Parse one console line into a command.
pub fn parse_line(line: &str) -> Result<Command, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, rest)) = words.split_first() else {
        return Err("empty command".to_string());
    };

    match verb {
        "status" => Ok(Command::Status),
        "shutdown" | "quit" => Ok(Command::Shutdown),
        "pause" => Ok(Command::Pause { routine: routine_name(rest, rest.len())? }),
        "resume" => Ok(Command::Resume { routine: routine_name(rest, rest.len())? }),
        "cancel" => Ok(Command::Cancel { routine: routine_name(rest, rest.len())? }),
        "run" => parse_run(rest),
        other => Err(format!("unknown command '{other}'")),
    }
}

fn parse_run(rest: &[&str]) -> Result<Command, String> {
    let flag_at = rest.iter().position(|w| w.starts_with("--"));
    let routine = routine_name(rest, flag_at.unwrap_or(rest.len()))?;

    let when = match flag_at {
        None => RunWhen::Now,
        Some(i) => match (rest[i], rest.get(i + 1..)) {
            ("--at", Some([time])) => RunWhen::At(parse_time(time)?),
            ("--in", Some([amount, unit])) => RunWhen::In(parse_delay(amount, unit)?),
            ("--at", _) => return Err("--at takes one argument: HH:MM[:SS]".to_string()),
            ("--in", _) => return Err("--in takes two arguments: <amount> <unit>".to_string()),
            (flag, _) => return Err(format!("unknown flag '{flag}'")),
        },
    };
    Ok(Command::Run { routine, when })
}

fn routine_name(words: &[&str], up_to: usize) -> Result<String, String> {
    let name = words[..up_to].join(" ");
    if name.is_empty() {
        return Err("missing routine name".to_string());
    }
    Ok(name)
}

fn parse_time(text: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .map_err(|_| format!("'{text}' is not a valid HH:MM[:SS] time"))
}

fn parse_delay(amount: &str, unit: &str) -> Result<Duration, String> {
    let amount: i64 = amount
        .parse()
        .map_err(|_| format!("'{amount}' is not a whole number"))?;
    if amount <= 0 {
        return Err("delay must be positive".to_string());
    }
    match unit {
        "second" | "seconds" => Ok(Duration::seconds(amount)),
        "minute" | "minutes" => Ok(Duration::minutes(amount)),
        "hour" | "hours" => Ok(Duration::hours(amount)),
        "day" | "days" => Ok(Duration::days(amount)),
        "week" | "weeks" => Ok(Duration::weeks(amount)),
        other => Err(format!("unknown unit '{other}'")),
    }
}

/// Read commands from stdin on a dedicated thread until EOF or until the
/// control loop drops its inbox. EOF submits a shutdown so closing the
/// console terminates the loop cleanly.
pub fn spawn_console_reader(submitter: CommandSubmitter) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(&line) {
                Ok(command) => {
                    if !submitter.submit(PendingCommand { command, reply_to: None }) {
                        return;
                    }
                }
                Err(reason) => warn!("console: {reason}"),
            }
        }
        submitter.submit(PendingCommand { command: Command::Shutdown, reply_to: None });
        info!("console: reader stopped");
    })
}
